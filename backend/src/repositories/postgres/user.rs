use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, QueryBuilder};

use crate::db::postgres::DbPool;
use crate::error::{AppError, RepositoryError};
use crate::models::user::{NewUser, PasswordReset, User, UserPatch};
use crate::repositories::user_repository::UserRepository;

use super::STORE;

const USER_COLUMNS: &str = "id, username, email, password_hash, password_reset_token, \
                            password_reset_expires, created_at, updated_at";

#[derive(Debug, FromRow)]
struct UserRow {
    id: String,
    username: String,
    email: String,
    password_hash: String,
    password_reset_token: Option<String>,
    password_reset_expires: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> User {
        // The two reset columns travel together; a row with only one set
        // would be a schema-level bug and is treated as no pending reset.
        let password_reset = match (self.password_reset_token, self.password_reset_expires) {
            (Some(token_hash), Some(expires_at)) => Some(PasswordReset {
                token_hash,
                expires_at,
            }),
            _ => None,
        };
        User {
            id: self.id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            password_reset,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

pub struct PostgresUserRepository {
    pool: DbPool,
}

impl PostgresUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(
        &self,
        operation: &'static str,
        clause: &str,
        binds: &[&str],
    ) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, clause);
        let mut query = sqlx::query_as::<_, UserRow>(&sql);
        for bind in binds {
            query = query.bind(*bind);
        }
        let row = query
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| RepositoryError::new(STORE, operation, e))?;
        Ok(row.map(UserRow::into_user))
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<User>, AppError> {
        // When both fields collide on different rows the username row wins,
        // so signup reports the username conflict first.
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE username = $1 OR email = $2 \
             ORDER BY (username = $1) DESC LIMIT 1",
            USER_COLUMNS
        ))
        .bind(username)
        .bind(email)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| RepositoryError::new(STORE, "find_by_username_or_email", e))?;
        Ok(row.map(UserRow::into_user))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        self.fetch_one_where("find_by_username", "username = $1", &[username])
            .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.fetch_one_where("find_by_email", "email = $1", &[email])
            .await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        self.fetch_one_where("find_by_id", "id = $1", &[id]).await
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users \
             WHERE password_reset_token = $1 AND password_reset_expires > $2",
            USER_COLUMNS
        ))
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| RepositoryError::new(STORE, "find_by_reset_token", e))?;
        Ok(row.map(UserRow::into_user))
    }

    async fn create(&self, user: NewUser) -> Result<User, AppError> {
        let user = User::new(user.username, user.email, user.password_hash);
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (id, username, email, password_hash, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| RepositoryError::new(STORE, "create", e))?;
        Ok(row.into_user())
    }

    async fn update(&self, id: &str, patch: UserPatch) -> Result<Option<User>, AppError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE users SET updated_at = ");
        builder.push_bind(Utc::now());
        if let Some(password_hash) = &patch.password_hash {
            builder.push(", password_hash = ");
            builder.push_bind(password_hash);
        }
        if let Some(reset) = &patch.password_reset {
            match reset {
                Some(reset) => {
                    builder.push(", password_reset_token = ");
                    builder.push_bind(&reset.token_hash);
                    builder.push(", password_reset_expires = ");
                    builder.push_bind(reset.expires_at);
                }
                None => {
                    builder.push(", password_reset_token = NULL, password_reset_expires = NULL");
                }
            }
        }
        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(format!(" RETURNING {}", USER_COLUMNS));

        let row = builder
            .build_query_as::<UserRow>()
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| RepositoryError::new(STORE, "update", e))?;
        Ok(row.map(UserRow::into_user))
    }
}

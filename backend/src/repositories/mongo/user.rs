use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, Bson, DateTime as BsonDateTime, Document};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};
use mongodb::{Collection, Database};

use crate::error::{AppError, RepositoryError};
use crate::models::user::{NewUser, PasswordReset, User, UserPatch};
use crate::repositories::user_repository::UserRepository;

use super::{STORE, USERS_COLLECTION};

pub struct MongoUserRepository {
    collection: Collection<Document>,
}

impl MongoUserRepository {
    pub fn new(database: &Database) -> Self {
        Self {
            collection: database.collection(USERS_COLLECTION),
        }
    }

    async fn find_one(
        &self,
        operation: &'static str,
        filter: Document,
    ) -> Result<Option<User>, AppError> {
        let found = self
            .collection
            .find_one(filter, None)
            .await
            .map_err(|e| RepositoryError::new(STORE, operation, e))?;
        found.map(|doc| doc_to_user(&doc)).transpose()
    }
}

fn user_to_doc(user: &User) -> Document {
    let mut document = doc! {
        "_id": &user.id,
        "username": &user.username,
        "email": &user.email,
        "password_hash": &user.password_hash,
        "password_reset_token": Bson::Null,
        "password_reset_expires": Bson::Null,
        "created_at": BsonDateTime::from_chrono(user.created_at),
        "updated_at": BsonDateTime::from_chrono(user.updated_at),
    };
    if let Some(reset) = &user.password_reset {
        document.insert("password_reset_token", &reset.token_hash);
        document.insert(
            "password_reset_expires",
            BsonDateTime::from_chrono(reset.expires_at),
        );
    }
    document
}

fn doc_to_user(document: &Document) -> Result<User, AppError> {
    let read = |res: Result<&str, mongodb::bson::document::ValueAccessError>| {
        res.map(str::to_owned)
            .map_err(|e| RepositoryError::new(STORE, "doc_to_user", e))
    };

    let token_hash = opt_string(document, "password_reset_token");
    let expires_at = opt_datetime(document, "password_reset_expires");
    let password_reset = match (token_hash, expires_at) {
        (Some(token_hash), Some(expires_at)) => Some(PasswordReset {
            token_hash,
            expires_at,
        }),
        _ => None,
    };

    Ok(User {
        id: read(document.get_str("_id"))?,
        username: read(document.get_str("username"))?,
        email: read(document.get_str("email"))?,
        password_hash: read(document.get_str("password_hash"))?,
        password_reset,
        created_at: req_datetime(document, "created_at")?,
        updated_at: req_datetime(document, "updated_at")?,
    })
}

pub(super) fn opt_string(document: &Document, key: &str) -> Option<String> {
    match document.get(key) {
        Some(Bson::String(value)) => Some(value.clone()),
        _ => None,
    }
}

pub(super) fn opt_datetime(document: &Document, key: &str) -> Option<DateTime<Utc>> {
    match document.get(key) {
        Some(Bson::DateTime(value)) => Some(value.to_chrono()),
        _ => None,
    }
}

pub(super) fn req_datetime(document: &Document, key: &str) -> Result<DateTime<Utc>, AppError> {
    document
        .get_datetime(key)
        .map(|value| value.to_chrono())
        .map_err(|e| RepositoryError::new(STORE, "read_datetime", e).into())
}

#[async_trait]
impl UserRepository for MongoUserRepository {
    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<User>, AppError> {
        // Username takes precedence when both fields collide on different
        // documents, so signup reports the username conflict first.
        if let Some(user) = self
            .find_one("find_by_username_or_email", doc! { "username": username })
            .await?
        {
            return Ok(Some(user));
        }
        self.find_one("find_by_username_or_email", doc! { "email": email })
            .await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        self.find_one("find_by_username", doc! { "username": username })
            .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.find_one("find_by_email", doc! { "email": email }).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        self.find_one("find_by_id", doc! { "_id": id }).await
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError> {
        self.find_one(
            "find_by_reset_token",
            doc! {
                "password_reset_token": token_hash,
                "password_reset_expires": { "$gt": BsonDateTime::from_chrono(now) },
            },
        )
        .await
    }

    async fn create(&self, user: NewUser) -> Result<User, AppError> {
        let user = User::new(user.username, user.email, user.password_hash);
        self.collection
            .insert_one(user_to_doc(&user), None)
            .await
            .map_err(|e| RepositoryError::new(STORE, "create", e))?;
        Ok(user)
    }

    async fn update(&self, id: &str, patch: UserPatch) -> Result<Option<User>, AppError> {
        let mut set = doc! { "updated_at": BsonDateTime::from_chrono(Utc::now()) };
        if let Some(password_hash) = &patch.password_hash {
            set.insert("password_hash", password_hash);
        }
        if let Some(reset) = &patch.password_reset {
            match reset {
                Some(reset) => {
                    set.insert("password_reset_token", &reset.token_hash);
                    set.insert(
                        "password_reset_expires",
                        BsonDateTime::from_chrono(reset.expires_at),
                    );
                }
                None => {
                    set.insert("password_reset_token", Bson::Null);
                    set.insert("password_reset_expires", Bson::Null);
                }
            }
        }

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let updated = self
            .collection
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": set }, options)
            .await
            .map_err(|e| RepositoryError::new(STORE, "update", e))?;
        updated.map(|doc| doc_to_user(&doc)).transpose()
    }
}

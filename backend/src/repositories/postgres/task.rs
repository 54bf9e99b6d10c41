use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, QueryBuilder};

use crate::db::postgres::DbPool;
use crate::error::{AppError, RepositoryError};
use crate::models::task::{ChecklistItem, Task, TaskFilter, TaskPatch};
use crate::models::Page;
use crate::repositories::task_repository::TaskRepository;
use crate::utils::encryption::FieldCipher;

use super::STORE;

const TASK_COLUMNS: &str = "id, user_id, title, description, checklist, due_date, status, \
                            created_at, modified_at, archived_at, deleted_at";

#[derive(Debug, FromRow)]
struct TaskRow {
    id: String,
    user_id: String,
    title: String,
    description: Option<String>,
    checklist: Option<String>,
    due_date: Option<DateTime<Utc>>,
    status: String,
    created_at: DateTime<Utc>,
    modified_at: Option<DateTime<Utc>>,
    archived_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TaskRow {
    fn into_task(self, cipher: &FieldCipher) -> Result<Task, AppError> {
        Ok(Task {
            id: self.id,
            user_id: self.user_id,
            title: cipher.decrypt(&self.title)?,
            description: match self.description {
                Some(value) => Some(cipher.decrypt(&value)?),
                None => None,
            },
            checklist: match self.checklist {
                Some(value) => Some(decode_checklist(cipher, &value)?),
                None => None,
            },
            due_date: self.due_date,
            status: self.status,
            created_at: self.created_at,
            modified_at: self.modified_at,
            archived_at: self.archived_at,
            deleted_at: self.deleted_at,
        })
    }
}

/// Checklists are kept as an encrypted JSON string: the relational schema
/// has no native nested structure for them.
fn encode_checklist(cipher: &FieldCipher, items: &[ChecklistItem]) -> Result<String, AppError> {
    let json = serde_json::to_string(items)
        .map_err(|e| RepositoryError::new(STORE, "encode_checklist", e))?;
    cipher.encrypt(&json)
}

fn decode_checklist(cipher: &FieldCipher, stored: &str) -> Result<Vec<ChecklistItem>, AppError> {
    let json = cipher.decrypt(stored)?;
    if json.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&json).map_err(|e| RepositoryError::new(STORE, "decode_checklist", e).into())
}

/// Appends WHERE or AND depending on whether a clause has been added yet.
fn push_clause(builder: &mut QueryBuilder<'_, Postgres>, has_clause: &mut bool) {
    if *has_clause {
        builder.push(" AND ");
    } else {
        builder.push(" WHERE ");
        *has_clause = true;
    }
}

fn push_list_filters<'a>(
    builder: &mut QueryBuilder<'a, Postgres>,
    user_id: &'a str,
    filter: &'a TaskFilter,
) {
    let mut has_clause = false;
    push_clause(builder, &mut has_clause);
    builder.push("user_id = ");
    builder.push_bind(user_id);

    push_clause(builder, &mut has_clause);
    builder.push("deleted_at IS NULL");

    push_clause(builder, &mut has_clause);
    if filter.archived.unwrap_or(false) {
        builder.push("archived_at IS NOT NULL");
    } else {
        builder.push("archived_at IS NULL");
    }

    if let Some(status) = &filter.status {
        push_clause(builder, &mut has_clause);
        builder.push("status = ");
        builder.push_bind(status);
    }

    if let Some(due_date) = &filter.due_date {
        push_clause(builder, &mut has_clause);
        builder.push("due_date = ");
        builder.push_bind(*due_date);
    }
}

pub struct PostgresTaskRepository {
    pool: DbPool,
    cipher: Arc<FieldCipher>,
}

impl PostgresTaskRepository {
    pub fn new(pool: DbPool, cipher: Arc<FieldCipher>) -> Self {
        Self { pool, cipher }
    }
}

#[async_trait]
impl TaskRepository for PostgresTaskRepository {
    async fn create(&self, task: Task) -> Result<Task, AppError> {
        let title = self.cipher.encrypt(&task.title)?;
        let description = match &task.description {
            Some(value) => Some(self.cipher.encrypt(value)?),
            None => None,
        };
        let checklist = match &task.checklist {
            Some(items) => Some(encode_checklist(&self.cipher, items)?),
            None => None,
        };

        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "INSERT INTO tasks (id, user_id, title, description, checklist, due_date, status, \
             created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(&task.id)
        .bind(&task.user_id)
        .bind(&title)
        .bind(&description)
        .bind(&checklist)
        .bind(task.due_date)
        .bind(&task.status)
        .bind(task.created_at)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| RepositoryError::new(STORE, "create", e))?;
        row.into_task(&self.cipher)
    }

    async fn find_by_id(&self, id: &str, user_id: &str) -> Result<Option<Task>, AppError> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {} FROM tasks WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
            TASK_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| RepositoryError::new(STORE, "find_by_id", e))?;
        row.map(|r| r.into_task(&self.cipher)).transpose()
    }

    async fn list_by_user(
        &self,
        user_id: &str,
        page: u64,
        limit: u64,
        filter: &TaskFilter,
    ) -> Result<Page<Task>, AppError> {
        let page = page.max(1);
        let limit = limit.max(1);

        let mut count_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM tasks");
        push_list_filters(&mut count_builder, user_id, filter);
        let (total_items,): (i64,) = count_builder
            .build_query_as()
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| RepositoryError::new(STORE, "list_by_user", e))?;

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM tasks", TASK_COLUMNS));
        push_list_filters(&mut builder, user_id, filter);
        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(limit as i64);
        builder.push(" OFFSET ");
        builder.push_bind(((page - 1) * limit) as i64);

        let rows = builder
            .build_query_as::<TaskRow>()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| RepositoryError::new(STORE, "list_by_user", e))?;

        let items = rows
            .into_iter()
            .map(|row| row.into_task(&self.cipher))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(items, total_items as u64, page, limit))
    }

    async fn update(&self, id: &str, patch: TaskPatch) -> Result<Task, AppError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE tasks SET modified_at = ");
        builder.push_bind(Utc::now());
        if let Some(title) = &patch.title {
            builder.push(", title = ");
            builder.push_bind(self.cipher.encrypt(title)?);
        }
        if let Some(description) = &patch.description {
            builder.push(", description = ");
            builder.push_bind(self.cipher.encrypt(description)?);
        }
        if let Some(items) = &patch.checklist {
            builder.push(", checklist = ");
            builder.push_bind(encode_checklist(&self.cipher, items)?);
        }
        if let Some(due_date) = &patch.due_date {
            builder.push(", due_date = ");
            builder.push_bind(*due_date);
        }
        if let Some(status) = &patch.status {
            builder.push(", status = ");
            builder.push_bind(status);
        }
        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(" AND deleted_at IS NULL");
        builder.push(format!(" RETURNING {}", TASK_COLUMNS));

        let row = builder
            .build_query_as::<TaskRow>()
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| RepositoryError::new(STORE, "update", e))?;
        match row {
            Some(row) => row.into_task(&self.cipher),
            None => Err(AppError::TaskNotFound),
        }
    }

    async fn delete(&self, id: &str, user_id: &str) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE tasks SET deleted_at = $1 \
             WHERE id = $2 AND user_id = $3 AND deleted_at IS NULL",
        )
        .bind(Utc::now())
        .bind(id)
        .bind(user_id)
        .execute(&*self.pool)
        .await
        .map_err(|e| RepositoryError::new(STORE, "delete", e))?;
        Ok(())
    }

    async fn archive(&self, id: &str, user_id: &str) -> Result<(), AppError> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE tasks SET archived_at = $1, modified_at = $1 \
             WHERE id = $2 AND user_id = $3 AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(id)
        .bind(user_id)
        .execute(&*self.pool)
        .await
        .map_err(|e| RepositoryError::new(STORE, "archive", e))?;
        Ok(())
    }

    async fn unarchive(&self, id: &str, user_id: &str) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE tasks SET archived_at = NULL, modified_at = $1 \
             WHERE id = $2 AND user_id = $3 AND deleted_at IS NULL",
        )
        .bind(Utc::now())
        .bind(id)
        .bind(user_id)
        .execute(&*self.pool)
        .await
        .map_err(|e| RepositoryError::new(STORE, "unarchive", e))?;
        Ok(())
    }

    async fn update_status(
        &self,
        id: &str,
        status: &str,
        user_id: &str,
    ) -> Result<Option<Task>, AppError> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "UPDATE tasks SET status = $1, modified_at = $2 \
             WHERE id = $3 AND user_id = $4 AND deleted_at IS NULL RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(status)
        .bind(Utc::now())
        .bind(id)
        .bind(user_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| RepositoryError::new(STORE, "update_status", e))?;
        row.map(|r| r.into_task(&self.cipher)).transpose()
    }

    async fn bulk_create(&self, tasks: Vec<Task>) -> Result<Vec<Task>, AppError> {
        let attempted = tasks.len();
        let mut created = Vec::with_capacity(attempted);
        let mut last_failure: Option<anyhow::Error> = None;

        // Unordered semantics: each row is inserted on its own so one bad
        // record cannot block its siblings.
        for task in tasks {
            let id = task.id.clone();
            match self.create(task).await {
                Ok(task) => created.push(task),
                Err(err) => {
                    tracing::warn!(task_id = %id, error = %err, "bulk insert dropped a task");
                    last_failure = Some(err.into());
                }
            }
        }

        if created.is_empty() && attempted > 0 {
            let cause = last_failure
                .unwrap_or_else(|| anyhow::anyhow!("no rows were inserted"));
            return Err(AppError::BulkCreateFailed(cause));
        }
        Ok(created)
    }
}

#![allow(dead_code)]
//! In-memory fixtures for the repository contract suite and the auth
//! lifecycle tests.
//!
//! The task fixture keeps records the way a soft-deleting backend would:
//! sensitive fields are stored as ciphertext and decrypted on the way out,
//! and the listing path runs through the same `filter_matches`/`slice_page`
//! helpers the DynamoDB backend uses.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};

use taskvault_backend::error::{AppError, RepositoryError};
use taskvault_backend::models::task::{ChecklistItem, Task, TaskFilter, TaskPatch};
use taskvault_backend::models::user::{NewUser, PasswordReset, User, UserPatch};
use taskvault_backend::models::Page;
use taskvault_backend::repositories::{filter_matches, slice_page, TaskRepository, UserRepository};
use taskvault_backend::utils::encryption::FieldCipher;
use taskvault_backend::utils::Mailer;

pub fn test_cipher_key() -> String {
    STANDARD.encode([42u8; 32])
}

pub fn test_cipher() -> FieldCipher {
    FieldCipher::new(&test_cipher_key()).expect("valid test key")
}

/// Task record as a store would hold it: sensitive fields are ciphertext.
#[derive(Debug, Clone)]
pub struct StoredTask {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub checklist: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

pub struct InMemoryTaskRepository {
    cipher: FieldCipher,
    rows: Mutex<HashMap<String, StoredTask>>,
    /// Task ids whose insert is made to fail, for partial-failure tests.
    fail_inserts: Mutex<HashSet<String>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self {
            cipher: test_cipher(),
            rows: Mutex::new(HashMap::new()),
            fail_inserts: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_insert_of(&self, id: &str) {
        self.fail_inserts.lock().unwrap().insert(id.to_string());
    }

    /// The title column exactly as stored, for at-rest assertions.
    pub fn raw_title(&self, id: &str) -> Option<String> {
        self.rows.lock().unwrap().get(id).map(|row| row.title.clone())
    }

    fn encode(&self, task: &Task) -> Result<StoredTask, AppError> {
        let checklist = match &task.checklist {
            Some(items) => {
                let json = serde_json::to_string(items)
                    .map_err(|e| RepositoryError::new("memory", "encode", e))?;
                Some(self.cipher.encrypt(&json)?)
            }
            None => None,
        };
        Ok(StoredTask {
            id: task.id.clone(),
            user_id: task.user_id.clone(),
            title: self.cipher.encrypt(&task.title)?,
            description: match &task.description {
                Some(value) => Some(self.cipher.encrypt(value)?),
                None => None,
            },
            checklist,
            due_date: task.due_date,
            status: task.status.clone(),
            created_at: task.created_at,
            modified_at: task.modified_at,
            archived_at: task.archived_at,
            deleted_at: task.deleted_at,
        })
    }

    fn decode(&self, row: &StoredTask) -> Result<Task, AppError> {
        let checklist = match &row.checklist {
            Some(stored) => {
                let json = self.cipher.decrypt(stored)?;
                let items: Vec<ChecklistItem> = serde_json::from_str(&json)
                    .map_err(|e| RepositoryError::new("memory", "decode", e))?;
                Some(items)
            }
            None => None,
        };
        Ok(Task {
            id: row.id.clone(),
            user_id: row.user_id.clone(),
            title: self.cipher.decrypt(&row.title)?,
            description: match &row.description {
                Some(value) => Some(self.cipher.decrypt(value)?),
                None => None,
            },
            checklist,
            due_date: row.due_date,
            status: row.status.clone(),
            created_at: row.created_at,
            modified_at: row.modified_at,
            archived_at: row.archived_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn create(&self, task: Task) -> Result<Task, AppError> {
        if self.fail_inserts.lock().unwrap().contains(&task.id) {
            return Err(
                RepositoryError::new("memory", "create", anyhow::anyhow!("simulated fault")).into(),
            );
        }
        let row = self.encode(&task)?;
        self.rows.lock().unwrap().insert(task.id.clone(), row);
        Ok(task)
    }

    async fn find_by_id(&self, id: &str, user_id: &str) -> Result<Option<Task>, AppError> {
        let rows = self.rows.lock().unwrap();
        rows.get(id)
            .filter(|row| row.user_id == user_id && row.deleted_at.is_none())
            .map(|row| self.decode(row))
            .transpose()
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
        let rows = self.rows.lock().unwrap();
        let mut matching = Vec::new();
        for row in rows.values().filter(|row| row.user_id == user_id) {
            let task = self.decode(row)?;
            if filter_matches(&task, filter) {
                matching.push(task);
            }
        }
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total_items = matching.len() as u64;
        let items = slice_page(&matching, page, limit);
        Ok(Page::new(items, total_items, page, limit))
    }

    async fn update(&self, id: &str, patch: TaskPatch) -> Result<Task, AppError> {
        let mut rows = self.rows.lock().unwrap();
        let row = match rows.get(id) {
            Some(row) if row.deleted_at.is_none() => row.clone(),
            _ => return Err(AppError::TaskNotFound),
        };
        let mut task = self.decode(&row)?;
        if let Some(title) = patch.title {
            task.title = title;
        }
        if let Some(description) = patch.description {
            task.description = Some(description);
        }
        if let Some(checklist) = patch.checklist {
            task.checklist = Some(checklist);
        }
        if let Some(due_date) = patch.due_date {
            task.due_date = Some(due_date);
        }
        if let Some(status) = patch.status {
            task.status = status;
        }
        task.modified_at = Some(Utc::now());
        rows.insert(id.to_string(), self.encode(&task)?);
        Ok(task)
    }

    async fn delete(&self, id: &str, user_id: &str) -> Result<(), AppError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.get_mut(id) {
            if row.user_id == user_id {
                row.deleted_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn archive(&self, id: &str, user_id: &str) -> Result<(), AppError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.get_mut(id) {
            if row.user_id == user_id && row.deleted_at.is_none() {
                let now = Utc::now();
                row.archived_at = Some(now);
                row.modified_at = Some(now);
            }
        }
        Ok(())
    }

    async fn unarchive(&self, id: &str, user_id: &str) -> Result<(), AppError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.get_mut(id) {
            if row.user_id == user_id && row.deleted_at.is_none() {
                row.archived_at = None;
                row.modified_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn update_status(
        &self,
        id: &str,
        status: &str,
        user_id: &str,
    ) -> Result<Option<Task>, AppError> {
        let mut rows = self.rows.lock().unwrap();
        let row = match rows.get(id) {
            Some(row) if row.user_id == user_id && row.deleted_at.is_none() => row.clone(),
            _ => return Ok(None),
        };
        let mut task = self.decode(&row)?;
        task.status = status.to_string();
        task.modified_at = Some(Utc::now());
        rows.insert(id.to_string(), self.encode(&task)?);
        Ok(Some(task))
    }

    async fn bulk_create(&self, tasks: Vec<Task>) -> Result<Vec<Task>, AppError> {
        let attempted = tasks.len();
        let mut created = Vec::with_capacity(attempted);
        let mut last_failure: Option<anyhow::Error> = None;
        for task in tasks {
            match self.create(task).await {
                Ok(task) => created.push(task),
                Err(err) => last_failure = Some(err.into()),
            }
        }
        if created.is_empty() && attempted > 0 {
            let cause =
                last_failure.unwrap_or_else(|| anyhow::anyhow!("no rows were inserted"));
            return Err(AppError::BulkCreateFailed(cause));
        }
        Ok(created)
    }
}

pub struct InMemoryUserRepository {
    users: Mutex<HashMap<String, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
        }
    }

    /// Installs reset state directly, for expiry tests.
    pub fn set_reset(&self, user_id: &str, reset: PasswordReset) {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.get_mut(user_id) {
            user.password_reset = Some(reset);
        }
    }

    pub fn get(&self, user_id: &str) -> Option<User> {
        self.users.lock().unwrap().get(user_id).cloned()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<User>, AppError> {
        let users = self.users.lock().unwrap();
        // username precedence on double collision
        if let Some(user) = users.values().find(|u| u.username == username) {
            return Ok(Some(user.clone()));
        }
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let users = self.users.lock().unwrap();
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let users = self.users.lock().unwrap();
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.lock().unwrap().get(id).cloned())
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError> {
        let users = self.users.lock().unwrap();
        Ok(users
            .values()
            .find(|u| {
                u.password_reset
                    .as_ref()
                    .map(|reset| reset.token_hash == token_hash && reset.expires_at > now)
                    .unwrap_or(false)
            })
            .cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User, AppError> {
        let user = User::new(user.username, user.email, user.password_hash);
        self.users
            .lock()
            .unwrap()
            .insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn update(&self, id: &str, patch: UserPatch) -> Result<Option<User>, AppError> {
        let mut users = self.users.lock().unwrap();
        let user = match users.get_mut(id) {
            Some(user) => user,
            None => return Ok(None),
        };
        if let Some(password_hash) = patch.password_hash {
            user.password_hash = password_hash;
        }
        if let Some(reset) = patch.password_reset {
            user.password_reset = reset;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }
}

/// Mailer that records instead of sending.
#[derive(Default)]
pub struct RecordingMailer {
    pub reset_emails: Mutex<Vec<(String, String)>>,
    pub welcome_emails: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_password_reset_email(&self, to: &str, reset_url: &str) -> anyhow::Result<()> {
        self.reset_emails
            .lock()
            .unwrap()
            .push((to.to_string(), reset_url.to_string()));
        Ok(())
    }

    async fn send_welcome_email(&self, to: &str, username: &str) -> anyhow::Result<()> {
        self.welcome_emails
            .lock()
            .unwrap()
            .push((to.to_string(), username.to_string()));
        Ok(())
    }
}

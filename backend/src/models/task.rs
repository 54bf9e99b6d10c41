//! Models for tasks, checklists, and task list filtering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A single checklist entry inside a task.
///
/// Repository callers always see this structured form; how it is stored
/// (native nested document or an encrypted serialized string) is a backend
/// concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: String,
    pub text: String,
    pub completed: bool,
}

/// Persistent representation of a task. Always owned by exactly one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for the task.
    pub id: String,
    /// Owning user. Every scoped repository operation pairs this with `id`.
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub checklist: Option<Vec<ChecklistItem>>,
    pub due_date: Option<DateTime<Utc>>,
    /// Free-form status string, e.g. "new", "active", "completed".
    pub status: String,
    pub created_at: DateTime<Utc>,
    /// Set on every mutation.
    pub modified_at: Option<DateTime<Utc>>,
    /// Non-null marks the task archived.
    pub archived_at: Option<DateTime<Utc>>,
    /// Soft-delete marker; backends that hard-delete never set it.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Payload for creating a task.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTask {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    pub checklist: Option<Vec<ChecklistItem>>,
    pub due_date: Option<DateTime<Utc>>,
    pub status: Option<String>,
}

/// Partial update for a task. Absent fields are left unchanged; the shape is
/// enumerated here rather than inferred at runtime.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub checklist: Option<Vec<ChecklistItem>>,
    pub due_date: Option<DateTime<Utc>>,
    pub status: Option<String>,
}

impl TaskPatch {
    /// Returns `true` when the patch would change nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.checklist.is_none()
            && self.due_date.is_none()
            && self.status.is_none()
    }
}

/// Conjunctive filter for task listings.
///
/// `archived: None` keeps the default of unarchived tasks only;
/// `Some(true)` lists archived tasks instead.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFilter {
    pub archived: Option<bool>,
    pub status: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

impl Task {
    /// Constructs a task for `user_id` from a creation payload. Status
    /// defaults to "new" when the payload leaves it out.
    pub fn new(user_id: String, input: CreateTask) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            title: input.title,
            description: input.description,
            checklist: input.checklist,
            due_date: input.due_date,
            status: input.status.unwrap_or_else(|| "new".to_string()),
            created_at: Utc::now(),
            modified_at: None,
            archived_at: None,
            deleted_at: None,
        }
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

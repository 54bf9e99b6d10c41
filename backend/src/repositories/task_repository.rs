//! Task repository contract and the filter/pagination semantics shared by
//! backends that page in memory.
//!
//! Encryption of `title`, `description`, and `checklist` happens inside each
//! backend; callers of this trait only ever see plaintext domain objects.

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::task::{Task, TaskFilter, TaskPatch};
use crate::models::Page;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: Task) -> Result<Task, AppError>;

    async fn find_by_id(&self, id: &str, user_id: &str) -> Result<Option<Task>, AppError>;

    /// Lists the user's tasks matching `filter`, newest-created-first,
    /// sliced to the 1-based `page` of size `limit`. Soft-deleted tasks are
    /// never returned; archived tasks only when the filter asks for them.
    /// `total_items` counts every match, independent of paging.
    async fn list_by_user(
        &self,
        user_id: &str,
        page: u64,
        limit: u64,
        filter: &TaskFilter,
    ) -> Result<Page<Task>, AppError>;

    /// Applies a partial update and stamps `modified_at`. Fails with
    /// [`AppError::TaskNotFound`] when no record matches.
    async fn update(&self, id: &str, patch: TaskPatch) -> Result<Task, AppError>;

    /// Removes the task (hard or soft, per backend). A missing record is a
    /// no-op, so repeated calls are safe.
    async fn delete(&self, id: &str, user_id: &str) -> Result<(), AppError>;

    async fn archive(&self, id: &str, user_id: &str) -> Result<(), AppError>;

    async fn unarchive(&self, id: &str, user_id: &str) -> Result<(), AppError>;

    /// Sets the status, stamping `modified_at`. Returns `None` (not an
    /// error) when no task matches `(id, user_id)`.
    async fn update_status(
        &self,
        id: &str,
        status: &str,
        user_id: &str,
    ) -> Result<Option<Task>, AppError>;

    /// Unordered multi-insert: one record failing must not block the
    /// others. Returns the tasks that were persisted. Fails with
    /// [`AppError::BulkCreateFailed`] only when the operation as a whole
    /// cannot proceed.
    async fn bulk_create(&self, tasks: Vec<Task>) -> Result<Vec<Task>, AppError>;
}

/// Whether a task is visible under `filter`.
///
/// Soft-deleted tasks never match. `archived: None` keeps the default of
/// unarchived tasks; `Some(true)` flips the listing to archived tasks only.
/// `status` and `due_date` are exact-match, and all predicates conjoin.
pub fn filter_matches(task: &Task, filter: &TaskFilter) -> bool {
    if task.deleted_at.is_some() {
        return false;
    }
    if task.archived_at.is_some() != filter.archived.unwrap_or(false) {
        return false;
    }
    if let Some(status) = &filter.status {
        if &task.status != status {
            return false;
        }
    }
    if let Some(due_date) = &filter.due_date {
        if task.due_date.as_ref() != Some(due_date) {
            return false;
        }
    }
    true
}

/// Slices one 1-based page out of an already-ordered full result set.
pub fn slice_page<T: Clone>(items: &[T], page: u64, limit: u64) -> Vec<T> {
    let page = page.max(1);
    let start = (page - 1).saturating_mul(limit) as usize;
    items.iter().skip(start).take(limit as usize).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::CreateTask;
    use chrono::Utc;

    fn task(status: &str) -> Task {
        Task::new(
            "u1".into(),
            CreateTask {
                title: "t".into(),
                description: None,
                checklist: None,
                due_date: None,
                status: Some(status.into()),
            },
        )
    }

    #[test]
    fn deleted_tasks_never_match() {
        let mut t = task("new");
        t.deleted_at = Some(Utc::now());
        assert!(!filter_matches(&t, &TaskFilter::default()));
        let archived_filter = TaskFilter {
            archived: Some(true),
            ..Default::default()
        };
        assert!(!filter_matches(&t, &archived_filter));
    }

    #[test]
    fn archived_excluded_unless_requested() {
        let mut t = task("new");
        t.archived_at = Some(Utc::now());
        assert!(!filter_matches(&t, &TaskFilter::default()));
        assert!(filter_matches(
            &t,
            &TaskFilter {
                archived: Some(true),
                ..Default::default()
            }
        ));
        assert!(!filter_matches(
            &task("new"),
            &TaskFilter {
                archived: Some(true),
                ..Default::default()
            }
        ));
    }

    #[test]
    fn status_and_due_date_conjoin() {
        let due = Utc::now();
        let mut t = task("active");
        t.due_date = Some(due);
        let filter = TaskFilter {
            archived: None,
            status: Some("active".into()),
            due_date: Some(due),
        };
        assert!(filter_matches(&t, &filter));

        let wrong_status = TaskFilter {
            status: Some("done".into()),
            ..filter.clone()
        };
        assert!(!filter_matches(&t, &wrong_status));
    }

    #[test]
    fn slice_page_bounds_and_clamps() {
        let items: Vec<u64> = (0..25).collect();
        assert_eq!(slice_page(&items, 1, 10), (0..10).collect::<Vec<_>>());
        assert_eq!(slice_page(&items, 3, 10), (20..25).collect::<Vec<_>>());
        assert!(slice_page(&items, 4, 10).is_empty());
        // page 0 is treated as page 1
        assert_eq!(slice_page(&items, 0, 10), (0..10).collect::<Vec<_>>());
    }
}

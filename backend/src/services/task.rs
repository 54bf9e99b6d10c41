//! Task lifecycle orchestration.
//!
//! Thin by design: payloads are validated here, everything else delegates to
//! the repository contract so all three backends behave identically.

use std::sync::Arc;

use validator::Validate;

use crate::error::AppError;
use crate::models::task::{CreateTask, Task, TaskFilter, TaskPatch};
use crate::models::Page;
use crate::repositories::task_repository::TaskRepository;

pub struct TaskService {
    tasks: Arc<dyn TaskRepository>,
}

impl TaskService {
    pub fn new(tasks: Arc<dyn TaskRepository>) -> Self {
        Self { tasks }
    }

    pub async fn create_task(&self, user_id: &str, input: CreateTask) -> Result<Task, AppError> {
        input.validate()?;
        self.tasks.create(Task::new(user_id.to_string(), input)).await
    }

    pub async fn get_task(&self, id: &str, user_id: &str) -> Result<Option<Task>, AppError> {
        self.tasks.find_by_id(id, user_id).await
    }

    pub async fn get_tasks(
        &self,
        user_id: &str,
        page: u64,
        limit: u64,
        filter: &TaskFilter,
    ) -> Result<Page<Task>, AppError> {
        self.tasks.list_by_user(user_id, page, limit, filter).await
    }

    pub async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task, AppError> {
        self.tasks.update(id, patch).await
    }

    pub async fn delete_task(&self, id: &str, user_id: &str) -> Result<(), AppError> {
        self.tasks.delete(id, user_id).await
    }

    pub async fn archive_task(&self, id: &str, user_id: &str) -> Result<(), AppError> {
        self.tasks.archive(id, user_id).await
    }

    pub async fn unarchive_task(&self, id: &str, user_id: &str) -> Result<(), AppError> {
        self.tasks.unarchive(id, user_id).await
    }

    /// Passes the repository's `None` straight through: a missing task is a
    /// value here, not an error.
    pub async fn update_task_status(
        &self,
        id: &str,
        status: &str,
        user_id: &str,
    ) -> Result<Option<Task>, AppError> {
        self.tasks.update_status(id, status, user_id).await
    }

    /// Imports a batch of tasks for one user. Validation failures reject the
    /// batch up front; storage-level partial failures follow the unordered
    /// bulk insert contract.
    pub async fn bulk_import(
        &self,
        user_id: &str,
        inputs: Vec<CreateTask>,
    ) -> Result<Vec<Task>, AppError> {
        let mut tasks = Vec::with_capacity(inputs.len());
        for input in inputs {
            input.validate()?;
            tasks.push(Task::new(user_id.to_string(), input));
        }
        self.tasks.bulk_create(tasks).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::task_repository::MockTaskRepository;

    fn input(title: &str) -> CreateTask {
        CreateTask {
            title: title.to_string(),
            description: None,
            checklist: None,
            due_date: None,
            status: None,
        }
    }

    #[tokio::test]
    async fn create_task_rejects_invalid_payloads_before_the_store() {
        // No expectations: a repository call would panic the test.
        let service = TaskService::new(Arc::new(MockTaskRepository::new()));
        let result = service.create_task("u1", input("")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn create_task_stamps_the_owner() {
        let mut tasks = MockTaskRepository::new();
        tasks.expect_create().returning(|task| {
            assert_eq!(task.user_id, "u1");
            assert_eq!(task.status, "new");
            Ok(task)
        });

        let service = TaskService::new(Arc::new(tasks));
        let task = service.create_task("u1", input("Buy milk")).await.unwrap();
        assert_eq!(task.title, "Buy milk");
    }

    #[tokio::test]
    async fn update_status_on_missing_task_is_none_not_error() {
        let mut tasks = MockTaskRepository::new();
        tasks
            .expect_update_status()
            .returning(|_, _, _| Ok(None));

        let service = TaskService::new(Arc::new(tasks));
        let result = service
            .update_task_status("missing-id", "done", "u1")
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn bulk_import_builds_tasks_for_the_owner() {
        let mut tasks = MockTaskRepository::new();
        tasks.expect_bulk_create().returning(|tasks| {
            assert_eq!(tasks.len(), 2);
            assert!(tasks.iter().all(|t| t.user_id == "u1"));
            Ok(tasks)
        });

        let service = TaskService::new(Arc::new(tasks));
        let imported = service
            .bulk_import("u1", vec![input("a"), input("b")])
            .await
            .unwrap();
        assert_eq!(imported.len(), 2);
    }

    #[tokio::test]
    async fn bulk_import_rejects_the_batch_on_invalid_input() {
        let service = TaskService::new(Arc::new(MockTaskRepository::new()));
        let result = service.bulk_import("u1", vec![input("ok"), input("")]).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client;
use chrono::Utc;

use crate::error::{AppError, RepositoryError};
use crate::models::task::{ChecklistItem, Task, TaskFilter, TaskPatch};
use crate::models::Page;
use crate::repositories::task_repository::{filter_matches, slice_page, TaskRepository};
use crate::utils::encryption::FieldCipher;

use super::user::{
    attr_datetime, attr_opt_datetime, attr_opt_s, attr_s, format_datetime, Item,
};
use super::{STORE, USER_INDEX};

/// Checklists are kept as one encrypted JSON string attribute; DynamoDB
/// nesting buys nothing once the content is ciphertext anyway.
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
    serde_json::from_str(&json)
        .map_err(|e| RepositoryError::new(STORE, "decode_checklist", e).into())
}

fn task_to_item(cipher: &FieldCipher, task: &Task) -> Result<Item, AppError> {
    let mut item = Item::new();
    item.insert("id".into(), AttributeValue::S(task.id.clone()));
    item.insert("user_id".into(), AttributeValue::S(task.user_id.clone()));
    item.insert("title".into(), AttributeValue::S(cipher.encrypt(&task.title)?));
    if let Some(description) = &task.description {
        item.insert(
            "description".into(),
            AttributeValue::S(cipher.encrypt(description)?),
        );
    }
    if let Some(checklist) = &task.checklist {
        item.insert(
            "checklist".into(),
            AttributeValue::S(encode_checklist(cipher, checklist)?),
        );
    }
    if let Some(due_date) = task.due_date {
        item.insert("due_date".into(), AttributeValue::S(format_datetime(due_date)));
    }
    item.insert("status".into(), AttributeValue::S(task.status.clone()));
    item.insert(
        "created_at".into(),
        AttributeValue::S(format_datetime(task.created_at)),
    );
    if let Some(modified_at) = task.modified_at {
        item.insert(
            "modified_at".into(),
            AttributeValue::S(format_datetime(modified_at)),
        );
    }
    if let Some(archived_at) = task.archived_at {
        item.insert(
            "archived_at".into(),
            AttributeValue::S(format_datetime(archived_at)),
        );
    }
    Ok(item)
}

fn item_to_task(cipher: &FieldCipher, item: &Item) -> Result<Task, AppError> {
    let description = match attr_opt_s(item, "description") {
        Some(value) => Some(cipher.decrypt(&value)?),
        None => None,
    };
    let checklist = match attr_opt_s(item, "checklist") {
        Some(value) => Some(decode_checklist(cipher, &value)?),
        None => None,
    };

    Ok(Task {
        id: attr_s(item, "id")?,
        user_id: attr_s(item, "user_id")?,
        title: cipher.decrypt(&attr_s(item, "title")?)?,
        description,
        checklist,
        due_date: attr_opt_datetime(item, "due_date")?,
        status: attr_s(item, "status")?,
        created_at: attr_datetime(item, "created_at")?,
        modified_at: attr_opt_datetime(item, "modified_at")?,
        archived_at: attr_opt_datetime(item, "archived_at")?,
        // This backend deletes physically; a fetched item is live.
        deleted_at: None,
    })
}

pub struct DynamoTaskRepository {
    client: Client,
    table: String,
    cipher: Arc<FieldCipher>,
}

impl DynamoTaskRepository {
    pub fn new(client: Client, table: String, cipher: Arc<FieldCipher>) -> Self {
        Self {
            client,
            table,
            cipher,
        }
    }

    /// Fetches every task in the user's index partition, decrypted.
    async fn fetch_user_tasks(
        &self,
        operation: &'static str,
        user_id: &str,
    ) -> Result<Vec<Task>, AppError> {
        let items: Vec<Item> = self
            .client
            .query()
            .table_name(&self.table)
            .index_name(USER_INDEX)
            .key_condition_expression("#user_id = :user_id")
            .expression_attribute_names("#user_id", "user_id")
            .expression_attribute_values(":user_id", AttributeValue::S(user_id.to_string()))
            .into_paginator()
            .items()
            .send()
            .collect::<Result<Vec<_>, _>>()
            .await
            .map_err(|e| RepositoryError::new(STORE, operation, e))?;

        items
            .iter()
            .map(|item| item_to_task(&self.cipher, item))
            .collect()
    }

}

#[async_trait]
impl TaskRepository for DynamoTaskRepository {
    async fn create(&self, task: Task) -> Result<Task, AppError> {
        let item = task_to_item(&self.cipher, &task)?;
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| RepositoryError::new(STORE, "create", e))?;
        Ok(task)
    }

    async fn find_by_id(&self, id: &str, user_id: &str) -> Result<Option<Task>, AppError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .key("id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| RepositoryError::new(STORE, "find_by_id", e))?;
        let task = output
            .item
            .as_ref()
            .map(|item| item_to_task(&self.cipher, item))
            .transpose()?;
        Ok(task.filter(|task| task.user_id == user_id))
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

        let mut matching: Vec<Task> = self
            .fetch_user_tasks("list_by_user", user_id)
            .await?
            .into_iter()
            .filter(|task| filter_matches(task, filter))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total_items = matching.len() as u64;
        let items = slice_page(&matching, page, limit);
        Ok(Page::new(items, total_items, page, limit))
    }

    async fn update(&self, id: &str, patch: TaskPatch) -> Result<Task, AppError> {
        let mut sets = vec!["#modified_at = :modified_at".to_string()];
        let mut request = self
            .client
            .update_item()
            .table_name(&self.table)
            .key("id", AttributeValue::S(id.to_string()))
            .condition_expression("attribute_exists(#id)")
            .expression_attribute_names("#id", "id")
            .expression_attribute_names("#modified_at", "modified_at")
            .expression_attribute_values(
                ":modified_at",
                AttributeValue::S(format_datetime(Utc::now())),
            )
            .return_values(ReturnValue::AllNew);

        if let Some(title) = &patch.title {
            sets.push("#title = :title".into());
            request = request
                .expression_attribute_names("#title", "title")
                .expression_attribute_values(
                    ":title",
                    AttributeValue::S(self.cipher.encrypt(title)?),
                );
        }
        if let Some(description) = &patch.description {
            sets.push("#description = :description".into());
            request = request
                .expression_attribute_names("#description", "description")
                .expression_attribute_values(
                    ":description",
                    AttributeValue::S(self.cipher.encrypt(description)?),
                );
        }
        if let Some(checklist) = &patch.checklist {
            sets.push("#checklist = :checklist".into());
            request = request
                .expression_attribute_names("#checklist", "checklist")
                .expression_attribute_values(
                    ":checklist",
                    AttributeValue::S(encode_checklist(&self.cipher, checklist)?),
                );
        }
        if let Some(due_date) = &patch.due_date {
            sets.push("#due_date = :due_date".into());
            request = request
                .expression_attribute_names("#due_date", "due_date")
                .expression_attribute_values(
                    ":due_date",
                    AttributeValue::S(format_datetime(*due_date)),
                );
        }
        if let Some(status) = &patch.status {
            sets.push("#status = :status".into());
            request = request
                .expression_attribute_names("#status", "status")
                .expression_attribute_values(":status", AttributeValue::S(status.clone()));
        }

        let result = request
            .update_expression(format!("SET {}", sets.join(", ")))
            .send()
            .await;
        match result {
            Ok(output) => {
                let attributes = output.attributes.ok_or_else(|| {
                    RepositoryError::new(
                        STORE,
                        "update",
                        anyhow::anyhow!("update returned no attributes"),
                    )
                })?;
                item_to_task(&self.cipher, &attributes)
            }
            Err(err) => {
                let service_error = err.into_service_error();
                if service_error.is_conditional_check_failed_exception() {
                    return Err(AppError::TaskNotFound);
                }
                Err(RepositoryError::new(STORE, "update", service_error).into())
            }
        }
    }

    async fn delete(&self, id: &str, user_id: &str) -> Result<(), AppError> {
        let result = self
            .client
            .delete_item()
            .table_name(&self.table)
            .key("id", AttributeValue::S(id.to_string()))
            .condition_expression("#user_id = :user_id")
            .expression_attribute_names("#user_id", "user_id")
            .expression_attribute_values(":user_id", AttributeValue::S(user_id.to_string()))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let service_error = err.into_service_error();
                // Missing or foreign items are a no-op, per the idempotent
                // delete contract.
                if service_error.is_conditional_check_failed_exception() {
                    return Ok(());
                }
                Err(RepositoryError::new(STORE, "delete", service_error).into())
            }
        }
    }

    async fn archive(&self, id: &str, user_id: &str) -> Result<(), AppError> {
        let expression = "SET #archived_at = :modified_at, #modified_at = :modified_at";
        let result = self
            .client
            .update_item()
            .table_name(&self.table)
            .key("id", AttributeValue::S(id.to_string()))
            .condition_expression("#user_id = :user_id")
            .expression_attribute_names("#user_id", "user_id")
            .expression_attribute_names("#archived_at", "archived_at")
            .expression_attribute_names("#modified_at", "modified_at")
            .expression_attribute_values(":user_id", AttributeValue::S(user_id.to_string()))
            .expression_attribute_values(
                ":modified_at",
                AttributeValue::S(format_datetime(Utc::now())),
            )
            .update_expression(expression)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let service_error = err.into_service_error();
                if service_error.is_conditional_check_failed_exception() {
                    return Ok(());
                }
                Err(RepositoryError::new(STORE, "archive", service_error).into())
            }
        }
    }

    async fn unarchive(&self, id: &str, user_id: &str) -> Result<(), AppError> {
        let expression = "SET #modified_at = :modified_at REMOVE #archived_at";
        let result = self
            .client
            .update_item()
            .table_name(&self.table)
            .key("id", AttributeValue::S(id.to_string()))
            .condition_expression("#user_id = :user_id")
            .expression_attribute_names("#user_id", "user_id")
            .expression_attribute_names("#archived_at", "archived_at")
            .expression_attribute_names("#modified_at", "modified_at")
            .expression_attribute_values(":user_id", AttributeValue::S(user_id.to_string()))
            .expression_attribute_values(
                ":modified_at",
                AttributeValue::S(format_datetime(Utc::now())),
            )
            .update_expression(expression)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let service_error = err.into_service_error();
                if service_error.is_conditional_check_failed_exception() {
                    return Ok(());
                }
                Err(RepositoryError::new(STORE, "unarchive", service_error).into())
            }
        }
    }

    async fn update_status(
        &self,
        id: &str,
        status: &str,
        user_id: &str,
    ) -> Result<Option<Task>, AppError> {
        let result = self
            .client
            .update_item()
            .table_name(&self.table)
            .key("id", AttributeValue::S(id.to_string()))
            .condition_expression("#user_id = :user_id")
            .expression_attribute_names("#user_id", "user_id")
            .expression_attribute_names("#status", "status")
            .expression_attribute_names("#modified_at", "modified_at")
            .expression_attribute_values(":user_id", AttributeValue::S(user_id.to_string()))
            .expression_attribute_values(":status", AttributeValue::S(status.to_string()))
            .expression_attribute_values(
                ":modified_at",
                AttributeValue::S(format_datetime(Utc::now())),
            )
            .update_expression("SET #status = :status, #modified_at = :modified_at")
            .return_values(ReturnValue::AllNew)
            .send()
            .await;

        match result {
            Ok(output) => output
                .attributes
                .as_ref()
                .map(|item| item_to_task(&self.cipher, item))
                .transpose(),
            Err(err) => {
                let service_error = err.into_service_error();
                if service_error.is_conditional_check_failed_exception() {
                    return Ok(None);
                }
                Err(RepositoryError::new(STORE, "update_status", service_error).into())
            }
        }
    }

    async fn bulk_create(&self, tasks: Vec<Task>) -> Result<Vec<Task>, AppError> {
        let attempted = tasks.len();
        let mut created = Vec::with_capacity(attempted);
        let mut last_failure: Option<anyhow::Error> = None;

        // Unordered semantics: every item gets its own put so one failure
        // cannot block the rest.
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
            let cause =
                last_failure.unwrap_or_else(|| anyhow::anyhow!("no items were inserted"));
            return Err(AppError::BulkCreateFailed(cause));
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use crate::models::task::CreateTask;

    fn cipher() -> FieldCipher {
        FieldCipher::new(&STANDARD.encode([9u8; 32])).unwrap()
    }

    fn sample_task() -> Task {
        Task::new(
            "u1".into(),
            CreateTask {
                title: "Buy milk".into(),
                description: Some("2 liters".into()),
                checklist: Some(vec![ChecklistItem {
                    id: "c1".into(),
                    text: "semi-skimmed".into(),
                    completed: true,
                }]),
                due_date: Some(Utc::now()),
                status: None,
            },
        )
    }

    #[test]
    fn task_item_round_trip_decrypts_fields() {
        let cipher = cipher();
        let task = sample_task();
        let item = task_to_item(&cipher, &task).unwrap();

        // everything sensitive is ciphertext at rest
        assert_ne!(item["title"].as_s().unwrap(), "Buy milk");
        assert!(!item["checklist"].as_s().unwrap().contains("semi-skimmed"));

        let restored = item_to_task(&cipher, &item).unwrap();
        assert_eq!(restored.title, "Buy milk");
        assert_eq!(restored.description.as_deref(), Some("2 liters"));
        assert_eq!(restored.checklist.unwrap()[0].text, "semi-skimmed");
        assert_eq!(restored.due_date, task.due_date);
    }

    #[test]
    fn absent_optionals_stay_absent() {
        let cipher = cipher();
        let task = Task::new(
            "u1".into(),
            CreateTask {
                title: "Plain".into(),
                description: None,
                checklist: None,
                due_date: None,
                status: None,
            },
        );
        let item = task_to_item(&cipher, &task).unwrap();
        assert!(!item.contains_key("description"));
        assert!(!item.contains_key("archived_at"));

        let restored = item_to_task(&cipher, &item).unwrap();
        assert!(restored.description.is_none());
        assert!(restored.checklist.is_none());
        assert!(restored.deleted_at.is_none());
    }
}

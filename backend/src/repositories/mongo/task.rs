use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, DateTime as BsonDateTime, Document};
use mongodb::error::ErrorKind;
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, InsertManyOptions, ReturnDocument};
use mongodb::{Collection, Database};

use crate::error::{AppError, RepositoryError};
use crate::models::task::{ChecklistItem, Task, TaskFilter, TaskPatch};
use crate::models::Page;
use crate::repositories::task_repository::TaskRepository;
use crate::utils::encryption::FieldCipher;

use super::user::{opt_datetime, opt_string, req_datetime};
use super::{STORE, TASKS_COLLECTION};

pub struct MongoTaskRepository {
    collection: Collection<Document>,
    cipher: Arc<FieldCipher>,
}

impl MongoTaskRepository {
    pub fn new(database: &Database, cipher: Arc<FieldCipher>) -> Self {
        Self {
            collection: database.collection(TASKS_COLLECTION),
            cipher,
        }
    }
}

/// Checklists stay a native array in this store; only each item's `text`
/// is ciphertext.
fn checklist_to_bson(cipher: &FieldCipher, items: &[ChecklistItem]) -> Result<Bson, AppError> {
    let mut encoded = Vec::with_capacity(items.len());
    for item in items {
        encoded.push(Bson::Document(doc! {
            "id": &item.id,
            "text": cipher.encrypt(&item.text)?,
            "completed": item.completed,
        }));
    }
    Ok(Bson::Array(encoded))
}

fn checklist_from_bson(cipher: &FieldCipher, value: &Bson) -> Result<Vec<ChecklistItem>, AppError> {
    let entries = match value {
        Bson::Array(entries) => entries,
        _ => return Err(RepositoryError::new(
            STORE,
            "read_checklist",
            anyhow::anyhow!("checklist is not an array"),
        )
        .into()),
    };

    let mut items = Vec::with_capacity(entries.len());
    for entry in entries {
        let document = entry.as_document().ok_or_else(|| {
            RepositoryError::new(
                STORE,
                "read_checklist",
                anyhow::anyhow!("checklist entry is not a document"),
            )
        })?;
        items.push(ChecklistItem {
            id: document
                .get_str("id")
                .map_err(|e| RepositoryError::new(STORE, "read_checklist", e))?
                .to_owned(),
            text: cipher.decrypt(
                document
                    .get_str("text")
                    .map_err(|e| RepositoryError::new(STORE, "read_checklist", e))?,
            )?,
            completed: document
                .get_bool("completed")
                .map_err(|e| RepositoryError::new(STORE, "read_checklist", e))?,
        });
    }
    Ok(items)
}

fn task_to_doc(cipher: &FieldCipher, task: &Task) -> Result<Document, AppError> {
    let description = match &task.description {
        Some(value) => Bson::String(cipher.encrypt(value)?),
        None => Bson::Null,
    };
    let checklist = match &task.checklist {
        Some(items) => checklist_to_bson(cipher, items)?,
        None => Bson::Null,
    };
    let due_date = match task.due_date {
        Some(value) => Bson::DateTime(BsonDateTime::from_chrono(value)),
        None => Bson::Null,
    };
    let modified_at = match task.modified_at {
        Some(value) => Bson::DateTime(BsonDateTime::from_chrono(value)),
        None => Bson::Null,
    };
    let archived_at = match task.archived_at {
        Some(value) => Bson::DateTime(BsonDateTime::from_chrono(value)),
        None => Bson::Null,
    };

    Ok(doc! {
        "_id": &task.id,
        "user_id": &task.user_id,
        "title": cipher.encrypt(&task.title)?,
        "description": description,
        "checklist": checklist,
        "due_date": due_date,
        "status": &task.status,
        "created_at": BsonDateTime::from_chrono(task.created_at),
        "modified_at": modified_at,
        "archived_at": archived_at,
    })
}

fn doc_to_task(cipher: &FieldCipher, document: &Document) -> Result<Task, AppError> {
    let read = |res: Result<&str, mongodb::bson::document::ValueAccessError>| {
        res.map(str::to_owned)
            .map_err(|e| RepositoryError::new(STORE, "doc_to_task", e))
    };

    let description = match opt_string(document, "description") {
        Some(value) => Some(cipher.decrypt(&value)?),
        None => None,
    };
    let checklist = match document.get("checklist") {
        Some(value @ Bson::Array(_)) => Some(checklist_from_bson(cipher, value)?),
        _ => None,
    };

    Ok(Task {
        id: read(document.get_str("_id"))?,
        user_id: read(document.get_str("user_id"))?,
        title: cipher.decrypt(&read(document.get_str("title"))?)?,
        description,
        checklist,
        due_date: opt_datetime(document, "due_date"),
        status: read(document.get_str("status"))?,
        created_at: req_datetime(document, "created_at")?,
        modified_at: opt_datetime(document, "modified_at"),
        archived_at: opt_datetime(document, "archived_at"),
        // This backend deletes physically; a fetched document is live.
        deleted_at: None,
    })
}

fn list_filter(user_id: &str, filter: &TaskFilter) -> Document {
    let mut query = doc! { "user_id": user_id };
    if filter.archived.unwrap_or(false) {
        query.insert("archived_at", doc! { "$ne": Bson::Null });
    } else {
        query.insert("archived_at", Bson::Null);
    }
    if let Some(status) = &filter.status {
        query.insert("status", status);
    }
    if let Some(due_date) = &filter.due_date {
        query.insert("due_date", BsonDateTime::from_chrono(*due_date));
    }
    query
}

#[async_trait]
impl TaskRepository for MongoTaskRepository {
    async fn create(&self, task: Task) -> Result<Task, AppError> {
        let document = task_to_doc(&self.cipher, &task)?;
        self.collection
            .insert_one(document, None)
            .await
            .map_err(|e| RepositoryError::new(STORE, "create", e))?;
        Ok(task)
    }

    async fn find_by_id(&self, id: &str, user_id: &str) -> Result<Option<Task>, AppError> {
        let found = self
            .collection
            .find_one(doc! { "_id": id, "user_id": user_id }, None)
            .await
            .map_err(|e| RepositoryError::new(STORE, "find_by_id", e))?;
        found.map(|doc| doc_to_task(&self.cipher, &doc)).transpose()
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
        let query = list_filter(user_id, filter);

        let total_items = self
            .collection
            .count_documents(query.clone(), None)
            .await
            .map_err(|e| RepositoryError::new(STORE, "list_by_user", e))?;

        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .skip((page - 1) * limit)
            .limit(limit as i64)
            .build();
        let documents: Vec<Document> = self
            .collection
            .find(query, options)
            .await
            .map_err(|e| RepositoryError::new(STORE, "list_by_user", e))?
            .try_collect()
            .await
            .map_err(|e| RepositoryError::new(STORE, "list_by_user", e))?;

        let items = documents
            .iter()
            .map(|doc| doc_to_task(&self.cipher, doc))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(items, total_items, page, limit))
    }

    async fn update(&self, id: &str, patch: TaskPatch) -> Result<Task, AppError> {
        let mut set = doc! { "modified_at": BsonDateTime::from_chrono(Utc::now()) };
        if let Some(title) = &patch.title {
            set.insert("title", self.cipher.encrypt(title)?);
        }
        if let Some(description) = &patch.description {
            set.insert("description", self.cipher.encrypt(description)?);
        }
        if let Some(items) = &patch.checklist {
            set.insert("checklist", checklist_to_bson(&self.cipher, items)?);
        }
        if let Some(due_date) = &patch.due_date {
            set.insert("due_date", BsonDateTime::from_chrono(*due_date));
        }
        if let Some(status) = &patch.status {
            set.insert("status", status);
        }

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let updated = self
            .collection
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": set }, options)
            .await
            .map_err(|e| RepositoryError::new(STORE, "update", e))?;
        match updated {
            Some(document) => doc_to_task(&self.cipher, &document),
            None => Err(AppError::TaskNotFound),
        }
    }

    async fn delete(&self, id: &str, user_id: &str) -> Result<(), AppError> {
        self.collection
            .delete_one(doc! { "_id": id, "user_id": user_id }, None)
            .await
            .map_err(|e| RepositoryError::new(STORE, "delete", e))?;
        Ok(())
    }

    async fn archive(&self, id: &str, user_id: &str) -> Result<(), AppError> {
        let now = BsonDateTime::from_chrono(Utc::now());
        self.collection
            .update_one(
                doc! { "_id": id, "user_id": user_id },
                doc! { "$set": { "archived_at": now, "modified_at": now } },
                None,
            )
            .await
            .map_err(|e| RepositoryError::new(STORE, "archive", e))?;
        Ok(())
    }

    async fn unarchive(&self, id: &str, user_id: &str) -> Result<(), AppError> {
        self.collection
            .update_one(
                doc! { "_id": id, "user_id": user_id },
                doc! { "$set": {
                    "archived_at": Bson::Null,
                    "modified_at": BsonDateTime::from_chrono(Utc::now()),
                } },
                None,
            )
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
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let updated = self
            .collection
            .find_one_and_update(
                doc! { "_id": id, "user_id": user_id },
                doc! { "$set": {
                    "status": status,
                    "modified_at": BsonDateTime::from_chrono(Utc::now()),
                } },
                options,
            )
            .await
            .map_err(|e| RepositoryError::new(STORE, "update_status", e))?;
        updated
            .map(|doc| doc_to_task(&self.cipher, &doc))
            .transpose()
    }

    async fn bulk_create(&self, tasks: Vec<Task>) -> Result<Vec<Task>, AppError> {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        // Each record is encoded independently; one bad record is dropped
        // with a warning instead of blocking its siblings.
        let mut encodable = Vec::with_capacity(tasks.len());
        let mut documents = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task_to_doc(&self.cipher, &task) {
                Ok(document) => {
                    documents.push(document);
                    encodable.push(task);
                }
                Err(err) => {
                    tracing::warn!(task_id = %task.id, error = %err, "bulk insert dropped a task");
                }
            }
        }
        if documents.is_empty() {
            return Err(AppError::BulkCreateFailed(anyhow::anyhow!(
                "no tasks could be encoded for insertion"
            )));
        }

        let options = InsertManyOptions::builder().ordered(false).build();
        match self.collection.insert_many(&documents, options).await {
            Ok(_) => Ok(encodable),
            Err(err) => {
                if let ErrorKind::BulkWrite(failure) = &*err.kind {
                    let failed: HashSet<usize> = failure
                        .write_errors
                        .as_ref()
                        .map(|errors| errors.iter().map(|e| e.index).collect())
                        .unwrap_or_default();
                    tracing::warn!(
                        dropped = failed.len(),
                        "unordered bulk insert dropped failing tasks"
                    );
                    return Ok(encodable
                        .into_iter()
                        .enumerate()
                        .filter(|(index, _)| !failed.contains(index))
                        .map(|(_, task)| task)
                        .collect());
                }
                Err(AppError::BulkCreateFailed(err.into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use crate::models::task::CreateTask;

    fn cipher() -> FieldCipher {
        FieldCipher::new(&STANDARD.encode([5u8; 32])).unwrap()
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
                    completed: false,
                }]),
                due_date: None,
                status: None,
            },
        )
    }

    #[test]
    fn task_doc_round_trip_decrypts_fields() {
        let cipher = cipher();
        let task = sample_task();
        let document = task_to_doc(&cipher, &task).unwrap();

        // at rest everything sensitive is ciphertext
        assert_ne!(document.get_str("title").unwrap(), "Buy milk");
        let stored_item = document.get_array("checklist").unwrap()[0]
            .as_document()
            .unwrap();
        assert_ne!(stored_item.get_str("text").unwrap(), "semi-skimmed");

        let restored = doc_to_task(&cipher, &document).unwrap();
        assert_eq!(restored.title, "Buy milk");
        assert_eq!(restored.description.as_deref(), Some("2 liters"));
        assert_eq!(restored.checklist.unwrap()[0].text, "semi-skimmed");
        assert!(restored.deleted_at.is_none());
    }

    #[test]
    fn absent_optionals_survive_the_codec() {
        let cipher = cipher();
        let task = Task::new(
            "u1".into(),
            CreateTask {
                title: "Plain".into(),
                description: None,
                checklist: None,
                due_date: None,
                status: Some("active".into()),
            },
        );
        let restored = doc_to_task(&cipher, &task_to_doc(&cipher, &task).unwrap()).unwrap();
        assert!(restored.description.is_none());
        assert!(restored.checklist.is_none());
        assert_eq!(restored.status, "active");
    }

    #[test]
    fn list_filter_defaults_to_unarchived() {
        let query = list_filter("u1", &TaskFilter::default());
        assert_eq!(query.get_str("user_id").unwrap(), "u1");
        assert_eq!(query.get("archived_at"), Some(&Bson::Null));

        let archived = list_filter(
            "u1",
            &TaskFilter {
                archived: Some(true),
                ..Default::default()
            },
        );
        assert!(archived.get_document("archived_at").is_ok());
    }
}

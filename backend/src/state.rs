use std::sync::Arc;

use crate::config::{Config, StoreBackend};
use crate::db;
use crate::repositories::{
    DynamoTaskRepository, DynamoUserRepository, MongoTaskRepository, MongoUserRepository,
    PostgresTaskRepository, PostgresUserRepository, TaskRepository, UserRepository,
};
use crate::services::{AuthService, TaskService};
use crate::utils::email::Mailer;
use crate::utils::encryption::FieldCipher;

/// Long-lived process state: the configuration plus the repository pair for
/// the store selected at startup.
///
/// This is the one place that knows which physical backend is active;
/// everything downstream works against the repository contracts.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub users: Arc<dyn UserRepository>,
    pub tasks: Arc<dyn TaskRepository>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let cipher = Arc::new(FieldCipher::new(&config.encryption_key)?);

        let (users, tasks): (Arc<dyn UserRepository>, Arc<dyn TaskRepository>) = match config.store
        {
            StoreBackend::Postgres => {
                let pool = db::postgres::create_pool(&config.database_url).await?;
                (
                    Arc::new(PostgresUserRepository::new(pool.clone())),
                    Arc::new(PostgresTaskRepository::new(pool, cipher)),
                )
            }
            StoreBackend::Mongodb => {
                let database = db::mongo::connect(&config).await?;
                (
                    Arc::new(MongoUserRepository::new(&database)),
                    Arc::new(MongoTaskRepository::new(&database, cipher)),
                )
            }
            StoreBackend::Dynamodb => {
                let client = db::dynamo::connect().await;
                (
                    Arc::new(DynamoUserRepository::new(
                        client.clone(),
                        config.dynamodb_users_table.clone(),
                    )),
                    Arc::new(DynamoTaskRepository::new(
                        client,
                        config.dynamodb_tasks_table.clone(),
                        cipher,
                    )),
                )
            }
        };

        tracing::info!(store = ?config.store, "storage backend initialized");
        Ok(Self {
            config,
            users,
            tasks,
        })
    }

    pub fn task_service(&self) -> TaskService {
        TaskService::new(self.tasks.clone())
    }

    pub fn auth_service(&self, mailer: Arc<dyn Mailer>) -> AuthService {
        AuthService::new(self.users.clone(), mailer, &self.config)
    }
}

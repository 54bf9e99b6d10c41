use anyhow::{anyhow, bail};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Physical store selected at process start.
///
/// All three backends implement the same repository contracts; the rest of
/// the process never learns which one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Mongodb,
    Dynamodb,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "mongodb" | "mongo" => Ok(StoreBackend::Mongodb),
            "dynamodb" | "dynamo" => Ok(StoreBackend::Dynamodb),
            other => Err(anyhow!("Unknown TASKVAULT_STORE value: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreBackend,
    pub database_url: String,
    pub mongodb_uri: String,
    pub mongodb_database: String,
    pub dynamodb_users_table: String,
    pub dynamodb_tasks_table: String,
    /// Base64-encoded 256-bit key for field-level encryption. Required.
    pub encryption_key: String,
    /// Shared secret for signing session tokens. Required.
    pub jwt_secret: String,
    pub token_ttl_hours: u64,
    pub frontend_base_url: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub smtp_from_address: String,
}

impl Config {
    /// Loads configuration from the environment (and `.env` when present).
    ///
    /// Secrets are required here rather than on first use: a missing or
    /// empty `ENCRYPTION_KEY` or `JWT_SECRET` fails the process at startup.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let store: StoreBackend = env::var("TASKVAULT_STORE")
            .unwrap_or_else(|_| "postgres".to_string())
            .parse()?;

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/taskvault".to_string());

        let mongodb_uri =
            env::var("MONGODB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
        let mongodb_database =
            env::var("MONGODB_DATABASE").unwrap_or_else(|_| "taskvault".to_string());

        let dynamodb_users_table =
            env::var("DYNAMODB_USERS_TABLE").unwrap_or_else(|_| "users".to_string());
        let dynamodb_tasks_table =
            env::var("DYNAMODB_TASKS_TABLE").unwrap_or_else(|_| "tasks".to_string());

        let encryption_key = env::var("ENCRYPTION_KEY").unwrap_or_default();
        if encryption_key.is_empty() {
            bail!("ENCRYPTION_KEY is required (base64-encoded 256-bit key)");
        }

        let jwt_secret = env::var("JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() {
            bail!("JWT_SECRET is required");
        }

        let token_ttl_hours = env::var("TOKEN_TTL_HOURS")
            .unwrap_or_else(|_| "24".to_string())
            .parse()
            .unwrap_or(24);

        let frontend_base_url =
            env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());

        let smtp_host = env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string());
        let smtp_port = env::var("SMTP_PORT")
            .unwrap_or_else(|_| "587".to_string())
            .parse::<u16>()
            .unwrap_or(587);
        let smtp_username = env::var("SMTP_USERNAME").unwrap_or_default();
        let smtp_password = env::var("SMTP_PASSWORD").unwrap_or_default();
        let smtp_from_address = env::var("SMTP_FROM_ADDRESS")
            .unwrap_or_else(|_| "noreply@taskvault.local".to_string());

        Ok(Config {
            store,
            database_url,
            mongodb_uri,
            mongodb_database,
            dynamodb_users_table,
            dynamodb_tasks_table,
            encryption_key,
            jwt_secret,
            token_ttl_hours,
            frontend_base_url,
            smtp_host,
            smtp_port,
            smtp_username,
            smtp_password,
            smtp_from_address,
        })
    }
}

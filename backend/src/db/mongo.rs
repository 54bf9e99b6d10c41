use mongodb::{Client, Database};

use crate::config::Config;

pub async fn connect(config: &Config) -> anyhow::Result<Database> {
    let client = Client::with_uri_str(&config.mongodb_uri).await?;
    Ok(client.database(&config.mongodb_database))
}

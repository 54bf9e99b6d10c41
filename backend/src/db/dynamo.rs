use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client;

/// Builds a DynamoDB client from the ambient AWS environment (region,
/// credentials, endpoint override for local stacks).
pub async fn connect() -> Client {
    let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    Client::new(&config)
}

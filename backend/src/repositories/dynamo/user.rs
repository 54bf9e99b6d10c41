use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use chrono::{DateTime, Utc};

use crate::error::{AppError, RepositoryError};
use crate::models::user::{NewUser, PasswordReset, User, UserPatch};
use crate::repositories::user_repository::UserRepository;

use super::{EMAIL_INDEX, RESET_TOKEN_INDEX, STORE, USERNAME_INDEX};

pub(super) type Item = HashMap<String, AttributeValue>;

pub(super) fn attr_s(item: &Item, key: &str) -> Result<String, AppError> {
    item.get(key)
        .and_then(|value| value.as_s().ok())
        .cloned()
        .ok_or_else(|| {
            RepositoryError::new(
                STORE,
                "read_item",
                anyhow::anyhow!("missing string attribute {}", key),
            )
            .into()
        })
}

pub(super) fn attr_opt_s(item: &Item, key: &str) -> Option<String> {
    item.get(key).and_then(|value| value.as_s().ok()).cloned()
}

pub(super) fn attr_datetime(item: &Item, key: &str) -> Result<DateTime<Utc>, AppError> {
    parse_datetime(&attr_s(item, key)?)
}

pub(super) fn attr_opt_datetime(item: &Item, key: &str) -> Result<Option<DateTime<Utc>>, AppError> {
    attr_opt_s(item, key).map(|s| parse_datetime(&s)).transpose()
}

pub(super) fn parse_datetime(value: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::new(STORE, "parse_datetime", e).into())
}

pub(super) fn format_datetime(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn user_to_item(user: &User) -> Item {
    let mut item = Item::new();
    item.insert("id".into(), AttributeValue::S(user.id.clone()));
    item.insert("username".into(), AttributeValue::S(user.username.clone()));
    item.insert("email".into(), AttributeValue::S(user.email.clone()));
    item.insert(
        "password_hash".into(),
        AttributeValue::S(user.password_hash.clone()),
    );
    item.insert(
        "created_at".into(),
        AttributeValue::S(format_datetime(user.created_at)),
    );
    item.insert(
        "updated_at".into(),
        AttributeValue::S(format_datetime(user.updated_at)),
    );
    if let Some(reset) = &user.password_reset {
        item.insert(
            "password_reset_token".into(),
            AttributeValue::S(reset.token_hash.clone()),
        );
        item.insert(
            "password_reset_expires".into(),
            AttributeValue::S(format_datetime(reset.expires_at)),
        );
    }
    item
}

fn item_to_user(item: &Item) -> Result<User, AppError> {
    let password_reset = match (
        attr_opt_s(item, "password_reset_token"),
        attr_opt_datetime(item, "password_reset_expires")?,
    ) {
        (Some(token_hash), Some(expires_at)) => Some(PasswordReset {
            token_hash,
            expires_at,
        }),
        _ => None,
    };

    Ok(User {
        id: attr_s(item, "id")?,
        username: attr_s(item, "username")?,
        email: attr_s(item, "email")?,
        password_hash: attr_s(item, "password_hash")?,
        password_reset,
        created_at: attr_datetime(item, "created_at")?,
        updated_at: attr_datetime(item, "updated_at")?,
    })
}

pub struct DynamoUserRepository {
    client: Client,
    table: String,
}

impl DynamoUserRepository {
    pub fn new(client: Client, table: String) -> Self {
        Self { client, table }
    }

    async fn query_index(
        &self,
        operation: &'static str,
        index: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<Item>, AppError> {
        let output = self
            .client
            .query()
            .table_name(&self.table)
            .index_name(index)
            .key_condition_expression("#k = :v")
            .expression_attribute_names("#k", key)
            .expression_attribute_values(":v", AttributeValue::S(value.to_string()))
            .send()
            .await
            .map_err(|e| RepositoryError::new(STORE, operation, e))?;
        Ok(output.items.unwrap_or_default())
    }

    async fn find_one_by_index(
        &self,
        operation: &'static str,
        index: &str,
        key: &str,
        value: &str,
    ) -> Result<Option<User>, AppError> {
        let items = self.query_index(operation, index, key, value).await?;
        items.first().map(item_to_user).transpose()
    }
}

#[async_trait]
impl UserRepository for DynamoUserRepository {
    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<User>, AppError> {
        // Username precedence: signup reports a username conflict first
        // when both fields collide.
        if let Some(user) = self
            .find_one_by_index(
                "find_by_username_or_email",
                USERNAME_INDEX,
                "username",
                username,
            )
            .await?
        {
            return Ok(Some(user));
        }
        self.find_one_by_index("find_by_username_or_email", EMAIL_INDEX, "email", email)
            .await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        self.find_one_by_index("find_by_username", USERNAME_INDEX, "username", username)
            .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.find_one_by_index("find_by_email", EMAIL_INDEX, "email", email)
            .await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .key("id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| RepositoryError::new(STORE, "find_by_id", e))?;
        output.item.as_ref().map(item_to_user).transpose()
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError> {
        // The index matches on the hash alone; the strict expiry check
        // happens here so an expired token is a plain non-match.
        let items = self
            .query_index(
                "find_by_reset_token",
                RESET_TOKEN_INDEX,
                "password_reset_token",
                token_hash,
            )
            .await?;
        for item in &items {
            let user = item_to_user(item)?;
            if let Some(reset) = &user.password_reset {
                if reset.expires_at > now {
                    return Ok(Some(user));
                }
            }
        }
        Ok(None)
    }

    async fn create(&self, user: NewUser) -> Result<User, AppError> {
        let user = User::new(user.username, user.email, user.password_hash);
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(user_to_item(&user)))
            .send()
            .await
            .map_err(|e| RepositoryError::new(STORE, "create", e))?;
        Ok(user)
    }

    async fn update(&self, id: &str, patch: UserPatch) -> Result<Option<User>, AppError> {
        let mut sets = vec!["#updated_at = :updated_at".to_string()];
        let mut removes: Vec<String> = Vec::new();

        let mut request = self
            .client
            .update_item()
            .table_name(&self.table)
            .key("id", AttributeValue::S(id.to_string()))
            .condition_expression("attribute_exists(#id)")
            .expression_attribute_names("#id", "id")
            .expression_attribute_names("#updated_at", "updated_at")
            .expression_attribute_values(
                ":updated_at",
                AttributeValue::S(format_datetime(Utc::now())),
            )
            .return_values(aws_sdk_dynamodb::types::ReturnValue::AllNew);

        if let Some(password_hash) = &patch.password_hash {
            sets.push("#password_hash = :password_hash".into());
            request = request
                .expression_attribute_names("#password_hash", "password_hash")
                .expression_attribute_values(
                    ":password_hash",
                    AttributeValue::S(password_hash.clone()),
                );
        }
        if let Some(reset) = &patch.password_reset {
            request = request
                .expression_attribute_names("#reset_token", "password_reset_token")
                .expression_attribute_names("#reset_expires", "password_reset_expires");
            match reset {
                Some(reset) => {
                    sets.push("#reset_token = :reset_token".into());
                    sets.push("#reset_expires = :reset_expires".into());
                    request = request
                        .expression_attribute_values(
                            ":reset_token",
                            AttributeValue::S(reset.token_hash.clone()),
                        )
                        .expression_attribute_values(
                            ":reset_expires",
                            AttributeValue::S(format_datetime(reset.expires_at)),
                        );
                }
                None => {
                    removes.push("#reset_token".into());
                    removes.push("#reset_expires".into());
                }
            }
        }

        let mut expression = format!("SET {}", sets.join(", "));
        if !removes.is_empty() {
            expression.push_str(&format!(" REMOVE {}", removes.join(", ")));
        }

        match request.update_expression(expression).send().await {
            Ok(output) => output.attributes.as_ref().map(item_to_user).transpose(),
            Err(err) => {
                let service_error = err.into_service_error();
                if service_error.is_conditional_check_failed_exception() {
                    return Ok(None);
                }
                Err(RepositoryError::new(STORE, "update", service_error).into())
            }
        }
    }
}

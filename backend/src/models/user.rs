//! Models that represent user accounts and the password reset lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::validation::rules;

/// Persistent representation of a user account.
///
/// `password_hash` only ever holds a one-way hash; `password_reset` is
/// present exactly while a reset is pending (token hash and expiry travel
/// together, they are never set independently).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier for the user.
    pub id: String,
    /// Globally unique username used for login.
    pub username: String,
    /// Globally unique email address.
    pub email: String,
    /// Bcrypt hash of the user's password.
    pub password_hash: String,
    /// Pending password reset state, if any.
    pub password_reset: Option<PasswordReset>,
    /// Creation timestamp for auditing.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp for auditing.
    pub updated_at: DateTime<Utc>,
}

/// Hashed reset token plus its absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordReset {
    /// SHA-256 hex digest of the caller-facing token.
    pub token_hash: String,
    /// Instant after which the token no longer matches.
    pub expires_at: DateTime<Utc>,
}

/// Payload for creating a new user account. The password arrives pre-hashed;
/// hashing plaintext is the auth service's job.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Partial update for a user record.
///
/// `None` fields are left unchanged. For `password_reset` the outer option
/// is the "touch this field at all" switch: `Some(None)` clears a pending
/// reset, `Some(Some(_))` installs one.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub password_hash: Option<String>,
    pub password_reset: Option<Option<PasswordReset>>,
}

/// Credentials submitted on signup.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(custom(function = "rules::validate_username"))]
    pub username: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(custom(function = "rules::validate_password_strength"))]
    pub password: String,
}

/// Public-facing projection of a user. Password and reset fields are
/// excluded by construction, not by serialization attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id,
            username: user.username,
            email: user.email,
        }
    }
}

/// Session token plus the public projection, returned by signup and login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

impl User {
    /// Constructs a new user with a freshly generated identifier and no
    /// pending reset.
    pub fn new(username: String, email: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            username,
            email,
            password_hash,
            password_reset: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` while a password reset is pending.
    pub fn has_pending_reset(&self) -> bool {
        self.password_reset.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_response_excludes_credentials() {
        let user = User::new(
            "alice".to_string(),
            "alice@example.com".to_string(),
            "$2b$10$hash".to_string(),
        );
        let json = serde_json::to_value(UserResponse::from(user)).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("password_reset").is_none());
        assert_eq!(json["username"], "alice");
    }

    #[test]
    fn new_user_starts_without_pending_reset() {
        let user = User::new("bob".into(), "bob@example.com".into(), "hash".into());
        assert!(!user.has_pending_reset());
        assert_eq!(user.created_at, user.updated_at);
    }

    #[test]
    fn signup_request_validation() {
        let ok = SignupRequest {
            username: "valid_user".into(),
            email: "valid@example.com".into(),
            password: "longenough1".into(),
        };
        assert!(ok.validate().is_ok());

        let bad_email = SignupRequest {
            username: "valid_user".into(),
            email: "not-an-email".into(),
            password: "longenough1".into(),
        };
        assert!(bad_email.validate().is_err());

        let short_password = SignupRequest {
            username: "valid_user".into(),
            email: "valid@example.com".into(),
            password: "short".into(),
        };
        assert!(short_password.validate().is_err());
    }
}

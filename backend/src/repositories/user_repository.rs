//! User repository contract.
//!
//! The abstract operation set every user store backend implements. Lookups
//! return `None` for "no match"; only genuine faults produce errors, wrapped
//! into [`RepositoryError`](crate::error::RepositoryError) by the backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::user::{NewUser, User, UserPatch};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Finds a user matching either the username or the email. Used by
    /// signup to detect both collision kinds with one round trip. When the
    /// two fields collide on different records, the username match is
    /// returned.
    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<User>, AppError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError>;

    /// Finds the user holding `token_hash` whose reset expiry is strictly
    /// after `now`. An expired token is a non-match, not an error.
    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError>;

    async fn create(&self, user: NewUser) -> Result<User, AppError>;

    /// Applies a partial update. Returns the updated record, or `None` when
    /// no user has this id.
    async fn update(&self, id: &str, patch: UserPatch) -> Result<Option<User>, AppError>;
}

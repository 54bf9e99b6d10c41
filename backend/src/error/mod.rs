use thiserror::Error;

/// Uniform wrapper for faults raised by a concrete store backend.
///
/// Backends catch their native driver errors and rewrap them here so callers
/// never branch on store-specific error shapes. The original cause is logged
/// with full context at the wrap site and kept as the error source.
#[derive(Debug, Error)]
#[error("{store} repository failure in {operation}")]
pub struct RepositoryError {
    pub store: &'static str,
    pub operation: &'static str,
    #[source]
    pub source: anyhow::Error,
}

impl RepositoryError {
    pub fn new(
        store: &'static str,
        operation: &'static str,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        let source = source.into();
        tracing::error!(store, operation, error = ?source, "repository failure");
        Self {
            store,
            operation,
            source,
        }
    }
}

/// All errors surfaced by the core.
///
/// The unit variants are expected domain conflicts: control flow for the
/// caller, surfaced verbatim and never logged as failures. The wrapping
/// variants carry an unexpected underlying cause that has already been
/// logged; their display text deliberately leaks no internal detail.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("username is already taken")]
    UsernameTaken,
    #[error("email is already registered")]
    EmailTaken,
    #[error("user not found")]
    UserNotFound,
    #[error("incorrect password")]
    IncorrectPassword,
    #[error("invalid or expired password reset token")]
    InvalidOrExpiredToken,
    #[error("task not found")]
    TaskNotFound,

    #[error("encryption key must be a base64-encoded 256-bit value")]
    InvalidEncryptionKey,
    #[error("initialization vector must be 16 bytes")]
    InvalidIvLength,
    #[error("malformed encrypted field: {0}")]
    MalformedCiphertext(&'static str),
    #[error("field decryption failed")]
    DecryptionFailed,

    #[error("registration failed")]
    RegistrationFailed(#[source] anyhow::Error),
    #[error("login failed")]
    LoginFailed(#[source] anyhow::Error),
    #[error("password reset failed")]
    PasswordResetFailed(#[source] anyhow::Error),
    #[error("bulk task creation failed")]
    BulkCreateFailed(#[source] anyhow::Error),
    #[error("notification dispatch failed")]
    Notification(#[source] anyhow::Error),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Validation(#[from] validator::ValidationErrors),
}

impl AppError {
    /// Returns `true` for expected domain conflicts that services must pass
    /// through to the caller unchanged.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            AppError::UsernameTaken
                | AppError::EmailTaken
                | AppError::UserNotFound
                | AppError::IncorrectPassword
                | AppError::InvalidOrExpiredToken
                | AppError::TaskNotFound
                | AppError::InvalidIvLength
                | AppError::Validation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_error_keeps_store_and_operation_context() {
        let err = RepositoryError::new("postgres", "update_task", anyhow::anyhow!("boom"));
        assert_eq!(err.store, "postgres");
        assert_eq!(err.operation, "update_task");
        assert!(err.to_string().contains("postgres"));
        assert!(err.to_string().contains("update_task"));
    }

    #[test]
    fn domain_conflicts_are_classified_as_expected() {
        assert!(AppError::UsernameTaken.is_domain());
        assert!(AppError::TaskNotFound.is_domain());
        assert!(AppError::InvalidIvLength.is_domain());
        assert!(!AppError::RegistrationFailed(anyhow::anyhow!("x")).is_domain());
        let repo = RepositoryError::new("mongodb", "find_by_id", anyhow::anyhow!("net"));
        assert!(!AppError::Repository(repo).is_domain());
    }

    #[test]
    fn wrapped_errors_do_not_leak_the_cause_in_display() {
        let err = AppError::LoginFailed(anyhow::anyhow!("connection refused to 10.0.0.5"));
        assert_eq!(err.to_string(), "login failed");
    }
}

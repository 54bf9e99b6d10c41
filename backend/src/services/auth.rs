//! Account lifecycle: signup, login, password recovery and reset.
//!
//! Expected domain conflicts (taken username, wrong password, dead reset
//! token) pass through to the caller untouched. Anything unexpected is
//! logged where it happened and collapsed into a generic failure so internal
//! detail never leaks out of the service.

use std::sync::Arc;

use chrono::Utc;
use validator::Validate;

use crate::config::Config;
use crate::error::AppError;
use crate::models::user::{
    AuthResponse, NewUser, PasswordReset, SignupRequest, UserPatch,
};
use crate::repositories::user_repository::UserRepository;
use crate::utils::email::Mailer;
use crate::utils::jwt::create_session_token;
use crate::utils::password::{hash_password, verify_password};
use crate::utils::security::{
    generate_reset_token, hash_reset_token, reset_token_expiry, reset_url,
};

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    mailer: Arc<dyn Mailer>,
    jwt_secret: String,
    token_ttl_hours: u64,
    frontend_base_url: String,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, mailer: Arc<dyn Mailer>, config: &Config) -> Self {
        Self {
            users,
            mailer,
            jwt_secret: config.jwt_secret.clone(),
            token_ttl_hours: config.token_ttl_hours,
            frontend_base_url: config.frontend_base_url.clone(),
        }
    }

    /// Registers a new account and signs the user in.
    ///
    /// A single combined lookup detects both collision kinds up front;
    /// username conflicts win the tie-break when both fields collide.
    pub async fn signup(&self, request: SignupRequest) -> Result<AuthResponse, AppError> {
        request.validate()?;

        let existing = self
            .users
            .find_by_username_or_email(&request.username, &request.email)
            .await
            .map_err(registration_failure)?;
        if let Some(existing) = existing {
            if existing.username == request.username {
                return Err(AppError::UsernameTaken);
            }
            return Err(AppError::EmailTaken);
        }

        let password_hash = hash_password(&request.password).map_err(|e| {
            tracing::error!(error = %e, "password hashing failed during signup");
            AppError::RegistrationFailed(e)
        })?;

        let user = self
            .users
            .create(NewUser {
                username: request.username,
                email: request.email,
                password_hash,
            })
            .await
            .map_err(registration_failure)?;

        let token = create_session_token(user.id.clone(), &self.jwt_secret, self.token_ttl_hours)
            .map_err(|e| {
                tracing::error!(error = %e, "session token issuance failed during signup");
                AppError::RegistrationFailed(e)
            })?;

        // The account exists at this point; a failed welcome email is not
        // worth failing the registration over.
        if let Err(err) = self
            .mailer
            .send_welcome_email(&user.email, &user.username)
            .await
        {
            tracing::warn!(error = %err, "welcome email could not be delivered");
        }

        Ok(AuthResponse {
            token,
            user: user.into(),
        })
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<AuthResponse, AppError> {
        let user = self
            .users
            .find_by_username(username)
            .await
            .map_err(login_failure)?
            .ok_or(AppError::UserNotFound)?;

        let password_matches = verify_password(password, &user.password_hash).map_err(|e| {
            tracing::error!(error = %e, "password verification failed during login");
            AppError::LoginFailed(e)
        })?;
        if !password_matches {
            return Err(AppError::IncorrectPassword);
        }

        let token = create_session_token(user.id.clone(), &self.jwt_secret, self.token_ttl_hours)
            .map_err(|e| {
                tracing::error!(error = %e, "session token issuance failed during login");
                AppError::LoginFailed(e)
            })?;

        Ok(AuthResponse {
            token,
            user: user.into(),
        })
    }

    /// Starts a password reset.
    ///
    /// Resolves without any side effect when the email is unregistered, so
    /// the operation cannot be used to probe for accounts. Persistence and
    /// notification failures are logged and re-thrown.
    pub async fn recover_password(&self, email: &str) -> Result<(), AppError> {
        let user = match self.users.find_by_email(email).await? {
            Some(user) => user,
            None => {
                tracing::debug!("password recovery requested for an unknown email");
                return Ok(());
            }
        };

        let token = generate_reset_token();
        let reset = PasswordReset {
            token_hash: hash_reset_token(&token),
            expires_at: reset_token_expiry(Utc::now()),
        };
        let updated = self
            .users
            .update(
                &user.id,
                UserPatch {
                    password_hash: None,
                    password_reset: Some(Some(reset)),
                },
            )
            .await?;
        if updated.is_none() {
            // The account disappeared between lookup and update; keep the
            // same non-disclosing silence as for an unknown email.
            tracing::debug!("password recovery target vanished before update");
            return Ok(());
        }

        let url = reset_url(&self.frontend_base_url, &token);
        self.mailer
            .send_password_reset_email(email, &url)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "password reset email could not be dispatched");
                AppError::Notification(e)
            })?;

        Ok(())
    }

    /// Completes a password reset.
    ///
    /// The new hash is written and both reset fields are cleared in one
    /// repository update.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AppError> {
        let user = self
            .users
            .find_by_reset_token(&hash_reset_token(token), Utc::now())
            .await?
            .ok_or(AppError::InvalidOrExpiredToken)?;

        let password_hash = hash_password(new_password).map_err(|e| {
            tracing::error!(error = %e, "password hashing failed during reset");
            AppError::PasswordResetFailed(e)
        })?;

        self.users
            .update(
                &user.id,
                UserPatch {
                    password_hash: Some(password_hash),
                    password_reset: Some(None),
                },
            )
            .await?
            .ok_or(AppError::InvalidOrExpiredToken)?;

        Ok(())
    }
}

/// Collapses unexpected persistence failures; domain conflicts pass through.
fn registration_failure(err: AppError) -> AppError {
    if err.is_domain() {
        return err;
    }
    AppError::RegistrationFailed(err.into())
}

fn login_failure(err: AppError) -> AppError {
    if err.is_domain() {
        return err;
    }
    AppError::LoginFailed(err.into())
}

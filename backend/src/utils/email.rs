use anyhow::Result;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::Config;

/// Outbound notification contract consumed by the auth service.
///
/// Delivery failures are surfaced to the caller; retry policy belongs to
/// whoever operates the transport.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_password_reset_email(&self, to: &str, reset_url: &str) -> Result<()>;

    async fn send_welcome_email(&self, to: &str, username: &str) -> Result<()>;
}

/// SMTP-backed [`Mailer`].
pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailer {
    pub fn new(config: &Config) -> Result<Self> {
        let mailer = if config.smtp_username.is_empty() {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
                .port(config.smtp_port)
                .build()
        } else {
            let creds = Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            );
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
                .port(config.smtp_port)
                .credentials(creds)
                .build()
        };

        Ok(Self {
            mailer,
            from_address: config.smtp_from_address.clone(),
        })
    }

    async fn send_plain(&self, to: &str, subject: &str, body: String) -> Result<()> {
        let email = Message::builder()
            .from(self.from_address.parse()?)
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)?;

        self.mailer.send(email).await?;
        Ok(())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_password_reset_email(&self, to: &str, reset_url: &str) -> Result<()> {
        let body = format!(
            r#"
We received a request to reset your password.

Click the link below to choose a new one:

{}

The link is valid for one hour.

If you did not request this, you can safely ignore this email.

---
TaskVault
"#,
            reset_url
        );

        self.send_plain(to, "Password reset request - TaskVault", body)
            .await
    }

    async fn send_welcome_email(&self, to: &str, username: &str) -> Result<()> {
        let body = format!(
            r#"
Welcome aboard, {}!

Your account is ready. Sign in to start organizing your tasks.

---
TaskVault
"#,
            username
        );

        self.send_plain(to, "Welcome to TaskVault", body).await
    }
}

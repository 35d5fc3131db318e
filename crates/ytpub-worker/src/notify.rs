//! Upload notifications by email.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::info;

use crate::retry::{retry_async, RetryConfig};
use crate::settings::EmailConfig;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Invalid message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Notifier not configured: {0}")]
    NotConfigured(&'static str),
}

/// What a notification says about a finished upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadNotice {
    pub youtube_id: String,
    pub title: String,
    pub privacy_status: String,
    pub publish_at: Option<String>,
}

impl UploadNotice {
    pub fn url(&self) -> String {
        format!("https://youtu.be/{}", self.youtube_id)
    }

    fn subject(&self) -> String {
        format!("Vidéo mise en ligne: {}", self.title)
    }

    fn body(&self) -> String {
        let mut body = format!(
            "Titre: {}\nLien: {}\nVisibilité: {}\n",
            self.title,
            self.url(),
            self.privacy_status
        );
        if let Some(at) = &self.publish_at {
            body.push_str(&format!("Publication programmée: {}\n", at));
        }
        body
    }
}

/// Notification collaborator. Failures are reported, never fatal to a task.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_upload(&self, notice: &UploadNotice) -> Result<(), NotifyError>;
}

/// SMTP notifier; the password comes from `SMTP_PASSWORD`.
#[derive(Debug, Clone)]
pub struct EmailNotifier {
    config: EmailConfig,
    password: Option<String>,
    retry: RetryConfig,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig, password: Option<String>) -> Self {
        Self {
            config,
            password,
            retry: RetryConfig::new("smtp_send"),
        }
    }

    /// Notifier for an enabled email block, `None` otherwise.
    pub fn from_config(config: &EmailConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let password = std::env::var("SMTP_PASSWORD").ok().filter(|p| !p.is_empty());
        Some(Self::new(config.clone(), password))
    }

    fn build_message(&self, notice: &UploadNotice) -> Result<Message, NotifyError> {
        let from = self.config.from.as_deref().ok_or(NotifyError::NotConfigured("from"))?;
        let to = self.config.to.as_deref().ok_or(NotifyError::NotConfigured("to"))?;
        Ok(Message::builder()
            .from(from.parse()?)
            .to(to.parse()?)
            .subject(notice.subject())
            .header(ContentType::TEXT_PLAIN)
            .body(notice.body())?)
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, NotifyError> {
        let mut builder = if self.config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.config.smtp_host)
        };
        builder = builder.port(self.config.smtp_port);
        if let (Some(user), Some(password)) = (&self.config.username, &self.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }
        Ok(builder.build())
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify_upload(&self, notice: &UploadNotice) -> Result<(), NotifyError> {
        let message = self.build_message(notice)?;
        let mailer = &self.transport()?;
        let message = &message;
        retry_async(&self.retry, || async move { mailer.send(message.clone()).await })
            .await
            .map_err(|(e, _)| NotifyError::Smtp(e))?;
        info!(youtube_id = %notice.youtube_id, "Upload notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice() -> UploadNotice {
        UploadNotice {
            youtube_id: "abc123".into(),
            title: "Ma vidéo".into(),
            privacy_status: "private".into(),
            publish_at: Some("2024-07-01T16:00:00Z".into()),
        }
    }

    #[test]
    fn test_notice_text() {
        let n = notice();
        assert_eq!(n.url(), "https://youtu.be/abc123");
        assert!(n.subject().contains("Ma vidéo"));
        assert!(n.body().contains("2024-07-01T16:00:00Z"));
    }

    #[test]
    fn test_disabled_config_has_no_notifier() {
        assert!(EmailNotifier::from_config(&EmailConfig::default()).is_none());
    }

    #[test]
    fn test_message_requires_addresses() {
        let notifier = EmailNotifier::new(EmailConfig::default(), None);
        assert!(matches!(
            notifier.build_message(&notice()),
            Err(NotifyError::NotConfigured("from"))
        ));

        let config = EmailConfig {
            from: Some("bot@example.com".into()),
            to: Some("me@example.com".into()),
            ..Default::default()
        };
        assert!(EmailNotifier::new(config, None).build_message(&notice()).is_ok());
    }
}

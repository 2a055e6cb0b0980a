//! Outgoing email.

use std::sync::Arc;

use async_trait::async_trait;
use campusdesk_common::{AppError, AppResult, config::EmailConfig};
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};

/// Sends one plain-text email.
///
/// Never errors: failures are logged by the implementation and reported as
/// `false`.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> bool;
}

/// Type alias for a shared email transport.
pub type EmailTransportService = Arc<dyn EmailTransport>;

/// Transport used when email is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEmailTransport;

#[async_trait]
impl EmailTransport for NoOpEmailTransport {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> bool {
        tracing::debug!(to = %to, subject = %subject, "Email disabled, not sending");
        false
    }
}

/// SMTP delivery through lettre, STARTTLS on the configured relay.
#[derive(Clone)]
pub struct SmtpEmailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailTransport {
    /// Build a transport from configuration.
    pub fn new(config: &EmailConfig) -> AppResult<Self> {
        let address = config
            .from_address
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid email.from_address: {e}")))?;
        let from = Mailbox::new(Some(config.from_name.clone()), address);

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| AppError::Config(format!("Invalid email.smtp_host: {e}")))?
            .port(config.smtp_port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, to: &str, subject: &str, body: &str) -> AppResult<Message> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| AppError::BadRequest(format!("Invalid recipient address: {e}")))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| AppError::Internal(format!("Failed to build email: {e}")))
    }
}

#[async_trait]
impl EmailTransport for SmtpEmailTransport {
    async fn send(&self, to: &str, subject: &str, body: &str) -> bool {
        let message = match self.build_message(to, subject, body) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(to = %to, error = %e, "Could not build email");
                return false;
            }
        };

        match self.transport.send(message).await {
            Ok(_) => {
                tracing::debug!(to = %to, subject = %subject, "Email sent");
                true
            }
            Err(e) => {
                tracing::warn!(to = %to, error = %e, "SMTP delivery failed");
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> EmailConfig {
        EmailConfig {
            enabled: true,
            smtp_host: "smtp.example.edu".to_string(),
            smtp_port: 587,
            username: Some("desk".to_string()),
            password: Some("secret".to_string()),
            from_address: "noreply@example.edu".to_string(),
            from_name: "CampusDesk".to_string(),
        }
    }

    #[tokio::test]
    async fn test_build_message() {
        let transport = SmtpEmailTransport::new(&config()).unwrap();
        let message = transport
            .build_message("student@example.edu", "[CampusDesk] Update", "Body")
            .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("To: student@example.edu"));
        assert!(raw.contains("Subject: [CampusDesk] Update"));
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_not_sent() {
        let transport = SmtpEmailTransport::new(&config()).unwrap();
        assert!(!transport.send("not an address", "s", "b").await);
    }

    #[test]
    fn test_invalid_from_address() {
        let mut config = config();
        config.from_address = "nope".to_string();
        assert!(matches!(
            SmtpEmailTransport::new(&config),
            Err(AppError::Config(_))
        ));
    }
}

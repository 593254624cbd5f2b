//! SMTP mail provider.

use crate::traits::{Email, MailError, MailResult, Mailer, Sender};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use sankey_common::config::SmtpConfig;
use tracing::info;
use uuid::Uuid;

/// SMTP mailer using STARTTLS relay by default.
pub struct SmtpMailer {
    config: SmtpConfig,
    sender: Sender,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig, sender: Sender) -> Self {
        Self { config, sender }
    }

    fn create_transport(&self) -> MailResult<SmtpTransport> {
        let creds = Credentials::new(self.config.username.clone(), self.config.password.clone());
        let transport = if self.config.starttls {
            SmtpTransport::starttls_relay(&self.config.host)
                .map_err(|e| MailError::Connection(format!("SMTP setup failed: {e}")))?
                .port(self.config.port)
                .credentials(creds)
                .build()
        } else {
            SmtpTransport::builder_dangerous(&self.config.host)
                .port(self.config.port)
                .credentials(creds)
                .build()
        };
        Ok(transport)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, email: &Email) -> MailResult<String> {
        let message = Message::builder()
            .from(
                self.sender
                    .mailbox()
                    .parse()
                    .map_err(|e| MailError::InvalidMessage(format!("Invalid from address: {e}")))?,
            )
            .to(email
                .to
                .parse()
                .map_err(|e| MailError::InvalidMessage(format!("Invalid recipient: {e}")))?)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(email.html_body.clone())
            .map_err(|e| MailError::InvalidMessage(format!("Failed to build email: {e}")))?;

        let transport = self.create_transport()?;
        transport
            .send(&message)
            .map_err(|e| MailError::SendFailed(format!("SMTP send failed: {e}")))?;

        let msg_id = format!("smtp-{}", Uuid::new_v4());
        info!(recipient = %email.to, msg_id = %msg_id, "Email sent via SMTP");
        Ok(msg_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".into(),
            port: 587,
            starttls: true,
            username: "user".into(),
            password: "password".into(),
        }
    }

    fn test_sender() -> Sender {
        Sender {
            address: "alerts@fin-sankey.com".into(),
            name: "fin.sankey Alerts".into(),
        }
    }

    #[test]
    fn transport_builds_for_starttls_and_plain() {
        let mailer = SmtpMailer::new(test_config(), test_sender());
        assert!(mailer.create_transport().is_ok());

        let mut plain = test_config();
        plain.starttls = false;
        plain.port = 1025;
        let mailer = SmtpMailer::new(plain, test_sender());
        assert!(mailer.create_transport().is_ok());
    }

    #[tokio::test]
    async fn invalid_recipient_is_rejected_before_connecting() {
        let mailer = SmtpMailer::new(test_config(), test_sender());
        let email = Email {
            to: "not an address".into(),
            subject: "s".into(),
            html_body: "b".into(),
        };
        let err = mailer.send(&email).await.unwrap_err();
        assert!(matches!(err, MailError::InvalidMessage(_)));
    }
}

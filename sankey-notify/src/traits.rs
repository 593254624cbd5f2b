//! Mailer trait for outbound email providers.

use async_trait::async_trait;

/// Result type for mailer operations.
pub type MailResult<T> = Result<T, MailError>;

/// Mailer error type.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// An outbound email, provider-agnostic.
#[derive(Debug, Clone)]
pub struct Email {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html_body: String,
}

/// Sender identity attached to outgoing mail.
#[derive(Debug, Clone)]
pub struct Sender {
    pub address: String,
    pub name: String,
}

impl Sender {
    /// RFC 5322 style `Name <address>` rendering.
    pub fn mailbox(&self) -> String {
        if self.name.is_empty() {
            self.address.clone()
        } else {
            format!("{} <{}>", self.name, self.address)
        }
    }
}

/// Mail provider trait.
///
/// Implement this trait to add support for a new delivery backend. The
/// dispatcher treats all providers uniformly through this contract.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Provider name (sendgrid, resend, smtp).
    fn name(&self) -> &'static str;

    /// Send one email. Returns a provider message id on success.
    async fn send(&self, email: &Email) -> MailResult<String>;
}

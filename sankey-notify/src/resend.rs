//! Resend mail provider.

use crate::traits::{Email, MailError, MailResult, Mailer, Sender};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

const RESEND_SEND_URL: &str = "https://api.resend.com/emails";

/// Resend API mailer.
pub struct ResendMailer {
    api_key: String,
    sender: Sender,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ResendRequest<'a> {
    from: String,
    to: Vec<&'a str>,
    subject: &'a str,
    html: &'a str,
}

#[derive(Debug, Deserialize)]
struct ResendResponse {
    id: Option<String>,
}

impl ResendMailer {
    pub fn new(api_key: &str, sender: Sender) -> Self {
        Self {
            api_key: api_key.to_string(),
            sender,
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn build_request<'a>(&self, email: &'a Email) -> ResendRequest<'a> {
        ResendRequest {
            from: self.sender.mailbox(),
            to: vec![&email.to],
            subject: &email.subject,
            html: &email.html_body,
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    fn name(&self) -> &'static str {
        "resend"
    }

    async fn send(&self, email: &Email) -> MailResult<String> {
        let body = self.build_request(email);

        let response = self
            .client
            .post(RESEND_SEND_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| MailError::Connection(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let parsed: ResendResponse = response.json().await.unwrap_or(ResendResponse { id: None });
            let msg_id = parsed
                .id
                .unwrap_or_else(|| format!("resend-{}", Uuid::new_v4()));
            info!(recipient = %email.to, msg_id = %msg_id, "Email sent via Resend");
            return Ok(msg_id);
        }

        let code = status.as_u16();
        match code {
            401 | 403 => Err(MailError::Auth(format!("Resend rejected key ({code})"))),
            429 => {
                let retry_after_secs = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60);
                Err(MailError::RateLimited { retry_after_secs })
            }
            _ => {
                let text = response.text().await.unwrap_or_default();
                Err(MailError::SendFailed(format!(
                    "Resend API error ({code}): {text}"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_display_from() {
        let mailer = ResendMailer::new(
            "re-key",
            Sender {
                address: "alerts@fin-sankey.com".into(),
                name: "fin.sankey Alerts".into(),
            },
        );
        let email = Email {
            to: "user@example.com".into(),
            subject: "Report ready".into(),
            html_body: "<p>hi</p>".into(),
        };

        let json = serde_json::to_value(mailer.build_request(&email)).unwrap();
        assert_eq!(json["from"], "fin.sankey Alerts <alerts@fin-sankey.com>");
        assert_eq!(json["to"][0], "user@example.com");
        assert_eq!(json["html"], "<p>hi</p>");
    }

    #[test]
    fn response_id_deserializes() {
        let parsed: ResendResponse =
            serde_json::from_str(r#"{"id":"49a3999c-0ce1-4ea6-ab68"}"#).unwrap();
        assert_eq!(parsed.id.as_deref(), Some("49a3999c-0ce1-4ea6-ab68"));
    }
}

//! SendGrid mail provider.

use crate::traits::{Email, MailError, MailResult, Mailer, Sender};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

const SENDGRID_SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// SendGrid v3 API mailer.
pub struct SendGridMailer {
    api_key: String,
    sender: Sender,
    client: Client,
}

#[derive(Debug, Serialize)]
struct SendGridRequest<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'a str,
    value: &'a str,
}

impl SendGridMailer {
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

    fn build_request<'a>(&'a self, email: &'a Email) -> SendGridRequest<'a> {
        SendGridRequest {
            personalizations: vec![Personalization {
                to: vec![Address {
                    email: &email.to,
                    name: None,
                }],
            }],
            from: Address {
                email: &self.sender.address,
                name: if self.sender.name.is_empty() {
                    None
                } else {
                    Some(&self.sender.name)
                },
            },
            subject: &email.subject,
            content: vec![Content {
                content_type: "text/html",
                value: &email.html_body,
            }],
        }
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    fn name(&self) -> &'static str {
        "sendgrid"
    }

    async fn send(&self, email: &Email) -> MailResult<String> {
        let body = self.build_request(email);

        let response = self
            .client
            .post(SENDGRID_SEND_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| MailError::Connection(e.to_string()))?;

        let status = response.status().as_u16();
        match status {
            // SendGrid acknowledges accepted mail with 202 (200/201 kept
            // for API-compatible gateways)
            200 | 201 | 202 => {
                let msg_id = response
                    .headers()
                    .get("X-Message-Id")
                    .and_then(|v| v.to_str().ok())
                    .map(ToString::to_string)
                    .unwrap_or_else(|| format!("sendgrid-{}", Uuid::new_v4()));
                info!(recipient = %email.to, msg_id = %msg_id, "Email sent via SendGrid");
                Ok(msg_id)
            }
            401 | 403 => Err(MailError::Auth(format!("SendGrid rejected key ({status})"))),
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
                    "SendGrid API error ({status}): {text}"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_sender() -> Sender {
        Sender {
            address: "alerts@fin-sankey.com".into(),
            name: "fin.sankey Alerts".into(),
        }
    }

    #[test]
    fn request_serializes_to_v3_shape() {
        let mailer = SendGridMailer::new("sg-key", test_sender());
        let email = Email {
            to: "user@example.com".into(),
            subject: "Report ready".into(),
            html_body: "<p>hi</p>".into(),
        };

        let json = serde_json::to_value(mailer.build_request(&email)).unwrap();
        assert_eq!(
            json["personalizations"][0]["to"][0]["email"],
            "user@example.com"
        );
        assert_eq!(json["from"]["email"], "alerts@fin-sankey.com");
        assert_eq!(json["from"]["name"], "fin.sankey Alerts");
        assert_eq!(json["content"][0]["type"], "text/html");
        assert_eq!(json["subject"], "Report ready");
    }

    #[test]
    fn anonymous_sender_omits_name() {
        let mailer = SendGridMailer::new(
            "sg-key",
            Sender {
                address: "a@b.com".into(),
                name: String::new(),
            },
        );
        let email = Email {
            to: "user@example.com".into(),
            subject: "s".into(),
            html_body: "b".into(),
        };
        let json = serde_json::to_value(mailer.build_request(&email)).unwrap();
        assert!(json["from"].get("name").is_none());
    }
}

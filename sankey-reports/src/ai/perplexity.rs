//! Perplexity completion client.
//!
//! Speaks the OpenAI-compatible `/chat/completions` format against
//! `https://api.perplexity.ai`, with the `citations` extension Perplexity
//! adds to its responses.

use super::{GeneratedReport, ModelError, ModelResult, ReportModel};
use async_trait::async_trait;
use reqwest::Client;
use sankey_common::config::ReportsConfig;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";

/// Perplexity chat-completions client.
pub struct PerplexityClient {
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: i64,
    client: Client,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<CompletionMessage<'a>>,
    max_tokens: i64,
}

#[derive(Debug, Serialize)]
struct CompletionMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    citations: Vec<String>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionResponseMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionResponseMessage {
    content: String,
}

impl PerplexityClient {
    /// Create a client from report configuration.
    ///
    /// A missing API key is tolerated at construction; calls then fail
    /// with a caller-visible rejection rather than crashing the service.
    pub fn new(api_key: Option<&str>, config: &ReportsConfig) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, api_key, config)
    }

    /// Create a client for an explicit endpoint (used against
    /// API-compatible gateways).
    pub fn with_base_url(base_url: &str, api_key: Option<&str>, config: &ReportsConfig) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(ToString::to_string),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            client: Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn classify_status(status: u16, body: String) -> ModelError {
        match status {
            429 => ModelError::RateLimited {
                retry_after_secs: None,
            },
            400 | 404 | 422 => ModelError::InvalidInput(format!("API error ({status}): {body}")),
            _ => ModelError::Upstream {
                status,
                message: body,
            },
        }
    }
}

#[async_trait]
impl ReportModel for PerplexityClient {
    fn name(&self) -> &str {
        "perplexity"
    }

    async fn generate(&self, prompt: &str) -> ModelResult<GeneratedReport> {
        let start = Instant::now();

        let api_key = self.api_key.as_ref().ok_or_else(|| {
            ModelError::InvalidInput("Perplexity API key not set. Set PERPLEXITY_API_KEY.".into())
        })?;

        let request = CompletionRequest {
            model: &self.model,
            messages: vec![CompletionMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout
                } else {
                    ModelError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(ModelError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status.as_u16(), body));
        }

        let result: CompletionResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ModelError::Timeout
            } else {
                ModelError::Network(format!("Failed to parse response: {e}"))
            }
        })?;

        let choice = result.choices.into_iter().next().ok_or_else(|| ModelError::Upstream {
            status: status.as_u16(),
            message: "Empty choices in completion response".into(),
        })?;

        Ok(GeneratedReport {
            content: choice.message.content,
            citations: result.citations,
            model: result.model.unwrap_or_else(|| self.model.clone()),
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ReportsConfig {
        ReportsConfig::default()
    }

    #[test]
    fn client_defaults_from_config() {
        let client = PerplexityClient::new(Some("pplx-key"), &test_config());
        assert_eq!(client.name(), "perplexity");
        assert_eq!(client.base_url, "https://api.perplexity.ai");
        assert_eq!(client.model, "sonar");
        assert_eq!(client.max_tokens, 4000);
    }

    #[test]
    fn base_url_strips_trailing_slash() {
        let client =
            PerplexityClient::with_base_url("http://localhost:8080/", Some("k"), &test_config());
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[tokio::test]
    async fn missing_key_is_rejected_without_network() {
        let client = PerplexityClient::new(None, &test_config());
        let err = client.generate("prompt").await.unwrap_err();
        assert!(matches!(err, ModelError::InvalidInput(_)));
    }

    #[test]
    fn request_serializes_to_chat_completions_shape() {
        let request = CompletionRequest {
            model: "sonar",
            messages: vec![CompletionMessage {
                role: "user",
                content: "Analyze AAPL",
            }],
            max_tokens: 4000,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "sonar");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 4000);
    }

    #[test]
    fn response_parses_content_and_citations() {
        let json = r###"{
            "model": "sonar",
            "choices": [{
                "message": {"content": "## Investment Thesis\nBUY"},
                "finish_reason": "stop"
            }],
            "citations": ["https://example.com/10-k", "https://example.com/ir"]
        }"###;
        let parsed: CompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content, "## Investment Thesis\nBUY");
        assert_eq!(parsed.citations.len(), 2);
    }

    #[test]
    fn response_without_citations_parses() {
        let json = r#"{"choices": [{"message": {"content": "text"}}]}"#;
        let parsed: CompletionResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.citations.is_empty());
        assert!(parsed.model.is_none());
    }

    #[test]
    fn status_classification_matches_taxonomy() {
        assert!(matches!(
            PerplexityClient::classify_status(400, "bad".into()),
            ModelError::InvalidInput(_)
        ));
        assert!(matches!(
            PerplexityClient::classify_status(422, "bad".into()),
            ModelError::InvalidInput(_)
        ));
        assert!(matches!(
            PerplexityClient::classify_status(500, "boom".into()),
            ModelError::Upstream { status: 500, .. }
        ));
        assert!(matches!(
            PerplexityClient::classify_status(429, String::new()),
            ModelError::RateLimited { .. }
        ));
    }
}

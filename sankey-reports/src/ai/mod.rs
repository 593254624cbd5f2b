//! Completion model abstraction for report generation.
//!
//! Provides a unified interface over completion APIs with a failure
//! taxonomy the pipeline can act on: timeouts and client-side rejections
//! invalidate a generation, everything else is an upstream fault.

mod perplexity;

pub use perplexity::PerplexityClient;

use async_trait::async_trait;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Completion failure classification.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The call exceeded its request deadline.
    #[error("Completion request timed out")]
    Timeout,

    /// The provider throttled us; retry later.
    #[error("Rate limited by completion provider")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Client-side rejection (bad input, missing key). Retrying the same
    /// input cannot succeed.
    #[error("Completion request rejected: {0}")]
    InvalidInput(String),

    /// Provider-side failure.
    #[error("Completion provider error ({status}): {message}")]
    Upstream { status: u16, message: String },

    /// Transport-level failure before any HTTP status arrived.
    #[error("Completion transport error: {0}")]
    Network(String),
}

impl ModelError {
    /// Whether a retry with the same input could succeed.
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidInput(_))
    }
}

/// A successful completion.
#[derive(Debug, Clone)]
pub struct GeneratedReport {
    /// Report text (markdown).
    pub content: String,
    /// Source citations, when the provider returns them.
    pub citations: Vec<String>,
    /// Model that produced the report.
    pub model: String,
    /// Round-trip latency in milliseconds.
    pub latency_ms: u64,
}

/// Completion model trait.
///
/// Implementations handle authentication, request formatting, and
/// response parsing for a specific completion API.
#[async_trait]
pub trait ReportModel: Send + Sync {
    /// Model backend name (e.g., "perplexity").
    fn name(&self) -> &str;

    /// Generate a report from a prompt.
    async fn generate(&self, prompt: &str) -> ModelResult<GeneratedReport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_is_not_retryable() {
        assert!(!ModelError::InvalidInput("bad".into()).is_retryable());
        assert!(ModelError::Timeout.is_retryable());
        assert!(ModelError::RateLimited {
            retry_after_secs: Some(5)
        }
        .is_retryable());
        assert!(ModelError::Upstream {
            status: 500,
            message: "boom".into()
        }
        .is_retryable());
        assert!(ModelError::Network("reset".into()).is_retryable());
    }
}

//! Record types for report persistence and delivery auditing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a report result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    /// Generation is in flight.
    Pending,
    /// Generation succeeded; the record is immutable from here on.
    Ready,
    /// Generation failed; `error` carries the classification.
    Failed,
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Ready => write!(f, "ready"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A generated (or failed) AI report, keyed by fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRecord {
    /// Deterministic request fingerprint; the idempotency key.
    pub fingerprint: String,
    /// Ticker the report covers.
    pub ticker: String,
    /// Generated report text (markdown). Empty for failed records.
    pub content: String,
    /// Source citations returned by the completion API.
    #[serde(default)]
    pub citations: Vec<String>,
    /// Hash of the financial snapshot the report was generated from.
    pub snapshot_hash: String,
    /// Lifecycle status.
    pub status: ReportStatus,
    /// Error classification when status is failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Generation timestamp.
    pub generated_at: DateTime<Utc>,
}

impl ReportRecord {
    /// Create a ready record for a successful generation.
    pub fn ready(
        fingerprint: impl Into<String>,
        ticker: impl Into<String>,
        content: impl Into<String>,
        citations: Vec<String>,
        snapshot_hash: impl Into<String>,
    ) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            ticker: ticker.into(),
            content: content.into(),
            citations,
            snapshot_hash: snapshot_hash.into(),
            status: ReportStatus::Ready,
            error: None,
            generated_at: Utc::now(),
        }
    }

    /// Create a failed record carrying the error classification.
    pub fn failed(
        fingerprint: impl Into<String>,
        ticker: impl Into<String>,
        snapshot_hash: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            ticker: ticker.into(),
            content: String::new(),
            citations: Vec::new(),
            snapshot_hash: snapshot_hash.into(),
            status: ReportStatus::Failed,
            error: Some(error.into()),
            generated_at: Utc::now(),
        }
    }

    /// Whether this record holds usable content.
    pub const fn is_ready(&self) -> bool {
        matches!(self.status, ReportStatus::Ready)
    }
}

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryOutcome {
    Sent,
    Failed,
}

/// One delivery attempt in the append-only notification audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// Record id.
    pub id: String,
    /// Fingerprint of the delivered report.
    pub fingerprint: String,
    /// Recipient email address.
    pub recipient: String,
    /// Provider that made this attempt (sendgrid, resend, smtp).
    pub provider: String,
    /// 1-based attempt number within a delivery call.
    pub attempt: u32,
    /// Whether the attempt succeeded.
    pub outcome: DeliveryOutcome,
    /// Provider error message when the attempt failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Attempt timestamp.
    pub timestamp: DateTime<Utc>,
}

impl DeliveryRecord {
    /// Record a successful attempt.
    pub fn sent(
        fingerprint: impl Into<String>,
        recipient: impl Into<String>,
        provider: impl Into<String>,
        attempt: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            fingerprint: fingerprint.into(),
            recipient: recipient.into(),
            provider: provider.into(),
            attempt,
            outcome: DeliveryOutcome::Sent,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Record a failed attempt.
    pub fn failed(
        fingerprint: impl Into<String>,
        recipient: impl Into<String>,
        provider: impl Into<String>,
        attempt: u32,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            fingerprint: fingerprint.into(),
            recipient: recipient.into(),
            provider: provider.into(),
            attempt,
            outcome: DeliveryOutcome::Failed,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

/// An inbound report request, recorded before generation starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub fingerprint: String,
    pub requester_id: String,
    pub requested_at: DateTime<Utc>,
}

impl RequestRecord {
    pub fn new(fingerprint: impl Into<String>, requester_id: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            requester_id: requester_id.into(),
            requested_at: Utc::now(),
        }
    }
}

/// Cached report payload. Best-effort; absence is always just a miss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub content: String,
    #[serde(default)]
    pub citations: Vec<String>,
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(
        fingerprint: impl Into<String>,
        content: impl Into<String>,
        citations: Vec<String>,
    ) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            content: content.into(),
            citations,
            cached_at: Utc::now(),
        }
    }
}

/// Monthly usage counter row for quota enforcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub requester_id: String,
    /// Month key, `YYYY-MM` (UTC).
    pub month: String,
    pub reports_generated: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ReportStatus::Ready).unwrap(),
            "\"ready\""
        );
        let status: ReportStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(status, ReportStatus::Failed);
    }

    #[test]
    fn ready_record_has_no_error() {
        let record = ReportRecord::ready("fp1", "AAPL", "content", vec!["s1".into()], "hash1");
        assert!(record.is_ready());
        assert!(record.error.is_none());
        assert_eq!(record.citations.len(), 1);
    }

    #[test]
    fn failed_record_carries_classification() {
        let record = ReportRecord::failed("fp1", "AAPL", "hash1", "timeout");
        assert!(!record.is_ready());
        assert_eq!(record.status, ReportStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("timeout"));
        assert!(record.content.is_empty());
    }

    #[test]
    fn delivery_record_constructors() {
        let sent = DeliveryRecord::sent("fp1", "a@b.com", "sendgrid", 1);
        assert_eq!(sent.outcome, DeliveryOutcome::Sent);
        assert!(sent.error.is_none());

        let failed = DeliveryRecord::failed("fp1", "a@b.com", "sendgrid", 1, "503");
        assert_eq!(failed.outcome, DeliveryOutcome::Failed);
        assert_eq!(failed.error.as_deref(), Some("503"));
        assert_ne!(sent.id, failed.id);
    }

    #[test]
    fn report_record_roundtrips_through_json() {
        let record = ReportRecord::ready("fp1", "MSFT", "text", vec![], "hash");
        let json = serde_json::to_string(&record).unwrap();
        // Failed-only field is omitted for ready records
        assert!(!json.contains("\"error\""));
        let back: ReportRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.fingerprint, "fp1");
        assert_eq!(back.status, ReportStatus::Ready);
    }
}

//! Store trait for report persistence backends.

use crate::types::{DeliveryRecord, ReportRecord, RequestRecord};
use async_trait::async_trait;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store error type.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

/// Durable store for report results, delivery records, and usage counters.
///
/// Each write is atomic at single-record granularity; reads return the
/// latest committed value. Implementations must not retry internally —
/// the pipeline decides what a failed write means.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Backend name (e.g., "supabase", "memory").
    fn name(&self) -> &'static str;

    /// Record an inbound report request.
    async fn record_request(&self, record: &RequestRecord) -> StoreResult<()>;

    /// Persist a report record, replacing any record with the same
    /// fingerprint.
    async fn save_report(&self, record: &ReportRecord) -> StoreResult<()>;

    /// Fetch the report record for a fingerprint.
    async fn find_report(&self, fingerprint: &str) -> StoreResult<Option<ReportRecord>>;

    /// Append one delivery attempt to the audit trail. Never mutates
    /// existing records.
    async fn append_delivery(&self, record: &DeliveryRecord) -> StoreResult<()>;

    /// Find a successful delivery for a fingerprint+recipient pair, if any.
    async fn find_sent_delivery(
        &self,
        fingerprint: &str,
        recipient: &str,
    ) -> StoreResult<Option<DeliveryRecord>>;

    /// Reports generated by a requester in the given `YYYY-MM` month.
    async fn monthly_usage(&self, requester_id: &str, month: &str) -> StoreResult<u32>;

    /// Count one fresh generation against a requester's monthly usage.
    async fn record_usage(&self, requester_id: &str, month: &str) -> StoreResult<()>;

    /// Health check — returns true if the backend is reachable.
    async fn health_check(&self) -> bool;
}

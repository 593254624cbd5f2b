//! In-process store backend.
//!
//! Used when no persistence URL is configured (degraded durability) and as
//! the test double for the pipeline. State lives for the process lifetime
//! only.

use crate::traits::{ReportStore, StoreResult};
use crate::types::{DeliveryOutcome, DeliveryRecord, ReportRecord, RequestRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory report store.
#[derive(Default)]
pub struct MemoryStore {
    requests: RwLock<Vec<RequestRecord>>,
    reports: RwLock<HashMap<String, ReportRecord>>,
    deliveries: RwLock<Vec<DeliveryRecord>>,
    usage: RwLock<HashMap<(String, String), u32>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total request records, for assertions in tests.
    pub async fn request_count(&self) -> usize {
        self.requests.read().await.len()
    }

    /// Total delivery records, for assertions in tests.
    pub async fn delivery_count(&self) -> usize {
        self.deliveries.read().await.len()
    }

    /// Delivery records for a fingerprint, in append order.
    pub async fn deliveries_for(&self, fingerprint: &str) -> Vec<DeliveryRecord> {
        self.deliveries
            .read()
            .await
            .iter()
            .filter(|r| r.fingerprint == fingerprint)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn record_request(&self, record: &RequestRecord) -> StoreResult<()> {
        self.requests.write().await.push(record.clone());
        Ok(())
    }

    async fn save_report(&self, record: &ReportRecord) -> StoreResult<()> {
        let mut reports = self.reports.write().await;
        reports.insert(record.fingerprint.clone(), record.clone());
        Ok(())
    }

    async fn find_report(&self, fingerprint: &str) -> StoreResult<Option<ReportRecord>> {
        Ok(self.reports.read().await.get(fingerprint).cloned())
    }

    async fn append_delivery(&self, record: &DeliveryRecord) -> StoreResult<()> {
        self.deliveries.write().await.push(record.clone());
        Ok(())
    }

    async fn find_sent_delivery(
        &self,
        fingerprint: &str,
        recipient: &str,
    ) -> StoreResult<Option<DeliveryRecord>> {
        Ok(self
            .deliveries
            .read()
            .await
            .iter()
            .find(|r| {
                r.fingerprint == fingerprint
                    && r.recipient == recipient
                    && r.outcome == DeliveryOutcome::Sent
            })
            .cloned())
    }

    async fn monthly_usage(&self, requester_id: &str, month: &str) -> StoreResult<u32> {
        Ok(self
            .usage
            .read()
            .await
            .get(&(requester_id.to_string(), month.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn record_usage(&self, requester_id: &str, month: &str) -> StoreResult<()> {
        let mut usage = self.usage.write().await;
        *usage
            .entry((requester_id.to_string(), month.to_string()))
            .or_insert(0) += 1;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_find_returns_latest() {
        let store = MemoryStore::new();
        let first = ReportRecord::ready("fp1", "AAPL", "v1", vec![], "h1");
        store.save_report(&first).await.unwrap();

        let second = ReportRecord::ready("fp1", "AAPL", "v2", vec![], "h1");
        store.save_report(&second).await.unwrap();

        let found = store.find_report("fp1").await.unwrap().unwrap();
        assert_eq!(found.content, "v2");
    }

    #[tokio::test]
    async fn find_missing_report_is_none() {
        let store = MemoryStore::new();
        assert!(store.find_report("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deliveries_are_append_only() {
        let store = MemoryStore::new();
        store
            .append_delivery(&DeliveryRecord::failed("fp1", "a@b.com", "sendgrid", 1, "503"))
            .await
            .unwrap();
        store
            .append_delivery(&DeliveryRecord::sent("fp1", "a@b.com", "resend", 2))
            .await
            .unwrap();

        assert_eq!(store.delivery_count().await, 2);

        let sent = store
            .find_sent_delivery("fp1", "a@b.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sent.provider, "resend");
    }

    #[tokio::test]
    async fn sent_delivery_matches_exact_pair() {
        let store = MemoryStore::new();
        store
            .append_delivery(&DeliveryRecord::sent("fp1", "a@b.com", "sendgrid", 1))
            .await
            .unwrap();

        // Different recipient and different fingerprint both miss
        assert!(store
            .find_sent_delivery("fp1", "other@b.com")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_sent_delivery("fp2", "a@b.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn requests_accumulate() {
        let store = MemoryStore::new();
        store
            .record_request(&RequestRecord::new("fp1", "user1"))
            .await
            .unwrap();
        store
            .record_request(&RequestRecord::new("fp1", "user2"))
            .await
            .unwrap();
        assert_eq!(store.request_count().await, 2);
    }

    #[tokio::test]
    async fn usage_counter_increments_per_month() {
        let store = MemoryStore::new();
        assert_eq!(store.monthly_usage("user1", "2026-08").await.unwrap(), 0);

        store.record_usage("user1", "2026-08").await.unwrap();
        store.record_usage("user1", "2026-08").await.unwrap();
        store.record_usage("user1", "2026-09").await.unwrap();

        assert_eq!(store.monthly_usage("user1", "2026-08").await.unwrap(), 2);
        assert_eq!(store.monthly_usage("user1", "2026-09").await.unwrap(), 1);
        assert_eq!(store.monthly_usage("user2", "2026-08").await.unwrap(), 0);
    }
}

//! Monthly report quota enforcement.
//!
//! Tracks AI report generations per requester and calendar month against
//! tier allowances. Only fresh generations count — cache and store hits
//! are free.

use chrono::{DateTime, Utc};
use sankey_common::config::TiersConfig;
use sankey_store::ReportStore;
use std::sync::Arc;
use tracing::warn;

/// Outcome of a quota check.
#[derive(Debug, Clone)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub used: u32,
    /// Monthly allowance; `None` means unlimited.
    pub limit: Option<u32>,
}

/// Quota manager over the report store's usage counters.
pub struct QuotaManager {
    store: Arc<dyn ReportStore>,
    tiers: TiersConfig,
}

impl QuotaManager {
    pub fn new(store: Arc<dyn ReportStore>, tiers: TiersConfig) -> Self {
        Self { store, tiers }
    }

    /// Month key for usage bucketing, `YYYY-MM` in UTC.
    pub fn month_key(now: DateTime<Utc>) -> String {
        now.format("%Y-%m").to_string()
    }

    /// Check whether a requester may generate another report this month.
    ///
    /// A store failure degrades to "allowed" — refusing reports because
    /// the usage counter is unreachable would turn a persistence outage
    /// into a generation outage.
    pub async fn check(&self, requester_id: &str, tier: &str) -> QuotaDecision {
        let limit = self.tiers.for_tier(tier).ai_reports_per_month;

        let Some(limit) = limit else {
            return QuotaDecision {
                allowed: true,
                used: 0,
                limit: None,
            };
        };

        let month = Self::month_key(Utc::now());
        let used = match self.store.monthly_usage(requester_id, &month).await {
            Ok(used) => used,
            Err(e) => {
                warn!(error = %e, requester_id, "Usage lookup failed, allowing generation");
                return QuotaDecision {
                    allowed: true,
                    used: 0,
                    limit: Some(limit),
                };
            }
        };

        QuotaDecision {
            allowed: used < limit,
            used,
            limit: Some(limit),
        }
    }

    /// Count one fresh generation. Failures are logged, not surfaced —
    /// the report was already produced.
    pub async fn record(&self, requester_id: &str) {
        let month = Self::month_key(Utc::now());
        if let Err(e) = self.store.record_usage(requester_id, &month).await {
            warn!(error = %e, requester_id, "Failed to record report usage");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sankey_store::MemoryStore;

    fn manager() -> (QuotaManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (
            QuotaManager::new(store.clone(), TiersConfig::default()),
            store,
        )
    }

    #[test]
    fn month_key_formats_utc() {
        let ts = Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap();
        assert_eq!(QuotaManager::month_key(ts), "2026-08");
    }

    #[tokio::test]
    async fn free_tier_allows_up_to_three() {
        let (quota, _) = manager();

        for _ in 0..3 {
            let decision = quota.check("user1", "free").await;
            assert!(decision.allowed);
            quota.record("user1").await;
        }

        let decision = quota.check("user1", "free").await;
        assert!(!decision.allowed);
        assert_eq!(decision.used, 3);
        assert_eq!(decision.limit, Some(3));
    }

    #[tokio::test]
    async fn enterprise_tier_is_unlimited() {
        let (quota, _) = manager();
        for _ in 0..100 {
            quota.record("corp").await;
        }
        let decision = quota.check("corp", "enterprise").await;
        assert!(decision.allowed);
        assert_eq!(decision.limit, None);
    }

    #[tokio::test]
    async fn quota_is_per_requester() {
        let (quota, _) = manager();
        for _ in 0..3 {
            quota.record("user1").await;
        }
        assert!(!quota.check("user1", "free").await.allowed);
        assert!(quota.check("user2", "free").await.allowed);
    }
}

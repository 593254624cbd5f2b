//! Supabase (PostgREST) store backend.
//!
//! Tables:
//! - `report_results` — one row per fingerprint, upserted on conflict
//! - `notification_log` — append-only delivery audit trail
//! - `report_usage` — monthly generation counters per requester
//!
//! Every call is a single PostgREST request, so each write is atomic at
//! row granularity. The anon key is sent both as `apikey` and as a bearer
//! token, which is how Supabase clients authenticate.

use crate::traits::{ReportStore, StoreError, StoreResult};
use crate::types::{DeliveryRecord, ReportRecord, RequestRecord, UsageRecord};
use async_trait::async_trait;
use reqwest::Client;
use sankey_common::config::PersistenceConfig;
use std::time::Duration;

/// PostgREST-backed report store.
pub struct SupabaseStore {
    base_url: String,
    anon_key: String,
    client: Client,
}

impl SupabaseStore {
    /// Create a store from persistence configuration.
    ///
    /// Returns `None` when the URL or key is not configured; callers fall
    /// back to the in-memory store.
    pub fn from_config(config: &PersistenceConfig) -> Option<Self> {
        let url = config.url.as_deref()?;
        let key = config.anon_key.as_deref()?;
        Some(Self::new(url, key, config.timeout_secs))
    }

    /// Create a store for an explicit endpoint.
    pub fn new(base_url: &str, anon_key: &str, timeout_secs: u64) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .connect_timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
    }

    async fn check_status(response: reqwest::Response) -> StoreResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Request(format!(
            "PostgREST error ({}): {}",
            status.as_u16(),
            body
        )))
    }

    async fn select_one<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> StoreResult<Option<T>> {
        let mut query: Vec<(&str, String)> = vec![("select", "*".into()), ("limit", "1".into())];
        query.extend(filters.iter().cloned());

        let response = self
            .authed(self.client.get(self.table_url(table)).query(&query))
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let response = Self::check_status(response).await?;
        let mut rows: Vec<T> = response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.remove(0))
        })
    }

    async fn insert<T: serde::Serialize>(&self, table: &str, row: &T) -> StoreResult<()> {
        let response = self
            .authed(self.client.post(self.table_url(table)).json(row))
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Self::check_status(response).await?;
        Ok(())
    }

    async fn upsert<T: serde::Serialize>(
        &self,
        table: &str,
        on_conflict: &str,
        row: &T,
    ) -> StoreResult<()> {
        let response = self
            .authed(
                self.client
                    .post(self.table_url(table))
                    .query(&[("on_conflict", on_conflict)])
                    .header("Prefer", "resolution=merge-duplicates")
                    .json(row),
            )
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Self::check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ReportStore for SupabaseStore {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn record_request(&self, record: &RequestRecord) -> StoreResult<()> {
        self.insert("report_requests", record).await
    }

    async fn save_report(&self, record: &ReportRecord) -> StoreResult<()> {
        self.upsert("report_results", "fingerprint", record).await
    }

    async fn find_report(&self, fingerprint: &str) -> StoreResult<Option<ReportRecord>> {
        self.select_one(
            "report_results",
            &[("fingerprint", format!("eq.{fingerprint}"))],
        )
        .await
    }

    async fn append_delivery(&self, record: &DeliveryRecord) -> StoreResult<()> {
        self.insert("notification_log", record).await
    }

    async fn find_sent_delivery(
        &self,
        fingerprint: &str,
        recipient: &str,
    ) -> StoreResult<Option<DeliveryRecord>> {
        self.select_one(
            "notification_log",
            &[
                ("fingerprint", format!("eq.{fingerprint}")),
                ("recipient", format!("eq.{recipient}")),
                ("outcome", "eq.sent".to_string()),
            ],
        )
        .await
    }

    async fn monthly_usage(&self, requester_id: &str, month: &str) -> StoreResult<u32> {
        let row: Option<UsageRecord> = self
            .select_one(
                "report_usage",
                &[
                    ("requester_id", format!("eq.{requester_id}")),
                    ("month", format!("eq.{month}")),
                ],
            )
            .await?;
        Ok(row.map_or(0, |r| r.reports_generated))
    }

    async fn record_usage(&self, requester_id: &str, month: &str) -> StoreResult<()> {
        // Read-then-upsert, matching how the dashboard bumps its usage
        // counters. The upsert itself is a single atomic row write.
        let current = self.monthly_usage(requester_id, month).await?;
        let row = UsageRecord {
            requester_id: requester_id.to_string(),
            month: month.to_string(),
            reports_generated: current + 1,
        };
        self.upsert("report_usage", "requester_id,month", &row).await
    }

    async fn health_check(&self) -> bool {
        let response = self
            .authed(
                self.client
                    .get(self.table_url("report_results"))
                    .query(&[("select", "fingerprint"), ("limit", "1")]),
            )
            .send()
            .await;
        matches!(response, Ok(r) if r.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_requires_url_and_key() {
        let mut config = PersistenceConfig::default();
        assert!(SupabaseStore::from_config(&config).is_none());

        config.url = Some("https://proj.supabase.co".into());
        assert!(SupabaseStore::from_config(&config).is_none());

        config.anon_key = Some("anon".into());
        let store = SupabaseStore::from_config(&config).unwrap();
        assert_eq!(store.name(), "supabase");
    }

    #[test]
    fn table_url_strips_trailing_slash() {
        let store = SupabaseStore::new("https://proj.supabase.co/", "anon", 10);
        assert_eq!(
            store.table_url("report_results"),
            "https://proj.supabase.co/rest/v1/report_results"
        );
    }

    #[test]
    fn report_record_serializes_for_postgrest() {
        let record = ReportRecord::ready("fp1", "AAPL", "text", vec!["c1".into()], "h1");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["fingerprint"], "fp1");
        assert_eq!(json["status"], "ready");
        assert_eq!(json["citations"][0], "c1");
    }
}

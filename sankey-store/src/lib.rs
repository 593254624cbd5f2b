//! Persistence and caching for the fin.sankey report service.
//!
//! This crate provides:
//! - Record types for report results and the delivery audit trail
//! - The `ReportStore` trait with Supabase (PostgREST) and in-memory
//!   backends
//! - The optional Redis report cache

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod cache;
pub mod memory;
pub mod supabase;
pub mod traits;
pub mod types;

pub use cache::ReportCache;
pub use memory::MemoryStore;
pub use supabase::SupabaseStore;
pub use traits::{ReportStore, StoreError, StoreResult};
pub use types::{
    CacheEntry, DeliveryOutcome, DeliveryRecord, ReportRecord, ReportStatus, RequestRecord,
    UsageRecord,
};

use sankey_common::config::PersistenceConfig;
use std::sync::Arc;
use tracing::warn;

/// Build the configured store backend.
///
/// Falls back to the in-memory store when persistence is unconfigured —
/// the pipeline keeps working, results just don't survive a restart.
pub fn create_store(config: &PersistenceConfig) -> Arc<dyn ReportStore> {
    match SupabaseStore::from_config(config) {
        Some(store) => Arc::new(store),
        None => {
            warn!("Persistence not configured, report durability is degraded to process lifetime");
            Arc::new(MemoryStore::new())
        }
    }
}

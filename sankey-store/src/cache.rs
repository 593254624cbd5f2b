//! Redis-backed report cache.
//!
//! The cache is a pure optimization: it may be disabled by configuration,
//! and any backend failure (connect, get, put, decode) degrades to a miss.
//! No correctness property depends on it, so errors are logged and
//! swallowed here instead of being surfaced to the pipeline.

use crate::types::CacheEntry;
use redis::aio::ConnectionManager;
use sankey_common::config::CacheConfig;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const KEY_PREFIX: &str = "finsankey:report:";

struct RedisBackend {
    client: redis::Client,
    /// Lazily established; retried on the next operation after a failure.
    conn: RwLock<Option<ConnectionManager>>,
}

/// Report cache over an optional Redis backend.
pub struct ReportCache {
    backend: Option<RedisBackend>,
    ttl_secs: u64,
}

impl ReportCache {
    /// Cache with no backend; every get is a miss, every put a no-op.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            ttl_secs: 0,
        }
    }

    /// Build a cache from configuration. A missing URL or an invalid URL
    /// yields a disabled cache rather than an error.
    pub fn from_config(config: &CacheConfig) -> Self {
        let Some(url) = config.url.as_deref() else {
            info!("Report cache disabled (no cache URL configured)");
            return Self::disabled();
        };

        match redis::Client::open(url) {
            Ok(client) => Self {
                backend: Some(RedisBackend {
                    client,
                    conn: RwLock::new(None),
                }),
                ttl_secs: config.ttl_secs,
            },
            Err(e) => {
                warn!(error = %e, "Invalid cache URL, running without cache");
                Self::disabled()
            }
        }
    }

    /// Whether a backend is configured.
    pub const fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    fn key(fingerprint: &str) -> String {
        format!("{KEY_PREFIX}{fingerprint}")
    }

    /// Get or establish the shared connection.
    async fn connection(backend: &RedisBackend) -> Option<ConnectionManager> {
        {
            let guard = backend.conn.read().await;
            if let Some(conn) = guard.as_ref() {
                return Some(conn.clone());
            }
        }

        match backend.client.get_connection_manager().await {
            Ok(conn) => {
                let mut guard = backend.conn.write().await;
                *guard = Some(conn.clone());
                Some(conn)
            }
            Err(e) => {
                debug!(error = %e, "Cache connection failed, treating as miss");
                None
            }
        }
    }

    /// Look up a cached report. Any failure is a miss.
    pub async fn get(&self, fingerprint: &str) -> Option<CacheEntry> {
        let backend = self.backend.as_ref()?;
        let mut conn = Self::connection(backend).await?;

        let payload: Option<String> = match redis::cmd("GET")
            .arg(Self::key(fingerprint))
            .query_async(&mut conn)
            .await
        {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, fingerprint, "Cache get failed, treating as miss");
                return None;
            }
        };

        let payload = payload?;
        match serde_json::from_str::<CacheEntry>(&payload) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, fingerprint, "Discarding undecodable cache entry");
                None
            }
        }
    }

    /// Store a report with the configured TTL. Failures are logged and
    /// dropped.
    pub async fn put(&self, entry: &CacheEntry) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        let Some(mut conn) = Self::connection(backend).await else {
            return;
        };

        let payload = match serde_json::to_string(entry) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "Failed to encode cache entry");
                return;
            }
        };

        let result: Result<(), redis::RedisError> = redis::cmd("SET")
            .arg(Self::key(&entry.fingerprint))
            .arg(payload)
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut conn)
            .await;

        if let Err(e) = result {
            debug!(error = %e, fingerprint = %entry.fingerprint, "Cache put failed");
        } else {
            debug!(fingerprint = %entry.fingerprint, ttl_secs = self.ttl_secs, "Report cached");
        }
    }
}

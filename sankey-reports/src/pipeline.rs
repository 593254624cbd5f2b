//! Report generation pipeline.
//!
//! Coordinates cache lookup, single-flight generation, persistence, and
//! delivery:
//!
//! ```text
//! request → fingerprint → cache? → lock(fingerprint) → store? → model
//!                                                         │
//!                        deliver ← cache fill ← persist ←─┘
//! ```
//!
//! Invariants:
//! - at most one in-flight model call per fingerprint in this process;
//!   concurrent callers wait on the per-fingerprint lock and reuse the
//!   winner's result
//! - persistence and delivery failures degrade the outcome, they never
//!   invalidate a generated report
//! - every exit path, including caller-deadline cancellation, releases
//!   the generation lock (guards are scoped, cancellation drops them)

use crate::ai::{GeneratedReport, ModelError, ReportModel};
use crate::fingerprint::{report_fingerprint, snapshot_hash};
use crate::prompt::build_report_prompt;
use crate::quota::QuotaManager;
use crate::snapshot::{FinancialSnapshot, ReportParameters};
use sankey_common::config::ReliabilityConfig;
use sankey_notify::{template, DeliveryReceipt, Dispatcher, Email};
use sankey_store::{CacheEntry, ReportCache, ReportRecord, ReportStore, RequestRecord};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Pipeline error taxonomy. Only generation failures invalidate a call;
/// persistence and delivery problems ride on the Ok path as degradations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The model call (or the whole request, via the caller deadline)
    /// exceeded its time budget.
    #[error("Report generation timed out")]
    Timeout,

    /// The completion provider rejected the input; retrying the same
    /// request cannot succeed.
    #[error("Report generation rejected: {0}")]
    Rejected(String),

    /// The completion provider throttled us.
    #[error("Rate limited by completion provider, retry later")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Provider-side or transport failure.
    #[error("Completion provider failed: {0}")]
    Upstream(String),

    /// The requester's monthly allowance is exhausted.
    #[error("Monthly report quota exceeded ({used}/{limit})")]
    QuotaExceeded { used: u32, limit: u32 },
}

impl From<PipelineError> for sankey_common::Error {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Timeout => Self::Timeout,
            PipelineError::Rejected(msg) => Self::InvalidInput(msg),
            PipelineError::RateLimited { .. } => {
                Self::RateLimited("completion provider throttled the request".into())
            }
            PipelineError::QuotaExceeded { used, limit } => {
                Self::QuotaExceeded(format!("{used}/{limit} reports this month"))
            }
            PipelineError::Upstream(msg) => Self::External(msg),
        }
    }
}

impl PipelineError {
    fn from_model(err: ModelError) -> Self {
        match err {
            ModelError::Timeout => Self::Timeout,
            ModelError::RateLimited { retry_after_secs } => Self::RateLimited { retry_after_secs },
            ModelError::InvalidInput(msg) => Self::Rejected(msg),
            ModelError::Upstream { status, message } => {
                Self::Upstream(format!("status {status}: {message}"))
            }
            ModelError::Network(msg) => Self::Upstream(msg),
        }
    }

    /// Short classification stored on failed report records.
    const fn classification(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Rejected(_) => "rejected",
            Self::RateLimited { .. } => "rate_limited",
            Self::Upstream(_) => "upstream",
            Self::QuotaExceeded { .. } => "quota_exceeded",
        }
    }
}

/// One report generation request.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub snapshot: FinancialSnapshot,
    pub parameters: ReportParameters,
    /// Requester identity for quota accounting.
    pub requester_id: String,
    /// Subscription tier of the requester.
    pub tier: String,
    /// Email the finished report to this address, when set.
    pub recipient: Option<String>,
    /// Opt into bounded retry with exponential backoff for the model call.
    pub retry: bool,
    /// Overall deadline for the call; the generation lock is released on
    /// expiry.
    pub deadline: Option<Duration>,
}

impl GenerateRequest {
    pub fn new(snapshot: FinancialSnapshot, requester_id: impl Into<String>) -> Self {
        Self {
            snapshot,
            parameters: ReportParameters::default(),
            requester_id: requester_id.into(),
            tier: "free".into(),
            recipient: None,
            retry: false,
            deadline: None,
        }
    }
}

/// Result of a pipeline call: the record plus degradation flags.
#[derive(Debug, Clone)]
pub struct ReportOutcome {
    pub report: ReportRecord,
    /// The content came from cache or an earlier persisted generation;
    /// no model call was made.
    pub from_cache: bool,
    /// Whether this call durably saved the record. False for reused
    /// results (nothing new to save) and for degraded persistence.
    pub persisted: bool,
    /// Delivery receipt when a recipient was requested.
    pub delivery: Option<DeliveryReceipt>,
}

/// The report generation orchestrator.
///
/// All collaborators are injected behind narrow traits, so the pipeline is
/// testable with substitute adapters; nothing here reaches for ambient
/// singletons.
pub struct ReportPipeline {
    model: Arc<dyn ReportModel>,
    store: Arc<dyn ReportStore>,
    cache: ReportCache,
    dispatcher: Dispatcher,
    quota: QuotaManager,
    retry_policy: ReliabilityConfig,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ReportPipeline {
    pub fn new(
        model: Arc<dyn ReportModel>,
        store: Arc<dyn ReportStore>,
        cache: ReportCache,
        dispatcher: Dispatcher,
        quota: QuotaManager,
        retry_policy: ReliabilityConfig,
    ) -> Self {
        Self {
            model,
            store,
            cache,
            dispatcher,
            quota,
            retry_policy,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Compute the fingerprint for a request without running it.
    pub fn fingerprint(request: &GenerateRequest) -> String {
        report_fingerprint(&request.snapshot, &request.parameters)
    }

    /// Generate (or reuse) the report for a request.
    pub async fn generate(&self, request: GenerateRequest) -> Result<ReportOutcome, PipelineError> {
        let fingerprint = Self::fingerprint(&request);

        match request.deadline {
            Some(deadline) => {
                match tokio::time::timeout(deadline, self.generate_inner(&request, &fingerprint))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => {
                        // The inner future is dropped here, which releases
                        // the generation lock if it was held.
                        warn!(%fingerprint, ?deadline, "Caller deadline expired, aborting generation");
                        Err(PipelineError::Timeout)
                    }
                }
            }
            None => self.generate_inner(&request, &fingerprint).await,
        }
    }

    async fn generate_inner(
        &self,
        request: &GenerateRequest,
        fingerprint: &str,
    ) -> Result<ReportOutcome, PipelineError> {
        let ticker = request.snapshot.ticker_key();

        // Fast path: unexpired cache entry, no side effects beyond
        // delivery (which is itself idempotent per recipient).
        if let Some(entry) = self.cache.get(fingerprint).await {
            debug!(%fingerprint, %ticker, "Cache hit");
            return Ok(self.reuse(request, fingerprint, entry_to_record(&ticker, request, entry)).await);
        }

        // Record the inbound request (best-effort; the cache fast path
        // above stays side-effect-free).
        let request_record = RequestRecord::new(fingerprint, request.requester_id.as_str());
        if let Err(e) = self.store.record_request(&request_record).await {
            debug!(error = %e, %fingerprint, "Failed to record report request");
        }

        let decision = self.quota.check(&request.requester_id, &request.tier).await;
        if !decision.allowed {
            return Err(PipelineError::QuotaExceeded {
                used: decision.used,
                limit: decision.limit.unwrap_or(0),
            });
        }

        // Single-flight: one model call per fingerprint. Waiters block
        // here and find the winner's result in the re-check below.
        let lock = self.fingerprint_lock(fingerprint).await;
        let guard = lock.lock().await;

        // Re-check both layers now that we hold the lock; a concurrent
        // winner has already filled them.
        if let Some(entry) = self.cache.get(fingerprint).await {
            drop(guard);
            debug!(%fingerprint, "Cache filled while waiting for generation lock");
            return Ok(self.reuse(request, fingerprint, entry_to_record(&ticker, request, entry)).await);
        }
        match self.store.find_report(fingerprint).await {
            Ok(Some(record)) if record.is_ready() => {
                drop(guard);
                debug!(%fingerprint, "Reusing persisted report");
                return Ok(self.reuse(request, fingerprint, record).await);
            }
            Ok(_) => {}
            Err(e) => {
                // Store down: proceed to generate; persistence will be
                // reported as degraded below.
                debug!(error = %e, %fingerprint, "Store lookup failed before generation");
            }
        }

        let prompt = build_report_prompt(&request.snapshot, &request.parameters);
        let hash = snapshot_hash(&request.snapshot);

        let generated = match self.call_model(&prompt, request.retry).await {
            Ok(generated) => generated,
            Err(model_err) => {
                let err = PipelineError::from_model(model_err);
                let failed =
                    ReportRecord::failed(fingerprint, &ticker, &hash, err.classification());
                if let Err(save_err) = self.store.save_report(&failed).await {
                    warn!(error = %save_err, %fingerprint, "Failed to persist failed report record");
                }
                drop(guard);
                self.release_lock(fingerprint, &lock).await;
                return Err(err);
            }
        };

        info!(
            %fingerprint,
            %ticker,
            model = %generated.model,
            latency_ms = generated.latency_ms,
            citations = generated.citations.len(),
            "Report generated"
        );

        self.quota.record(&request.requester_id).await;

        let record = ReportRecord::ready(
            fingerprint,
            &ticker,
            generated.content,
            generated.citations,
            &hash,
        );

        let persisted = match self.store.save_report(&record).await {
            Ok(()) => true,
            Err(e) => {
                // Degraded mode: the caller still gets the in-memory
                // result, durability just wasn't achieved.
                warn!(error = %e, %fingerprint, "Report persistence failed, returning unpersisted result");
                false
            }
        };

        self.cache
            .put(&CacheEntry::new(
                fingerprint,
                record.content.clone(),
                record.citations.clone(),
            ))
            .await;

        drop(guard);
        self.release_lock(fingerprint, &lock).await;

        let delivery = self.deliver(request, fingerprint, &record).await;

        Ok(ReportOutcome {
            report: record,
            from_cache: false,
            persisted,
            delivery,
        })
    }

    /// Model call with optional bounded retry (exponential backoff).
    async fn call_model(&self, prompt: &str, retry: bool) -> Result<GeneratedReport, ModelError> {
        let max_attempts = if retry {
            self.retry_policy.max_attempts.max(1)
        } else {
            1
        };

        let mut attempt = 0;
        loop {
            match self.model.generate(prompt).await {
                Ok(generated) => {
                    if attempt > 0 {
                        info!(attempt = attempt + 1, "Completion recovered after retries");
                    }
                    return Ok(generated);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_attempts || !e.is_retryable() {
                        return Err(e);
                    }
                    let delay = self.backoff_delay(attempt - 1);
                    warn!(
                        error = %e,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Completion call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Backoff for a given retry attempt (0-based).
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .retry_policy
            .base_backoff_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(self.retry_policy.max_backoff_ms);
        Duration::from_millis(delay_ms)
    }

    /// Wrap up a reused (cached or persisted) result: no model call, no
    /// quota charge, delivery only if requested.
    async fn reuse(
        &self,
        request: &GenerateRequest,
        fingerprint: &str,
        record: ReportRecord,
    ) -> ReportOutcome {
        let delivery = self.deliver(request, fingerprint, &record).await;
        ReportOutcome {
            report: record,
            from_cache: true,
            persisted: false,
            delivery,
        }
    }

    async fn deliver(
        &self,
        request: &GenerateRequest,
        fingerprint: &str,
        record: &ReportRecord,
    ) -> Option<DeliveryReceipt> {
        let recipient = request.recipient.as_deref()?;
        if !record.is_ready() {
            return None;
        }

        let email = Email {
            to: recipient.to_string(),
            subject: template::report_subject(&record.ticker),
            html_body: template::report_body(&record.ticker, &record.content, &record.citations),
        };

        let receipt = self.dispatcher.deliver(fingerprint, recipient, &email).await;
        if !receipt.delivered {
            // Non-fatal: the report itself is still valid.
            warn!(
                %fingerprint,
                recipient,
                error = receipt.error.as_deref().unwrap_or("unknown"),
                "Report delivery failed"
            );
        }
        Some(receipt)
    }

    async fn fingerprint_lock(&self, fingerprint: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        // Drop lock slots nobody references anymore (including slots
        // orphaned by deadline-aborted calls).
        locks.retain(|_, slot| Arc::strong_count(slot) > 1);
        locks
            .entry(fingerprint.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn release_lock(&self, fingerprint: &str, lock: &Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // Map + our clone: nobody is waiting, the slot can go.
        if Arc::strong_count(lock) <= 2 {
            locks.remove(fingerprint);
        }
    }

    /// Number of live generation lock slots, for tests.
    pub async fn lock_slots(&self) -> usize {
        self.locks.lock().await.len()
    }
}

fn entry_to_record(ticker: &str, request: &GenerateRequest, entry: CacheEntry) -> ReportRecord {
    let mut record = ReportRecord::ready(
        entry.fingerprint.clone(),
        ticker,
        entry.content,
        entry.citations,
        snapshot_hash(&request.snapshot),
    );
    record.generated_at = entry.cached_at;
    record
}

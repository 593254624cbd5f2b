//! AI report generation and delivery pipeline for fin.sankey.
//!
//! This crate orchestrates the report flow behind the financial-flow
//! dashboard:
//!
//! ```text
//! Dashboard → POST /api/v1/reports → ReportPipeline
//!                                        │
//!             Redis cache ◄── fingerprint ┤
//!             Perplexity  ◄── on miss ────┤
//!             Supabase    ◄── persist ────┤
//!             Mail chain  ◄── deliver ────┘
//! ```
//!
//! The cache and every mail provider are optional; the pipeline degrades
//! instead of failing when they are absent.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod ai;
pub mod fingerprint;
pub mod pipeline;
pub mod prompt;
pub mod quota;
pub mod routes;
pub mod snapshot;

// Re-export commonly used types
pub use ai::{GeneratedReport, ModelError, ModelResult, PerplexityClient, ReportModel};
pub use fingerprint::{report_fingerprint, snapshot_hash, PROMPT_TEMPLATE_VERSION};
pub use pipeline::{GenerateRequest, PipelineError, ReportOutcome, ReportPipeline};
pub use prompt::build_report_prompt;
pub use quota::{QuotaDecision, QuotaManager};
pub use routes::{build_router, ReportsState};
pub use snapshot::{FinancialSnapshot, ReportParameters};

use sankey_common::config::Config;
use sankey_notify::Dispatcher;
use sankey_store::{create_store, ReportCache};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Build the pipeline and router from configuration.
pub fn build_reports_router(config: &Config) -> (axum::Router, Arc<ReportsState>) {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let store = create_store(&config.persistence);
    let cache = ReportCache::from_config(&config.cache);
    let dispatcher = Dispatcher::from_config(&config.mail, store.clone());
    let quota = QuotaManager::new(store.clone(), config.tiers.clone());
    let model = Arc::new(PerplexityClient::new(
        config.api_keys.perplexity.as_deref(),
        &config.reports,
    ));

    let pipeline = Arc::new(ReportPipeline::new(
        model,
        store.clone(),
        cache,
        dispatcher,
        quota,
        config.reliability.clone(),
    ));

    let state = Arc::new(ReportsState {
        pipeline,
        store,
    });

    let router = build_router(state.clone()).layer(cors);
    (router, state)
}

/// Start the report HTTP server.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr = SocketAddr::from((
        config.network.bind.parse::<std::net::IpAddr>()?,
        config.service.port,
    ));

    let (router, _state) = build_reports_router(config);

    tracing::info!("Starting fin.sankey report service on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

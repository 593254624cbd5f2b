//! Configuration management for the fin.sankey report service.
//!
//! Configuration lives in a single JSON file at `~/.finsankey/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Explicit config file values
//! 2. Environment variables
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! ## Service
//! - `FINSANKEY_PORT` → service.port
//! - `FINSANKEY_BIND_ADDRESS` → network.bind
//! - `FINSANKEY_LOG_LEVEL` → observability.log_level
//!
//! ## Providers
//! - `PERPLEXITY_API_KEY` → api_keys.perplexity
//! - `SUPABASE_URL` / `SUPABASE_ANON_KEY` → persistence.url / persistence.anon_key
//! - `REDIS_URL` → cache.url
//! - `SENDGRID_API_KEY` / `RESEND_API_KEY` → mail.sendgrid_api_key / mail.resend_api_key
//! - `SMTP_HOST` / `SMTP_PORT` / `SMTP_USER` / `SMTP_PASSWORD` → mail.smtp.*
//! - `MAIL_FROM` / `MAIL_FROM_NAME` → mail.from_address / mail.from_name
//!
//! Optional providers (cache, any single mail backend) may be absent; the
//! pipeline degrades instead of failing to start.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".finsankey"),
        |dirs| dirs.home_dir().join(".finsankey"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Network Configuration
// ============================================================================

/// Global network configuration.
///
/// Controls the bind address for the service. Default is `127.0.0.1`
/// (local only). Set to `0.0.0.0` to allow remote access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address for the service.
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Public URL for links in outgoing emails (optional).
    #[serde(default)]
    pub public_url: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            public_url: None,
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

/// Service port configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Port number for the report service.
    #[serde(default = "default_service_port")]
    pub port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: default_service_port(),
        }
    }
}

fn default_service_port() -> u16 {
    8090
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// API Keys
// ============================================================================

/// External API keys.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiKeysConfig {
    /// Perplexity API key for AI report generation.
    #[serde(default)]
    pub perplexity: Option<String>,
}

// ============================================================================
// Report Generation Configuration
// ============================================================================

/// AI report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportsConfig {
    /// Model identifier sent to the completion API.
    #[serde(default = "default_report_model")]
    pub model: String,

    /// Maximum tokens to generate per report.
    #[serde(default = "default_report_max_tokens")]
    pub max_tokens: i64,

    /// Request timeout for a single completion call, in seconds.
    #[serde(default = "default_report_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Report language code embedded in the prompt (en, pl).
    #[serde(default = "default_report_language")]
    pub language: String,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            model: default_report_model(),
            max_tokens: default_report_max_tokens(),
            request_timeout_secs: default_report_timeout_secs(),
            language: default_report_language(),
        }
    }
}

fn default_report_model() -> String {
    "sonar".into()
}

fn default_report_max_tokens() -> i64 {
    4000
}

fn default_report_timeout_secs() -> u64 {
    120
}

fn default_report_language() -> String {
    "en".into()
}

// ============================================================================
// Reliability Configuration
// ============================================================================

/// Retry policy applied to the completion call when a caller opts in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    /// Maximum attempts per generation (initial call + retries).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay in milliseconds (doubles with each retry).
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

// ============================================================================
// Cache Configuration
// ============================================================================

/// Report cache configuration (Redis-compatible, optional).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Redis URL (redis://host:port). Absent = caching disabled.
    #[serde(default)]
    pub url: Option<String>,

    /// Entry TTL in seconds. Default: 24 hours.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: None,
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_cache_ttl_secs() -> u64 {
    86_400
}

// ============================================================================
// Persistence Configuration
// ============================================================================

/// Durable store configuration (Supabase/PostgREST-compatible).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Supabase project URL. Absent = in-memory store (degraded durability).
    #[serde(default)]
    pub url: Option<String>,

    /// Supabase anon key.
    #[serde(default)]
    pub anon_key: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_persistence_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            timeout_secs: default_persistence_timeout_secs(),
        }
    }
}

fn default_persistence_timeout_secs() -> u64 {
    10
}

// ============================================================================
// Mail Configuration
// ============================================================================

/// SMTP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// SMTP server hostname
    pub host: String,
    /// SMTP server port (default: 587 for STARTTLS)
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// Use STARTTLS (default: true)
    #[serde(default = "default_true")]
    pub starttls: bool,
    /// SMTP username for authentication
    pub username: String,
    /// SMTP password for authentication
    pub password: String,
}

fn default_smtp_port() -> u16 {
    587
}

/// Outbound mail configuration.
///
/// Any individual provider may be unconfigured; the dispatcher builds its
/// chain from whichever providers have credentials, in `provider_order`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Provider order for delivery attempts.
    #[serde(default = "default_provider_order")]
    pub provider_order: Vec<String>,

    /// From address for outgoing emails.
    #[serde(default = "default_from_address")]
    pub from_address: String,

    /// Display name for the from address.
    #[serde(default = "default_from_name")]
    pub from_name: String,

    /// SendGrid API key.
    #[serde(default)]
    pub sendgrid_api_key: Option<String>,

    /// Resend API key.
    #[serde(default)]
    pub resend_api_key: Option<String>,

    /// SMTP transport settings.
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            provider_order: default_provider_order(),
            from_address: default_from_address(),
            from_name: default_from_name(),
            sendgrid_api_key: None,
            resend_api_key: None,
            smtp: None,
        }
    }
}

fn default_provider_order() -> Vec<String> {
    vec!["sendgrid".into(), "resend".into(), "smtp".into()]
}

fn default_from_address() -> String {
    "alerts@fin-sankey.com".into()
}

fn default_from_name() -> String {
    "fin.sankey Alerts".into()
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Tier Limits
// ============================================================================

/// Per-tier usage allowances. `None` means unlimited.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TierLimits {
    /// AI reports a requester may generate per calendar month.
    #[serde(default)]
    pub ai_reports_per_month: Option<u32>,
}

/// Subscription tier allowances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TiersConfig {
    #[serde(default = "default_free_tier")]
    pub free: TierLimits,
    #[serde(default = "default_pro_tier")]
    pub pro: TierLimits,
    #[serde(default)]
    pub enterprise: TierLimits,
}

impl Default for TiersConfig {
    fn default() -> Self {
        Self {
            free: default_free_tier(),
            pro: default_pro_tier(),
            enterprise: TierLimits::default(),
        }
    }
}

impl TiersConfig {
    /// Look up the limits for a tier name. Unknown tiers get free limits.
    pub fn for_tier(&self, tier: &str) -> &TierLimits {
        match tier {
            "pro" => &self.pro,
            "enterprise" => &self.enterprise,
            _ => &self.free,
        }
    }
}

fn default_free_tier() -> TierLimits {
    TierLimits {
        ai_reports_per_month: Some(3),
    }
}

fn default_pro_tier() -> TierLimits {
    TierLimits {
        ai_reports_per_month: Some(30),
    }
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration for the report service.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub api_keys: ApiKeysConfig,

    #[serde(default)]
    pub reports: ReportsConfig,

    #[serde(default)]
    pub reliability: ReliabilityConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub mail: MailConfig,

    #[serde(default)]
    pub tiers: TiersConfig,
}

impl Config {
    /// Load configuration from the default path, then apply env overrides.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if path.exists() {
            let mut config = Self::load_from(&path)?;
            config.apply_env();
            Ok(config)
        } else {
            let mut config = Self::default();
            config.apply_env();
            Ok(config)
        }
    }

    /// Load configuration from a specific file (no env overrides).
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Apply environment variable overrides in place.
    pub fn apply_env(&mut self) {
        if let Ok(port) = std::env::var("FINSANKEY_PORT") {
            if let Ok(p) = port.parse() {
                self.service.port = p;
            }
        }

        if let Ok(bind) = std::env::var("FINSANKEY_BIND_ADDRESS") {
            self.network.bind = bind;
        }

        if let Ok(level) = std::env::var("FINSANKEY_LOG_LEVEL") {
            self.observability.log_level = level;
        }

        if let Ok(key) = std::env::var("PERPLEXITY_API_KEY") {
            self.api_keys.perplexity = Some(key);
        }

        if let Ok(url) = std::env::var("SUPABASE_URL") {
            self.persistence.url = Some(url);
        }
        if let Ok(key) = std::env::var("SUPABASE_ANON_KEY") {
            self.persistence.anon_key = Some(key);
        }

        if let Ok(url) = std::env::var("REDIS_URL") {
            self.cache.url = Some(url);
        }

        if let Ok(key) = std::env::var("SENDGRID_API_KEY") {
            self.mail.sendgrid_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("RESEND_API_KEY") {
            self.mail.resend_api_key = Some(key);
        }

        if let Ok(host) = std::env::var("SMTP_HOST") {
            let port = std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or_else(default_smtp_port);
            let username = std::env::var("SMTP_USER").unwrap_or_default();
            let password = std::env::var("SMTP_PASSWORD").unwrap_or_default();
            self.mail.smtp = Some(SmtpConfig {
                host,
                port,
                starttls: true,
                username,
                password,
            });
        }

        if let Ok(from) = std::env::var("MAIL_FROM") {
            self.mail.from_address = from;
        }
        if let Ok(name) = std::env::var("MAIL_FROM_NAME") {
            self.mail.from_name = name;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_degraded_but_valid() {
        let config = Config::default();
        assert!(config.cache.url.is_none());
        assert!(config.persistence.url.is_none());
        assert!(config.api_keys.perplexity.is_none());
        assert_eq!(config.service.port, 8090);
        assert_eq!(config.network.bind, "127.0.0.1");
    }

    #[test]
    fn report_defaults_match_deployment_guide() {
        let reports = ReportsConfig::default();
        assert_eq!(reports.model, "sonar");
        assert_eq!(reports.max_tokens, 4000);
        assert_eq!(reports.language, "en");

        let cache = CacheConfig::default();
        assert_eq!(cache.ttl_secs, 86_400);
    }

    #[test]
    fn tier_limits_defaults() {
        let tiers = TiersConfig::default();
        assert_eq!(tiers.for_tier("free").ai_reports_per_month, Some(3));
        assert_eq!(tiers.for_tier("pro").ai_reports_per_month, Some(30));
        assert_eq!(tiers.for_tier("enterprise").ai_reports_per_month, None);
        // Unknown tiers are clamped to free
        assert_eq!(tiers.for_tier("byzantine").ai_reports_per_month, Some(3));
    }

    #[test]
    fn partial_config_file_fills_defaults() {
        let json = r#"{
            "service": { "port": 9000 },
            "mail": { "sendgrid_api_key": "sg-test" }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.service.port, 9000);
        assert_eq!(config.mail.sendgrid_api_key.as_deref(), Some("sg-test"));
        // Untouched sections get defaults
        assert_eq!(config.reports.model, "sonar");
        assert_eq!(
            config.mail.provider_order,
            vec!["sendgrid", "resend", "smtp"]
        );
        assert_eq!(config.mail.from_address, "alerts@fin-sankey.com");
    }

    #[test]
    fn load_from_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::default();
        config.service.port = 9123;
        config.cache.url = Some("redis://127.0.0.1:6379".into());
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.service.port, 9123);
        assert_eq!(loaded.cache.url.as_deref(), Some("redis://127.0.0.1:6379"));
    }

    #[test]
    fn smtp_config_defaults() {
        let json = r#"{
            "host": "smtp.example.com",
            "username": "u",
            "password": "p"
        }"#;
        let smtp: SmtpConfig = serde_json::from_str(json).unwrap();
        assert_eq!(smtp.port, 587);
        assert!(smtp.starttls);
    }
}

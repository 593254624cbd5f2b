//! Deterministic request fingerprinting.
//!
//! The fingerprint is the idempotency key for the whole pipeline: equal
//! (snapshot, parameters) always hash to the same value, across calls and
//! processes. No randomness, no wall clock — only the canonical field
//! encoding below feeds the hash. The prompt template version participates
//! so that template changes invalidate cached reports.

use crate::snapshot::{FinancialSnapshot, ReportParameters};
use sha2::{Digest, Sha256};

/// Bumped whenever the report prompt structure changes.
pub const PROMPT_TEMPLATE_VERSION: &str = "equity-research-v2";

/// Unit separator keeps field boundaries unambiguous in the encoding.
const SEP: char = '\u{1f}';

fn push_field(buf: &mut String, value: &str) {
    buf.push_str(value);
    buf.push(SEP);
}

fn opt_f64(value: Option<f64>) -> String {
    value.map_or_else(|| "none".to_string(), |v| v.to_string())
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash of the snapshot data itself, recorded on every report so a stored
/// result can be traced back to the exact inputs it was generated from.
pub fn snapshot_hash(snapshot: &FinancialSnapshot) -> String {
    let mut buf = String::new();
    push_field(&mut buf, &snapshot.ticker_key());
    push_field(&mut buf, &snapshot.currency);
    push_field(&mut buf, &snapshot.revenue.to_string());
    push_field(&mut buf, &snapshot.net_income.to_string());
    push_field(&mut buf, &snapshot.gross_profit.to_string());
    push_field(&mut buf, &opt_f64(snapshot.current_price));
    push_field(&mut buf, &opt_f64(snapshot.trailing_pe));
    push_field(&mut buf, &opt_f64(snapshot.debt_to_equity));
    push_field(&mut buf, &opt_f64(snapshot.peg_ratio));
    push_field(&mut buf, snapshot.period_label.as_deref().unwrap_or("none"));
    sha256_hex(&buf)
}

/// Fingerprint identifying a unique report request.
///
/// Covers snapshot identity, caller parameters, and the prompt template
/// version.
pub fn report_fingerprint(snapshot: &FinancialSnapshot, params: &ReportParameters) -> String {
    let mut buf = String::new();
    push_field(&mut buf, PROMPT_TEMPLATE_VERSION);
    push_field(&mut buf, &snapshot_hash(snapshot));
    push_field(&mut buf, params.language.as_deref().unwrap_or("default"));
    push_field(&mut buf, params.model.as_deref().unwrap_or("default"));
    sha256_hex(&buf)
}

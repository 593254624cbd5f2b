//! Financial snapshot and report parameter types.
//!
//! A snapshot is the slice of fundamentals a report is generated from; it
//! arrives from the dashboard's income-statement extraction and is treated
//! as opaque input here.

use serde::{Deserialize, Serialize};

/// Fundamentals for one ticker and reporting period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialSnapshot {
    /// Ticker symbol the snapshot belongs to.
    pub ticker: String,

    /// Reporting currency (USD, EUR, ...).
    #[serde(default = "default_currency")]
    pub currency: String,

    /// LTM revenue.
    pub revenue: f64,

    /// LTM net income.
    pub net_income: f64,

    /// LTM gross profit.
    pub gross_profit: f64,

    /// Last traded price, when the market feed had one.
    #[serde(default)]
    pub current_price: Option<f64>,

    /// Trailing P/E ratio.
    #[serde(default)]
    pub trailing_pe: Option<f64>,

    /// Debt-to-equity ratio.
    #[serde(default)]
    pub debt_to_equity: Option<f64>,

    /// PEG ratio.
    #[serde(default)]
    pub peg_ratio: Option<f64>,

    /// Reporting period label (e.g., "2026-Q2").
    #[serde(default)]
    pub period_label: Option<String>,
}

impl FinancialSnapshot {
    /// Canonical ticker form used for identity and cache keys.
    pub fn ticker_key(&self) -> String {
        self.ticker.trim().to_uppercase()
    }

    /// Gross margin in percent; zero-revenue snapshots yield 0 instead of
    /// dividing by zero.
    pub fn gross_margin_pct(&self) -> f64 {
        if self.revenue != 0.0 {
            self.gross_profit / self.revenue * 100.0
        } else {
            0.0
        }
    }
}

fn default_currency() -> String {
    "USD".into()
}

/// Caller-supplied report generation parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportParameters {
    /// Report language code. Empty means the configured default.
    #[serde(default)]
    pub language: Option<String>,

    /// Model override; absent means the configured default model.
    #[serde(default)]
    pub model: Option<String>,
}

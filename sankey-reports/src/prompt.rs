//! Equity research prompt builder.
//!
//! Produces the instruction prompt sent to the completion API. The
//! structure is fixed — the fingerprint ties cached reports to
//! `PROMPT_TEMPLATE_VERSION`, so any change to the section layout here
//! must bump that constant in `fingerprint.rs`.

use crate::snapshot::{FinancialSnapshot, ReportParameters};

/// Format a monetary amount with thousands separators, no decimals.
fn format_amount(value: f64) -> String {
    let negative = value < 0.0;
    let whole = value.abs().round() as u64;
    let digits = whole.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if negative {
        format!("-{out}")
    } else {
        out
    }
}

fn opt_ratio(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{v:.2}"))
}

/// Build the report generation prompt for a snapshot.
pub fn build_report_prompt(snapshot: &FinancialSnapshot, params: &ReportParameters) -> String {
    let ticker = snapshot.ticker_key();
    let currency = &snapshot.currency;
    let language = params.language.as_deref().unwrap_or("en");
    let language_name = match language {
        "pl" => "Polish",
        _ => "English",
    };
    let current_price = snapshot.current_price.unwrap_or(0.0);

    format!(
        r#"Prepare a comprehensive, professional EQUITY RESEARCH REPORT on {ticker}, written in {language_name}.

ROLE:
You are a Senior Equity Analyst at a Tier-1 investment bank. Your writing style must be institutional: concise, data-driven, focused on actionable investment conclusions rather than storytelling.

FUNDAMENTAL DATA (INPUT):

Revenue (LTM): {revenue} {currency}

Net Income (LTM): {net_income} {currency}

Gross Margin: {gross_margin:.2}%

P/E Ratio: {trailing_pe}

Debt/Equity: {debt_to_equity}

PEG Ratio: {peg_ratio}

REPORT STRUCTURE (keep the order and formatting exactly):

1. INVESTMENT THESIS

Masthead: open with a table of the key calls:

Rating (BUY / HOLD / SELL - highlighted)

Price Target

Current Price {current_price:.2} {currency}

Implied Upside/Downside (%)

Risk Profile (e.g. High/Medium)

Investment Thesis: the most important section. Do not write an "introduction" - state the main arguments for the recommendation immediately. Why now? What has the market missed? (Max 3-4 strong paragraphs.)

Catalyst Watch: a short dated list (upcoming results, regulatory decisions, product launches) that could move the stock within the next 6 months.

2. FINANCIAL ESTIMATES & SUMMARY

Instead of a wall of text, build a "Financial Summary Estimates" Markdown table projecting three forward years (e.g. 2027E, 2028E, 2029E). Include: Revenue, EBITDA, EPS, P/E Ratio, FCF Yield.

Below the table, a short analyst comment on growth dynamics and operating leverage.

3. VALUATION

Methodology: use a hybrid approach (DCF + Multiples).

SOTP Table: if the company has distinct segments, you MUST build a sum-of-the-parts table valuing each segment separately (Segment A x Multiple + Segment B x Multiple = Enterprise Value). If SOTP does not fit, build a "Valuation Matrix" showing implied price across WACC and terminal growth assumptions.

Briefly justify the chosen multiples (why this P/E or EV/EBITDA?).

4. PRICE SCENARIOS (Bull / Base / Bear)
Present as a table or list with assigned probabilities:

Bull Case ($XXX): what has to go perfectly? (e.g. faster product adoption, margin expansion). Probability (e.g. 20%).

Base Case ($XXX): your central scenario. Probability (e.g. 50%).

Bear Case ($XXX): what goes wrong? (e.g. recession, customer loss). Probability (e.g. 30%).

5. KEY RISKS

Specific and bulleted (e.g. regulatory risk, customer concentration, currency risk). Avoid generic "market risk".

6. SEGMENT ANALYSIS

A short review of results per segment/geography.

Focus on profitability and trends (e.g. "Segment X grows 20% y/y but margins are compressing").

7. APPENDIX & DISCLOSURES

Close with a professional disclaimer: "For sophisticated investors only. This report is for educational purposes and does not constitute financial advice."

Analyst Certification: a statement that the views are the analyst's own.

TECHNICAL REQUIREMENTS:

Report language: {language_name} (professional financial vocabulary).

Formatting: use Markdown for tables, bold text, and headers.

Style: bottom-line up front. Use the active voice.

Do not quote verbatim; paraphrase and synthesize.
"#,
        revenue = format_amount(snapshot.revenue),
        net_income = format_amount(snapshot.net_income),
        gross_margin = snapshot.gross_margin_pct(),
        trailing_pe = opt_ratio(snapshot.trailing_pe),
        debt_to_equity = opt_ratio(snapshot.debt_to_equity),
        peg_ratio = opt_ratio(snapshot.peg_ratio),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FinancialSnapshot {
        FinancialSnapshot {
            ticker: "aapl".into(),
            currency: "USD".into(),
            revenue: 400_000_000_000.0,
            net_income: 100_000_000_000.0,
            gross_profit: 180_000_000_000.0,
            current_price: Some(220.5),
            trailing_pe: Some(34.2),
            debt_to_equity: None,
            peg_ratio: Some(2.1),
            period_label: Some("2026-Q2".into()),
        }
    }

    #[test]
    fn amount_formatting_groups_thousands() {
        assert_eq!(format_amount(400_000_000_000.0), "400,000,000,000");
        assert_eq!(format_amount(1234.0), "1,234");
        assert_eq!(format_amount(999.0), "999");
        assert_eq!(format_amount(-1234.0), "-1,234");
        assert_eq!(format_amount(0.0), "0");
    }

    #[test]
    fn prompt_is_deterministic() {
        let params = ReportParameters::default();
        assert_eq!(
            build_report_prompt(&sample(), &params),
            build_report_prompt(&sample(), &params)
        );
    }

    #[test]
    fn prompt_interpolates_fundamentals() {
        let prompt = build_report_prompt(&sample(), &ReportParameters::default());
        assert!(prompt.contains("EQUITY RESEARCH REPORT on AAPL"));
        assert!(prompt.contains("400,000,000,000 USD"));
        assert!(prompt.contains("Gross Margin: 45.00%"));
        assert!(prompt.contains("P/E Ratio: 34.20"));
        // Missing ratios degrade to N/A rather than 0
        assert!(prompt.contains("Debt/Equity: N/A"));
        assert!(prompt.contains("Current Price 220.50 USD"));
    }

    #[test]
    fn prompt_sections_are_present_in_order() {
        let prompt = build_report_prompt(&sample(), &ReportParameters::default());
        let sections = [
            "1. INVESTMENT THESIS",
            "2. FINANCIAL ESTIMATES & SUMMARY",
            "3. VALUATION",
            "4. PRICE SCENARIOS",
            "5. KEY RISKS",
            "6. SEGMENT ANALYSIS",
            "7. APPENDIX & DISCLOSURES",
        ];
        let mut last = 0;
        for section in sections {
            let pos = prompt.find(section).unwrap_or_else(|| panic!("missing {section}"));
            assert!(pos > last, "{section} out of order");
            last = pos;
        }
    }

    #[test]
    fn language_parameter_switches_instruction() {
        let polish = ReportParameters {
            language: Some("pl".into()),
            model: None,
        };
        let prompt = build_report_prompt(&sample(), &polish);
        assert!(prompt.contains("written in Polish"));
    }
}

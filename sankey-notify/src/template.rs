//! HTML template for report delivery emails.

/// Subject line for a report email.
pub fn report_subject(ticker: &str) -> String {
    format!("\u{1F4CA} AI Investment Report: {ticker}")
}

/// Render the report email body.
///
/// The report content arrives as markdown from the completion API; it is
/// escaped and shown with preserved line structure rather than re-rendered,
/// so provider output can never inject markup into the email.
pub fn report_body(ticker: &str, content: &str, citations: &[String]) -> String {
    let escaped = escape_html(content);
    let content_html = escaped.replace('\n', "<br>\n");

    let citations_html = if citations.is_empty() {
        String::new()
    } else {
        let mut list = String::from("<h3>Sources</h3>\n<ol>\n");
        for citation in citations {
            list.push_str(&format!("<li>{}</li>\n", escape_html(citation)));
        }
        list.push_str("</ol>\n");
        list
    };

    format!(
        r#"<html>
<body style="font-family: Arial, sans-serif; padding: 20px;">
    <h2 style="color: #1a73e8;">&#128202; AI Investment Report</h2>

    <div style="background: #f8f9fa; padding: 15px; border-radius: 8px; margin: 20px 0;">
        <h3 style="margin: 0;">{ticker}</h3>
    </div>

    <div style="line-height: 1.5;">
{content_html}
    </div>

    {citations_html}
    <hr style="border: none; border-top: 1px solid #eee; margin: 20px 0;">
    <p style="font-size: 12px; color: #999;">
        fin.sankey - Financial Flow Visualizer.
        You received this email because you requested an AI report.
    </p>
</body>
</html>
"#
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

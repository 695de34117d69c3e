//! HTML-to-markdown conversion for source materials.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use reportflow_shared::{ReportFlowError, Result};

use crate::cleanup;

/// Tags whose content never belongs in a material's text.
const SKIPPED_TAGS: [&str; 6] = ["script", "style", "nav", "iframe", "noscript", "svg"];

/// Content containers tried in order before falling back to `<body>`.
const CONTENT_SELECTORS: [&str; 4] = ["article", "main", "[role=\"main\"]", ".content"];

/// Convert an HTML document to cleaned markdown.
pub fn html_to_markdown(html: &str) -> Result<String> {
    let content_html = extract_content_html(html);
    let content_html = preprocess_tables(&content_html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIPPED_TAGS.to_vec())
        .build();
    let raw = converter
        .convert(&content_html)
        .map_err(|e| ReportFlowError::Conversion(format!("htmd conversion failed: {e}")))?;

    debug!(raw_len = raw.len(), "html converted");
    Ok(cleanup::run_pipeline(&raw))
}

/// Normalize plain text: unify line endings and trailing whitespace.
pub fn plain_text_to_markdown(text: &str) -> String {
    let unified = text.replace("\r\n", "\n");
    let trimmed: Vec<&str> = unified.lines().map(str::trim_end).collect();
    format!("{}\n", trimmed.join("\n").trim_end_matches('\n'))
}

/// Inner HTML of the main content container, or the whole document.
fn extract_content_html(html: &str) -> String {
    let doc = Html::parse_document(html);

    for sel in CONTENT_SELECTORS {
        if let Ok(selector) = Selector::parse(sel) {
            if let Some(el) = doc.select(&selector).next() {
                return el.inner_html();
            }
        }
    }

    static BODY: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("body").expect("valid selector"));
    doc.select(&BODY)
        .next()
        .map(|body| body.inner_html())
        .unwrap_or_else(|| html.to_string())
}

/// Replace `<table>` elements with markdown tables; htmd leaves tables as text runs.
fn preprocess_tables(html: &str) -> String {
    static TABLE: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("table").expect("valid selector"));

    let doc = Html::parse_fragment(html);
    let mut result = html.to_string();
    for table in doc.select(&TABLE) {
        result = result.replacen(&table.html(), &table_to_markdown(&table), 1);
    }
    result
}

fn table_to_markdown(table: &ElementRef) -> String {
    static TR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
    static CELL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("th, td").expect("valid selector"));

    let mut rows: Vec<Vec<String>> = table
        .select(&TR)
        .map(|tr| {
            tr.select(&CELL)
                .map(|cell| cell.text().collect::<String>().trim().replace('|', "\\|"))
                .collect::<Vec<_>>()
        })
        .filter(|row| !row.is_empty())
        .collect();

    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return String::new();
    }
    for row in &mut rows {
        row.resize(width, String::new());
    }

    let mut md = String::from("\n\n");
    for (i, row) in rows.iter().enumerate() {
        md.push_str(&format!("| {} |\n", row.join(" | ")));
        if i == 0 {
            md.push_str(&format!("|{}\n", " --- |".repeat(width)));
        }
    }
    md.push('\n');
    md
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_main_content_only() {
        let html = r#"<html><body>
            <nav><a href="/">Home</a></nav>
            <main><h1>Quarterly Notes</h1><p>Revenue grew.</p></main>
            <footer>Copyright</footer>
        </body></html>"#;

        let md = html_to_markdown(html).unwrap();
        assert!(md.contains("# Quarterly Notes"));
        assert!(md.contains("Revenue grew."));
        assert!(!md.contains("Copyright"));
        assert!(!md.contains("Home"));
    }

    #[test]
    fn falls_back_to_body() {
        let md = html_to_markdown("<html><body><h2>Loose</h2><p>Body text.</p></body></html>").unwrap();
        assert!(md.contains("## Loose"));
        assert!(md.contains("Body text."));
    }

    #[test]
    fn tables_become_markdown() {
        let html = r#"<html><body><main>
            <table>
                <tr><th>Metric</th><th>Value</th></tr>
                <tr><td>users</td><td>42</td></tr>
                <tr><td>churn</td></tr>
            </table>
        </main></body></html>"#;

        let md = html_to_markdown(html).unwrap();
        assert!(md.contains("| Metric | Value |"));
        assert!(md.contains("| users | 42 |"));
        assert!(md.contains("churn"));
        assert!(!md.contains("<td>"));
    }

    #[test]
    fn code_blocks_survive() {
        let html = r#"<html><body><main><pre><code class="language-rust">fn main() {}</code></pre></main></body></html>"#;
        let md = html_to_markdown(html).unwrap();
        assert!(md.contains("```rust"));
        assert!(md.contains("fn main() {}"));
    }

    #[test]
    fn plain_text_normalized() {
        assert_eq!(plain_text_to_markdown("line one  \r\nline two\n\n\n"), "line one\nline two\n");
    }
}

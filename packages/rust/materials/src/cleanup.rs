//! Cleanup passes applied to markdown produced from HTML materials.
//!
//! Each pass is a `&str -> String` function; [`run_pipeline`] applies them in order.

use std::sync::LazyLock;

use regex::Regex;

pub(crate) fn run_pipeline(md: &str) -> String {
    let mut result = collapse_blank_lines(md);
    result = fix_code_fence_languages(&result);
    result = strip_wrapper_tags(&result);
    result = trim_line_ends(&result);
    ensure_trailing_newline(&result)
}

// ---------------------------------------------------------------------------
// Passes
// ---------------------------------------------------------------------------

/// Collapse runs of 3+ blank lines into 2.
fn collapse_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{4,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(md, "\n\n\n").into_owned()
}

/// Rewrite class-style fence hints (`language-js`, `lang-py`, `highlight-rs`) to bare names.
fn fix_code_fence_languages(md: &str) -> String {
    static LANG_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^```(?:language-|lang-|highlight-)(\w+)").expect("valid regex")
    });

    LANG_PREFIX_RE.replace_all(md, "```$1").into_owned()
}

/// Drop layout tags htmd passes through, keeping their text. Fenced code is untouched.
fn strip_wrapper_tags(md: &str) -> String {
    static WRAPPER_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"</?(?:div|span|section|article|aside|header|footer|figure|figcaption|details|summary)(?:\s[^>]*)?>",
        )
        .expect("valid regex")
    });

    let mut in_fence = false;
    let lines: Vec<String> = md
        .lines()
        .map(|line| {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                return line.to_string();
            }
            if in_fence {
                line.to_string()
            } else {
                WRAPPER_TAG_RE.replace_all(line, "").into_owned()
            }
        })
        .collect();

    lines.join("\n")
}

fn trim_line_ends(md: &str) -> String {
    md.lines().map(str::trim_end).collect::<Vec<_>>().join("\n")
}

fn ensure_trailing_newline(md: &str) -> String {
    format!("{}\n", md.trim_end_matches('\n'))
}

//! Final report persistence.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Local};
use regex::Regex;
use tracing::{info, instrument};

use reportflow_shared::Result;

use crate::{TIMESTAMP_FORMAT, sha256_hex, write_atomic};

/// Slug used when a title has no usable characters.
const FALLBACK_SLUG: &str = "report";

/// Where a report landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedReport {
    pub path: PathBuf,
    pub size_bytes: usize,
    pub sha256: String,
}

/// Filesystem-safe slug: lowercase, non-word characters dropped, runs of
/// whitespace and hyphens joined with `_`.
pub fn slugify(title: &str) -> String {
    static NON_WORD_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("valid regex"));
    static SEPARATOR_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[-\s]+").expect("valid regex"));

    let lowered = title.to_lowercase();
    let kept = NON_WORD_RE.replace_all(&lowered, "");
    let joined = SEPARATOR_RE.replace_all(&kept, "_");
    let slug = joined.trim_matches(|c| c == '_' || c == '-');

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug.to_string()
    }
}

/// `<output_dir>/<slug>_<YYYYmmdd_HHMMSS>.md`.
pub fn default_report_path(output_dir: &Path, title: &str, at: DateTime<Local>) -> PathBuf {
    output_dir.join(format!(
        "{}_{}.md",
        slugify(title),
        at.format(TIMESTAMP_FORMAT)
    ))
}

/// Write the report to `explicit`, or to a timestamped path under `output_dir`.
#[instrument(skip_all, fields(title = %title))]
pub fn save_report(
    content: &str,
    explicit: Option<&Path>,
    output_dir: &Path,
    title: &str,
) -> Result<SavedReport> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => default_report_path(output_dir, title, Local::now()),
    };

    write_atomic(&path, content.as_bytes())?;

    let saved = SavedReport {
        size_bytes: content.len(),
        sha256: sha256_hex(content.as_bytes()),
        path,
    };
    info!(path = %saved.path.display(), size = saved.size_bytes, "report saved");
    Ok(saved)
}

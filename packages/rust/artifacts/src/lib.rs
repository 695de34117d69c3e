//! On-disk artifacts of a report run.
//!
//! - [`outline_io`]: outline files in YAML or JSON, shape detected on read
//! - [`report`]: the final markdown report
//! - [`intermediate`]: per-stage artifacts under `<output>/intermediate/`
//! - [`frontmatter`]: the YAML metadata block heading each report

pub mod frontmatter;
pub mod intermediate;
pub mod outline_io;
pub mod report;

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use reportflow_shared::{ReportFlowError, Result};

pub use frontmatter::{MetadataTemplate, ReportMetadata};
pub use intermediate::IntermediateStore;
pub use outline_io::{OutlineFormat, load_outline, load_outline_shape, save_outline};
pub use report::{SavedReport, default_report_path, save_report, slugify};

/// Timestamp format used in generated file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Write `content` to `target` through a sibling temp file and a rename.
pub(crate) fn write_atomic(target: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ReportFlowError::io(parent, e))?;
    }

    let temp = temp_path(target);
    std::fs::write(&temp, content).map_err(|e| ReportFlowError::io(&temp, e))?;
    std::fs::rename(&temp, target).map_err(|e| ReportFlowError::io(target, e))?;

    debug!(path = %target.display(), size = content.len(), "wrote artifact");
    Ok(())
}

fn temp_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.tmp"))
}

/// Hex SHA-256 of `bytes`.
pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_creates_parents_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b/report.md");

        write_atomic(&target, b"hello").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "hello");
        assert!(!dir.path().join("a/b/.report.md.tmp").exists());

        write_atomic(&target, b"again").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "again");
    }
}

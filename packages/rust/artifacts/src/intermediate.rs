//! Intermediate artifacts written by pipeline stages.
//!
//! Layout: `<output>/intermediate/<category>/<category>_<timestamp>.<ext>`.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Local;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use reportflow_shared::{Outline, ReportFlowError, Result};

use crate::outline_io::{self, OutlineFormat};
use crate::{TIMESTAMP_FORMAT, write_atomic};

/// Directory under the output root holding all categories.
pub const INTERMEDIATE_DIR: &str = "intermediate";

/// Saves and reloads per-category artifacts below one output directory.
#[derive(Debug, Clone)]
pub struct IntermediateStore {
    root: PathBuf,
}

impl IntermediateStore {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            root: output_dir.as_ref().join(INTERMEDIATE_DIR),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn category_dir(&self, category: &str) -> PathBuf {
        self.root.join(category)
    }

    fn next_path(&self, category: &str, ext: &str) -> PathBuf {
        let stamp = Local::now().format(TIMESTAMP_FORMAT);
        self.category_dir(category)
            .join(format!("{category}_{stamp}.{ext}"))
    }

    /// Save raw text (e.g. a markdown summary).
    #[instrument(skip(self, content))]
    pub fn save_text(&self, category: &str, ext: &str, content: &str) -> Result<PathBuf> {
        let path = self.next_path(category, ext);
        write_atomic(&path, content.as_bytes())?;
        Ok(path)
    }

    /// Save any serializable value as pretty JSON.
    pub fn save_json<T: Serialize>(&self, category: &str, value: &T) -> Result<PathBuf> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| ReportFlowError::parse(format!("failed to encode {category}: {e}")))?;
        self.save_text(category, "json", &json)
    }

    /// Save an outline in the given format.
    pub fn save_outline(
        &self,
        category: &str,
        outline: &Outline,
        format: OutlineFormat,
    ) -> Result<PathBuf> {
        let path = self.next_path(category, format.extension());
        outline_io::save_outline(outline, &path, format)
    }

    /// Most recently modified file of `category`; ties go to the later name.
    pub fn latest(&self, category: &str) -> Result<PathBuf> {
        let dir = self.category_dir(category);
        let entries = std::fs::read_dir(&dir).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ReportFlowError::NotFound { path: dir.clone() },
            _ => ReportFlowError::io(&dir, e),
        })?;

        let mut best: Option<(SystemTime, PathBuf)> = None;
        for entry in entries {
            let entry = entry.map_err(|e| ReportFlowError::io(&dir, e))?;
            let path = entry.path();
            if !path.is_file() || is_hidden(&path) {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .map_err(|e| ReportFlowError::io(&path, e))?;
            let candidate = (modified, path);
            if best.as_ref().is_none_or(|b| candidate > *b) {
                best = Some(candidate);
            }
        }

        let (_, path) = best.ok_or(ReportFlowError::NotFound { path: dir })?;
        debug!(path = %path.display(), "latest intermediate artifact");
        Ok(path)
    }

    pub fn load_latest_text(&self, category: &str) -> Result<String> {
        let path = self.latest(category)?;
        std::fs::read_to_string(&path).map_err(|e| ReportFlowError::io(&path, e))
    }

    pub fn load_latest_json<T: DeserializeOwned>(&self, category: &str) -> Result<T> {
        let path = self.latest(category)?;
        let text = std::fs::read_to_string(&path).map_err(|e| ReportFlowError::io(&path, e))?;
        serde_json::from_str(&text).map_err(|e| {
            ReportFlowError::parse(format!("invalid JSON in {}: {e}", path.display()))
        })
    }

    pub fn load_latest_outline(&self, category: &str) -> Result<Outline> {
        outline_io::load_outline(&self.latest(category)?)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reportflow_shared::Section;

    #[test]
    fn saves_under_category_with_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = IntermediateStore::new(dir.path());

        let path = store.save_text("analysis", "md", "# Summary").unwrap();
        assert!(path.starts_with(dir.path().join("intermediate").join("analysis")));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("analysis_"));
        assert!(name.ends_with(".md"));
        // analysis_YYYYmmdd_HHMMSS.md
        assert_eq!(name.len(), "analysis_".len() + 15 + ".md".len());

        assert_eq!(store.load_latest_text("analysis").unwrap(), "# Summary");
    }

    #[test]
    fn latest_prefers_newest() {
        let dir = tempfile::tempdir().unwrap();
        let store = IntermediateStore::new(dir.path());
        let cat = store.category_dir("conversion_info");
        std::fs::create_dir_all(&cat).unwrap();

        std::fs::write(cat.join("conversion_info_20240101_000000.json"), "{\"n\": 1}").unwrap();
        std::fs::write(cat.join("conversion_info_20240102_000000.json"), "{\"n\": 2}").unwrap();
        std::fs::write(cat.join(".tmp_partial"), "junk").unwrap();

        let value: serde_json::Value = store.load_latest_json("conversion_info").unwrap();
        assert_eq!(value["n"], 2);
    }

    #[test]
    fn outline_artifact_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = IntermediateStore::new(dir.path());
        let outline = Outline::new("T", vec![Section::new("1", "A", "d")]);

        let path = store
            .save_outline("outline", &outline, OutlineFormat::Json)
            .unwrap();
        assert_eq!(path.extension().unwrap(), "json");
        assert_eq!(store.load_latest_outline("outline").unwrap(), outline);
    }

    #[test]
    fn missing_category_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = IntermediateStore::new(dir.path());
        assert!(matches!(
            store.latest("nothing"),
            Err(ReportFlowError::NotFound { .. })
        ));

        std::fs::create_dir_all(store.category_dir("empty")).unwrap();
        assert!(matches!(
            store.latest("empty"),
            Err(ReportFlowError::NotFound { .. })
        ));
    }
}

//! Source-material ingestion.
//!
//! Walks a materials directory, reads markdown as-is, converts HTML and plain
//! text to markdown (caching conversions by content hash), and concatenates
//! everything into one text with a `# File:` header per file.

mod cache;
mod cleanup;
mod convert;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use walkdir::{DirEntry, WalkDir};

use reportflow_shared::{ReportFlowError, Result};

pub use cache::{CACHE_FILE_NAME, content_hash};
pub use convert::{html_to_markdown, plain_text_to_markdown};

use cache::ConversionCache;

/// Extensions read directly as markdown.
pub const MARKDOWN_EXTENSIONS: &[&str] = &[
    "md", "markdown", "mdown", "mkd", "mkdn", "mdwn", "mdt", "mdtext",
];

/// Extensions converted to markdown before ingestion.
pub const CONVERTIBLE_EXTENSIONS: &[&str] = &["html", "htm", "txt"];

/// Width of the `=` rule written after each file.
const SEPARATOR_WIDTH: usize = 80;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// How a file in the materials directory is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialKind {
    Markdown,
    Convertible,
    Unsupported,
}

impl MaterialKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = extension(path);
        if MARKDOWN_EXTENSIONS.contains(&ext.as_str()) {
            Self::Markdown
        } else if CONVERTIBLE_EXTENSIONS.contains(&ext.as_str()) {
            Self::Convertible
        } else {
            Self::Unsupported
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Convertible => "convertible",
            Self::Unsupported => "unsupported",
        }
    }
}

/// Options for [`load_materials`].
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Where converted markdown and the conversion cache are written.
    pub conversion_dir: PathBuf,
    /// Reuse earlier conversions whose source hash is unchanged.
    pub use_cache: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            conversion_dir: PathBuf::from("./output/converted"),
            use_cache: true,
        }
    }
}

/// One converted material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRecord {
    pub original_path: PathBuf,
    pub converted_path: PathBuf,
    /// Length of the converted markdown in bytes.
    pub size: usize,
    /// SHA-256 of the source file.
    pub hash: String,
    /// Served from an earlier conversion.
    pub cached: bool,
}

/// Result of [`load_materials`].
#[derive(Debug, Clone, Default)]
pub struct LoadedMaterials {
    pub content: String,
    pub file_count: usize,
    pub conversions: Vec<ConversionRecord>,
}

/// One entry of [`list_materials`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterialInfo {
    /// Path relative to the materials directory.
    pub path: PathBuf,
    pub size: u64,
    pub kind: MaterialKind,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load every supported file under `dir` into one concatenated text.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub fn load_materials(dir: &Path, opts: &LoadOptions) -> Result<LoadedMaterials> {
    check_dir(dir)?;

    let mut cache = opts
        .use_cache
        .then(|| ConversionCache::load(&opts.conversion_dir));
    let mut parts: Vec<String> = Vec::new();
    let mut loaded = LoadedMaterials::default();

    for path in walk(dir)? {
        let rel = relative_display(dir, &path);
        match MaterialKind::from_path(&path) {
            MaterialKind::Markdown => match std::fs::read_to_string(&path) {
                Ok(content) => push_file(&mut parts, format!("# File: {rel}\n"), content),
                Err(e) => {
                    warn!(file = %rel, error = %e, "skipping unreadable markdown file");
                    continue;
                }
            },
            MaterialKind::Convertible => {
                let bytes = match std::fs::read(&path) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(file = %rel, error = %e, "skipping unreadable file");
                        continue;
                    }
                };
                let record = convert_material(&path, &rel, &bytes, opts, cache.as_mut())?;
                let content = std::fs::read_to_string(&record.converted_path)
                    .map_err(|e| ReportFlowError::io(&record.converted_path, e))?;
                let header = format!("# File: {rel} (converted from .{})\n", extension(&path));
                push_file(&mut parts, header, content);
                loaded.conversions.push(record);
            }
            MaterialKind::Unsupported => {
                warn!(file = %rel, "unsupported file type, skipping");
                continue;
            }
        }
        loaded.file_count += 1;
    }

    if let Some(cache) = &cache {
        if !loaded.conversions.is_empty() {
            cache.save()?;
        }
    }

    if loaded.file_count == 0 {
        return Err(ReportFlowError::NoSupportedFiles {
            path: dir.to_path_buf(),
        });
    }

    loaded.content = parts.join("\n");
    info!(
        file_count = loaded.file_count,
        conversions = loaded.conversions.len(),
        chars = loaded.content.len(),
        "materials loaded"
    );
    Ok(loaded)
}

/// Describe every file under `dir` without reading contents.
pub fn list_materials(dir: &Path) -> Result<Vec<MaterialInfo>> {
    check_dir(dir)?;

    walk(dir)?
        .into_iter()
        .map(|path| {
            let meta = std::fs::metadata(&path).map_err(|e| ReportFlowError::io(&path, e))?;
            Ok(MaterialInfo {
                path: path.strip_prefix(dir).unwrap_or(&path).to_path_buf(),
                size: meta.len(),
                kind: MaterialKind::from_path(&path),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn check_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Err(ReportFlowError::NotFound {
            path: dir.to_path_buf(),
        });
    }
    if !dir.is_dir() {
        return Err(ReportFlowError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }
    Ok(())
}

/// Regular files under `dir`, sorted by path, skipping hidden entries.
fn walk(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
    {
        let entry = entry.map_err(|e| {
            let path = e.path().map_or_else(|| dir.to_path_buf(), Path::to_path_buf);
            ReportFlowError::io(path, e.into())
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Relative path with `/` separators, for headers and cache keys.
fn relative_display(dir: &Path, path: &Path) -> String {
    path.strip_prefix(dir)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn push_file(parts: &mut Vec<String>, header: String, content: String) {
    parts.push(header);
    parts.push(content);
    parts.push(format!("\n{}\n", "=".repeat(SEPARATOR_WIDTH)));
}

/// Convert one file into the conversion directory, or reuse a fresh conversion.
fn convert_material(
    path: &Path,
    rel: &str,
    bytes: &[u8],
    opts: &LoadOptions,
    cache: Option<&mut ConversionCache>,
) -> Result<ConversionRecord> {
    let hash = content_hash(bytes);
    let converted_path = opts.conversion_dir.join(format!("{rel}.md"));

    let fresh = cache.as_ref().is_some_and(|c| c.is_fresh(rel, &hash)) && converted_path.is_file();
    if fresh {
        debug!(file = %rel, "using cached conversion");
    } else {
        let text = String::from_utf8_lossy(bytes);
        let markdown = match extension(path).as_str() {
            "html" | "htm" => html_to_markdown(&text).unwrap_or_else(|e| {
                warn!(file = %rel, error = %e, "conversion failed, writing placeholder");
                format!("# Conversion Error\n\nFailed to convert {rel}: {e}\n")
            }),
            _ => plain_text_to_markdown(&text),
        };

        if let Some(parent) = converted_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ReportFlowError::io(parent, e))?;
        }
        std::fs::write(&converted_path, &markdown)
            .map_err(|e| ReportFlowError::io(&converted_path, e))?;
        debug!(file = %rel, to = %converted_path.display(), "converted");

        if let Some(cache) = cache {
            cache.record(rel, hash.clone());
        }
    }

    let size = std::fs::metadata(&converted_path)
        .map_err(|e| ReportFlowError::io(&converted_path, e))?
        .len() as usize;

    Ok(ConversionRecord {
        original_path: path.to_path_buf(),
        converted_path,
        size,
        hash,
        cached: fresh,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn materials() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b_notes.md"), "# Notes\n\nMarkdown body.\n").unwrap();
        fs::create_dir(dir.path().join("a_sub")).unwrap();
        fs::write(dir.path().join("a_sub/interview.txt"), "Plain text line.\n").unwrap();
        fs::write(
            dir.path().join("c_page.html"),
            "<html><body><main><h1>Page</h1><p>Html body.</p></main></body></html>",
        )
        .unwrap();
        fs::write(dir.path().join("d_chart.png"), [0u8, 1, 2]).unwrap();
        fs::write(dir.path().join(".hidden.md"), "secret").unwrap();
        dir
    }

    fn opts(out: &Path) -> LoadOptions {
        LoadOptions {
            conversion_dir: out.join("converted"),
            use_cache: true,
        }
    }

    #[test]
    fn loads_sorted_with_headers() {
        let dir = materials();
        let out = tempfile::tempdir().unwrap();

        let loaded = load_materials(dir.path(), &opts(out.path())).unwrap();

        assert_eq!(loaded.file_count, 3);
        assert_eq!(loaded.conversions.len(), 2);
        let c = &loaded.content;
        let sub = c.find("# File: a_sub/interview.txt (converted from .txt)").unwrap();
        let notes = c.find("# File: b_notes.md\n").unwrap();
        let page = c.find("# File: c_page.html (converted from .html)").unwrap();
        assert!(sub < notes && notes < page);
        assert!(c.contains("Markdown body."));
        assert!(c.contains("Plain text line."));
        assert!(c.contains("Html body."));
        assert!(c.contains(&"=".repeat(80)));
        assert!(!c.contains("secret"));
        assert!(!c.contains("d_chart"));

        for record in &loaded.conversions {
            assert!(record.converted_path.is_file());
            assert!(!record.cached);
        }
        assert!(out.path().join("converted").join(CACHE_FILE_NAME).is_file());
    }

    #[test]
    fn unchanged_files_hit_cache() {
        let dir = materials();
        let out = tempfile::tempdir().unwrap();
        let o = opts(out.path());

        load_materials(dir.path(), &o).unwrap();
        let second = load_materials(dir.path(), &o).unwrap();
        assert!(second.conversions.iter().all(|r| r.cached));

        fs::write(dir.path().join("a_sub/interview.txt"), "Changed.\n").unwrap();
        let third = load_materials(dir.path(), &o).unwrap();
        let txt = third
            .conversions
            .iter()
            .find(|r| r.original_path.ends_with("interview.txt"))
            .unwrap();
        assert!(!txt.cached);
        assert!(third.content.contains("Changed."));
    }

    #[test]
    fn cache_disabled_always_converts() {
        let dir = materials();
        let out = tempfile::tempdir().unwrap();
        let o = LoadOptions {
            use_cache: false,
            ..opts(out.path())
        };

        load_materials(dir.path(), &o).unwrap();
        let again = load_materials(dir.path(), &o).unwrap();
        assert!(again.conversions.iter().all(|r| !r.cached));
        assert!(!out.path().join("converted").join(CACHE_FILE_NAME).exists());
    }

    #[test]
    fn missing_dir_is_not_found() {
        let out = tempfile::tempdir().unwrap();
        let err = load_materials(&out.path().join("nope"), &opts(out.path())).unwrap_err();
        assert!(matches!(err, ReportFlowError::NotFound { .. }));
    }

    #[test]
    fn file_is_not_a_directory() {
        let dir = materials();
        let out = tempfile::tempdir().unwrap();
        let err = load_materials(&dir.path().join("b_notes.md"), &opts(out.path())).unwrap_err();
        assert!(matches!(err, ReportFlowError::NotADirectory { .. }));
    }

    #[test]
    fn nothing_ingestible_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("photo.jpg"), [1u8]).unwrap();
        let out = tempfile::tempdir().unwrap();

        let err = load_materials(dir.path(), &opts(out.path())).unwrap_err();
        assert!(matches!(err, ReportFlowError::NoSupportedFiles { .. }));
    }

    #[test]
    fn listing_reports_kinds() {
        let dir = materials();
        let infos = list_materials(dir.path()).unwrap();

        let kinds: Vec<(String, MaterialKind)> = infos
            .iter()
            .map(|i| (i.path.to_string_lossy().replace('\\', "/"), i.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("a_sub/interview.txt".to_string(), MaterialKind::Convertible),
                ("b_notes.md".to_string(), MaterialKind::Markdown),
                ("c_page.html".to_string(), MaterialKind::Convertible),
                ("d_chart.png".to_string(), MaterialKind::Unsupported),
            ]
        );
        assert_eq!(infos[3].size, 3);
    }

    #[test]
    fn kind_detection_is_case_insensitive() {
        assert_eq!(MaterialKind::from_path(Path::new("X.MD")), MaterialKind::Markdown);
        assert_eq!(MaterialKind::from_path(Path::new("x.Htm")), MaterialKind::Convertible);
        assert_eq!(MaterialKind::from_path(Path::new("README")), MaterialKind::Unsupported);
        assert_eq!(MaterialKind::Convertible.as_str(), "convertible");
    }
}

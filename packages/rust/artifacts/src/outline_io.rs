//! Outline files: YAML (nested mapping) or JSON, interchangeable.
//!
//! Files are written in the hierarchical shape with a `type: section` tag on
//! every node, which older readers expect. The tag is ignored on read. Legacy
//! flat outlines are accepted on read and normalized once.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use tracing::{info, instrument, warn};

use reportflow_shared::{Outline, OutlineShape, ReportFlowError, Result, Section};

use crate::write_atomic;

/// Value of the legacy per-node type tag.
const SECTION_TAG: &str = "section";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlineFormat {
    Yaml,
    Json,
}

impl OutlineFormat {
    /// Format implied by a `.yaml`/`.yml`/`.json` extension.
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// JSON if the text starts with `{`, otherwise YAML.
    pub fn sniff(text: &str) -> Self {
        if text.trim_start_matches('\u{feff}').trim_start().starts_with('{') {
            Self::Json
        } else {
            Self::Yaml
        }
    }

    /// Extension first, content sniff as fallback.
    pub fn detect(path: &Path, text: &str) -> Self {
        Self::from_extension(path).unwrap_or_else(|| Self::sniff(text))
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
        }
    }
}

impl FromStr for OutlineFormat {
    type Err = ReportFlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            other => Err(ReportFlowError::validation(format!(
                "unsupported outline format {other:?}; use yaml or json"
            ))),
        }
    }
}

impl fmt::Display for OutlineFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

// ---------------------------------------------------------------------------
// On-disk document
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct OutlineDoc<'a> {
    title: &'a str,
    sections: Vec<SectionDoc<'a>>,
}

#[derive(Serialize)]
struct SectionDoc<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    index: &'a str,
    title: &'a str,
    description: &'a str,
    content: Option<&'a str>,
    subsections: Vec<SectionDoc<'a>>,
}

impl<'a> From<&'a Section> for SectionDoc<'a> {
    fn from(s: &'a Section) -> Self {
        Self {
            kind: SECTION_TAG,
            index: &s.index,
            title: &s.title,
            description: &s.description,
            content: s.content.as_deref(),
            subsections: s.subsections.iter().map(SectionDoc::from).collect(),
        }
    }
}

impl<'a> From<&'a Outline> for OutlineDoc<'a> {
    fn from(o: &'a Outline) -> Self {
        Self {
            title: &o.title,
            sections: o.sections.iter().map(SectionDoc::from).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Encode / decode
// ---------------------------------------------------------------------------

/// Serialize an outline in `format`.
pub fn to_string(outline: &Outline, format: OutlineFormat) -> Result<String> {
    let doc = OutlineDoc::from(outline);
    match format {
        OutlineFormat::Yaml => serde_yaml::to_string(&doc)
            .map_err(|e| ReportFlowError::parse(format!("failed to encode outline as YAML: {e}"))),
        OutlineFormat::Json => serde_json::to_string_pretty(&doc)
            .map(|mut s| {
                s.push('\n');
                s
            })
            .map_err(|e| ReportFlowError::parse(format!("failed to encode outline as JSON: {e}"))),
    }
}

/// Decode either outline shape from text in `format`.
pub fn from_str(text: &str, format: OutlineFormat) -> Result<OutlineShape> {
    let value: serde_json::Value = match format {
        OutlineFormat::Yaml => serde_yaml::from_str(text)
            .map_err(|e| ReportFlowError::parse(format!("invalid YAML outline: {e}")))?,
        OutlineFormat::Json => serde_json::from_str(text)
            .map_err(|e| ReportFlowError::parse(format!("invalid JSON outline: {e}")))?,
    };
    OutlineShape::from_value(value)
}

/// Read an outline file without normalizing its shape.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_outline_shape(path: &Path) -> Result<OutlineShape> {
    if !path.exists() {
        return Err(ReportFlowError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(path).map_err(|e| ReportFlowError::io(path, e))?;
    let format = OutlineFormat::detect(path, &text);
    let shape = from_str(&text, format)?;
    if shape.is_legacy() {
        warn!("outline file uses the legacy chapter list; converting");
    }
    Ok(shape)
}

/// Read an outline file in either format and shape.
pub fn load_outline(path: &Path) -> Result<Outline> {
    let outline = load_outline_shape(path)?.into_outline();
    info!(
        path = %path.display(),
        title = %outline.title,
        leaves = outline.leaf_count(),
        "outline loaded"
    );
    Ok(outline)
}

/// Write `outline` to `path` in `format`, creating parent directories.
#[instrument(skip_all, fields(path = %path.display(), %format))]
pub fn save_outline(outline: &Outline, path: &Path, format: OutlineFormat) -> Result<PathBuf> {
    let text = to_string(outline, format)?;
    write_atomic(path, text.as_bytes())?;
    info!("outline saved");
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reportflow_shared::{Chapter, LegacyOutline};

    fn sample() -> Outline {
        let mut written = Section::new("2", "Methods", "How it was done");
        written.content = Some("We measured things.\n\nTwice.".into());
        Outline::new(
            "Field Study",
            vec![
                Section::new("1", "Introduction", "Set the scene").with_subsections(vec![
                    Section::new("1.1", "Background", "Context"),
                    Section::new("1.10", "Tenth", "Index that looks like a float")
                        .with_subsections(vec![Section::new("1.10.1", "Deep", "")]),
                ]),
                written,
            ],
        )
    }

    #[test]
    fn yaml_roundtrip_preserves_tree() {
        let outline = sample();
        let text = to_string(&outline, OutlineFormat::Yaml).unwrap();
        assert!(text.contains("type: section"));

        let back = from_str(&text, OutlineFormat::Yaml).unwrap().into_outline();
        assert_eq!(back, outline);
    }

    #[test]
    fn json_roundtrip_preserves_tree() {
        let outline = sample();
        let text = to_string(&outline, OutlineFormat::Json).unwrap();
        assert!(text.contains("\"type\": \"section\""));

        let back = from_str(&text, OutlineFormat::Json).unwrap().into_outline();
        assert_eq!(back, outline);
    }

    #[test]
    fn detection_by_extension_then_sniff() {
        assert_eq!(
            OutlineFormat::detect(Path::new("o.YML"), "{"),
            OutlineFormat::Yaml
        );
        assert_eq!(
            OutlineFormat::detect(Path::new("o.json"), "title: x"),
            OutlineFormat::Json
        );
        assert_eq!(
            OutlineFormat::detect(Path::new("outline"), "  {\"title\": 1}"),
            OutlineFormat::Json
        );
        assert_eq!(
            OutlineFormat::detect(Path::new("outline.txt"), "title: x"),
            OutlineFormat::Yaml
        );
        assert_eq!("JSON".parse::<OutlineFormat>().unwrap(), OutlineFormat::Json);
        assert!("toml".parse::<OutlineFormat>().is_err());
    }

    #[test]
    fn save_and_load_files() {
        let dir = tempfile::tempdir().unwrap();
        let outline = sample();

        for format in [OutlineFormat::Yaml, OutlineFormat::Json] {
            let path = dir.path().join(format!("nested/outline.{format}"));
            save_outline(&outline, &path, format).unwrap();
            assert_eq!(load_outline(&path).unwrap(), outline);
        }

        // No extension: content sniffing decides.
        let bare = dir.path().join("outline");
        std::fs::write(&bare, to_string(&outline, OutlineFormat::Json).unwrap()).unwrap();
        assert_eq!(load_outline(&bare).unwrap(), outline);
    }

    #[test]
    fn legacy_file_is_normalized_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.yaml");
        std::fs::write(
            &path,
            "title: Old\nchapters:\n  - index: 1\n    title: Intro\n    description: a\n  - index: 2\n    title: Methods\n    description: b\n",
        )
        .unwrap();

        let shape = load_outline_shape(&path).unwrap();
        assert_eq!(
            shape,
            OutlineShape::Legacy(LegacyOutline {
                title: "Old".into(),
                chapters: vec![
                    Chapter {
                        index: 1,
                        title: "Intro".into(),
                        description: "a".into(),
                        content: None,
                    },
                    Chapter {
                        index: 2,
                        title: "Methods".into(),
                        description: "b".into(),
                        content: None,
                    },
                ],
            })
        );

        let outline = load_outline(&path).unwrap();
        assert_eq!(outline.sections.len(), 2);
        assert_eq!(outline.sections[1].index, "2");
        assert!(outline.sections.iter().all(Section::is_leaf));
    }

    #[test]
    fn hand_written_yaml_with_numeric_index() {
        let text = "title: T\nsections:\n  - index: 1\n    title: One\n    description: d\n";
        let outline = from_str(text, OutlineFormat::Yaml).unwrap().into_outline();
        assert_eq!(outline.sections[0].index, "1");

        let float_index = "title: T\nsections:\n  - index: 1.2\n    title: One\n";
        assert!(from_str(float_index, OutlineFormat::Yaml).is_err());
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = load_outline(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, ReportFlowError::NotFound { .. }));
    }
}

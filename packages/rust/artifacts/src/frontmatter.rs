//! YAML frontmatter for assembled reports.
//!
//! A [`MetadataTemplate`] is a YAML mapping loaded once and passed to whoever
//! renders reports. Rendering fills in per-report values without mutating
//! the template; [`MetadataTemplate::reload`] re-reads the source file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use tracing::{debug, instrument};

use reportflow_shared::{ReportFlowError, Result};

/// Template used when no metadata file is configured.
const BUILTIN_TEMPLATE: &str = "\
title: ''
subtitle: ''
abstract: ''
info:
  author: ''
  date: ''
bibliography: ''
";

/// Per-report values merged into the template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportMetadata {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub abstract_text: Option<String>,
    /// Merged into the template's `info` mapping.
    pub info: BTreeMap<String, String>,
    pub bibliography: Option<String>,
}

impl ReportMetadata {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataTemplate {
    fields: Mapping,
    source: Option<PathBuf>,
}

impl Default for MetadataTemplate {
    fn default() -> Self {
        Self::builtin()
    }
}

impl MetadataTemplate {
    pub fn builtin() -> Self {
        // The literal above is a valid mapping.
        let fields = serde_yaml::from_str(BUILTIN_TEMPLATE).unwrap_or_default();
        Self {
            fields,
            source: None,
        }
    }

    /// Parse a template from YAML text. The document must be a mapping.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(text)
            .map_err(|e| ReportFlowError::parse(format!("invalid metadata template: {e}")))?;
        match value {
            Value::Mapping(fields) => Ok(Self {
                fields,
                source: None,
            }),
            Value::Null => Ok(Self {
                fields: Mapping::new(),
                source: None,
            }),
            _ => Err(ReportFlowError::parse(
                "metadata template must be a YAML mapping",
            )),
        }
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ReportFlowError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path).map_err(|e| ReportFlowError::io(path, e))?;
        let mut template = Self::from_yaml_str(&text)?;
        template.source = Some(path.to_path_buf());
        debug!(fields = template.fields.len(), "metadata template loaded");
        Ok(template)
    }

    /// Re-read the source file. Templates without a file are left unchanged.
    pub fn reload(&mut self) -> Result<()> {
        if let Some(path) = self.source.clone() {
            *self = Self::load(&path)?;
        }
        Ok(())
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Template fields with `metadata` applied, in template key order.
    pub fn fill(&self, metadata: &ReportMetadata) -> Mapping {
        let mut fields = self.fields.clone();
        let scalars = [
            ("title", &metadata.title),
            ("subtitle", &metadata.subtitle),
            ("abstract", &metadata.abstract_text),
            ("bibliography", &metadata.bibliography),
        ];
        for (key, value) in scalars {
            if let Some(v) = value {
                fields.insert(key.into(), Value::String(v.clone()));
            }
        }

        if !metadata.info.is_empty() {
            let info_key = Value::from("info");
            let mut info = match fields.get(&info_key) {
                Some(Value::Mapping(m)) => m.clone(),
                _ => Mapping::new(),
            };
            for (k, v) in &metadata.info {
                info.insert(Value::String(k.clone()), Value::String(v.clone()));
            }
            fields.insert(info_key, Value::Mapping(info));
        }
        fields
    }

    /// `---\n<yaml>\n---` block for `metadata`.
    pub fn render(&self, metadata: &ReportMetadata) -> Result<String> {
        let yaml = serde_yaml::to_string(&self.fill(metadata))
            .map_err(|e| ReportFlowError::parse(format!("failed to encode frontmatter: {e}")))?;
        Ok(format!("---\n{}\n---", yaml.trim_end()))
    }
}

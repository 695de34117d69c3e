//! Compartments of the report pipeline's shared store.
//!
//! Each stage writes exactly one of these; `Input` is seeded by the caller.

use std::path::PathBuf;

use serde::Serialize;

use reportflow_flow::Compartment;
use reportflow_materials::ConversionRecord;
use reportflow_shared::Outline;

/// What the caller asked for.
#[derive(Debug, Clone, Serialize)]
pub struct Input {
    pub topic: String,
    pub materials_dir: PathBuf,
    /// Pre-built outline replacing analysis and design.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outline_path: Option<PathBuf>,
    /// Root for the report and intermediate artifacts.
    pub output_dir: PathBuf,
    /// Explicit report path; derived from the title when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
}

impl Input {
    pub fn new(topic: impl Into<String>, materials_dir: impl Into<PathBuf>) -> Self {
        Self {
            topic: topic.into(),
            materials_dir: materials_dir.into(),
            outline_path: None,
            output_dir: PathBuf::from("./output"),
            report_path: None,
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_outline(mut self, path: impl Into<PathBuf>) -> Self {
        self.outline_path = Some(path.into());
        self
    }

    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }

    /// Where converted materials are cached.
    pub fn conversion_dir(&self) -> PathBuf {
        self.output_dir.join("converted")
    }
}

impl Compartment for Input {
    const NAME: &'static str = "input";
}

#[derive(Debug, Clone, Serialize)]
pub struct Materials {
    #[serde(skip)]
    pub content: String,
    pub content_chars: usize,
    pub file_count: usize,
    pub dir: PathBuf,
    pub conversions: Vec<ConversionRecord>,
}

impl Compartment for Materials {
    const NAME: &'static str = "materials";
}

#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub summary: String,
}

impl Compartment for Analysis {
    const NAME: &'static str = "analysis";
}

/// The outline every later stage works from, always hierarchical.
#[derive(Debug, Clone, Serialize)]
pub struct OutlineState {
    pub outline: Outline,
    /// Saved artifact or user-supplied file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Compartment for OutlineState {
    const NAME: &'static str = "outline";
}

/// Generated body of one leaf section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrittenSection {
    pub index: String,
    pub title: String,
    pub content: String,
}

/// Leaf contents in writing order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Writing {
    pub sections: Vec<WrittenSection>,
}

impl Writing {
    pub fn get(&self, index: &str) -> Option<&WrittenSection> {
        self.sections.iter().find(|s| s.index == index)
    }

    pub fn total_chars(&self) -> usize {
        self.sections.iter().map(|s| s.content.chars().count()).sum()
    }
}

impl Compartment for Writing {
    const NAME: &'static str = "writing";
}

#[derive(Debug, Clone, Serialize)]
pub struct Output {
    #[serde(skip)]
    pub report: String,
    pub path: PathBuf,
    pub size_bytes: usize,
    pub sha256: String,
}

impl Compartment for Output {
    const NAME: &'static str = "output";
}

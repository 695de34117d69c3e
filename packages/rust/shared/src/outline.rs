//! Hierarchical report outline.
//!
//! An [`Outline`] is a forest of [`Section`]s addressed by dotted index paths
//! (`"1"`, `"1.2"`, `"1.2.3"`). Leaves are the unit of content generation;
//! [`Outline::flatten`] yields them in writing and assembly order.
//! [`LegacyOutline`] is the flat chapter list kept for older consumers.

use std::collections::HashSet;
use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

use crate::error::{ReportFlowError, Result};

/// Deepest heading level a rendered document supports.
pub const MAX_HEADING_LEVEL: usize = 6;

/// Heading level for a section index: one plus the dot count, capped at 6.
pub fn heading_level(index: &str) -> usize {
    (index.matches('.').count() + 1).min(MAX_HEADING_LEVEL)
}

// ---------------------------------------------------------------------------
// Section
// ---------------------------------------------------------------------------

/// A node of the outline tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Dotted hierarchical path, e.g. `"1.2"`.
    #[serde(deserialize_with = "index_from_scalar")]
    pub index: String,
    /// Display name.
    pub title: String,
    /// Generation instructions and scope for this node.
    #[serde(default)]
    pub description: String,
    /// Generated body text; absent until the writing stage fills it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Ordered children. Empty means this section is a leaf.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subsections: Vec<Section>,
}

impl Section {
    /// Create a leaf section without content.
    pub fn new(
        index: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            index: index.into(),
            title: title.into(),
            description: description.into(),
            content: None,
            subsections: Vec::new(),
        }
    }

    /// Attach children, turning this section into an internal node.
    pub fn with_subsections(mut self, subsections: Vec<Section>) -> Self {
        self.subsections = subsections;
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.subsections.is_empty()
    }

    /// Number of dots in the index.
    pub fn depth(&self) -> usize {
        self.index.matches('.').count()
    }

    pub fn heading_level(&self) -> usize {
        heading_level(&self.index)
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Section>) {
        if self.is_leaf() {
            out.push(self);
            return;
        }
        for child in &self.subsections {
            child.collect_leaves(out);
        }
    }

    fn collect_leaves_mut<'a>(&'a mut self, out: &mut Vec<&'a mut Section>) {
        if self.subsections.is_empty() {
            out.push(self);
            return;
        }
        for child in &mut self.subsections {
            child.collect_leaves_mut(out);
        }
    }

    fn find(&self, index: &str) -> Option<&Section> {
        if self.index == index {
            return Some(self);
        }
        self.subsections.iter().find_map(|s| s.find(index))
    }

    fn find_mut(&mut self, index: &str) -> Option<&mut Section> {
        if self.index == index {
            return Some(self);
        }
        self.subsections.iter_mut().find_map(|s| s.find_mut(index))
    }
}

/// Accept both `"1.2"` and bare integers (`1`) for an index.
///
/// Floats are rejected: an unquoted `1.10` in YAML would silently become `1.1`.
fn index_from_scalar<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct IndexVisitor;

    impl Visitor<'_> for IndexVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a section index string such as \"1.2\" or an integer")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<String, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<String, E> {
            Err(E::custom(format!(
                "section index {v} is a number; quote dotted indices (e.g. \"1.10\")"
            )))
        }
    }

    deserializer.deserialize_any(IndexVisitor)
}

// ---------------------------------------------------------------------------
// Outline
// ---------------------------------------------------------------------------

/// Document root: title plus top-level sections (chapters).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outline {
    pub title: String,
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl Outline {
    pub fn new(title: impl Into<String>, sections: Vec<Section>) -> Self {
        Self {
            title: title.into(),
            sections,
        }
    }

    /// All leaf sections, depth-first and left-to-right.
    ///
    /// This order is the authoritative writing and assembly order.
    pub fn flatten(&self) -> Vec<&Section> {
        let mut leaves = Vec::new();
        for section in &self.sections {
            section.collect_leaves(&mut leaves);
        }
        leaves
    }

    /// Mutable leaves in [`flatten`](Self::flatten) order.
    pub fn flatten_mut(&mut self) -> Vec<&mut Section> {
        let mut leaves = Vec::new();
        for section in &mut self.sections {
            section.collect_leaves_mut(&mut leaves);
        }
        leaves
    }

    /// Number of leaf sections.
    pub fn leaf_count(&self) -> usize {
        self.walk().filter(|s| s.is_leaf()).count()
    }

    /// Pre-order iterator over every node, internal nodes included.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: self.sections.iter().rev().collect(),
        }
    }

    /// Exact string match on the index; `"1.10"` and `"1.1"` are distinct.
    pub fn get_by_index(&self, index: &str) -> Option<&Section> {
        self.sections.iter().find_map(|s| s.find(index))
    }

    pub fn get_by_index_mut(&mut self, index: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find_map(|s| s.find_mut(index))
    }

    /// Assign generated content to the section at `index`.
    ///
    /// Returns `false` when no section has that index.
    pub fn set_content(&mut self, index: &str, content: impl Into<String>) -> bool {
        match self.get_by_index_mut(index) {
            Some(section) => {
                section.content = Some(content.into());
                true
            }
            None => false,
        }
    }

    /// Flatten to the legacy chapter list, renumbering leaves `1..=N`.
    pub fn to_legacy(&self) -> LegacyOutline {
        let chapters = self
            .flatten()
            .into_iter()
            .zip(1u32..)
            .map(|(leaf, index)| Chapter {
                index,
                title: leaf.title.clone(),
                description: leaf.description.clone(),
                content: leaf.content.clone(),
            })
            .collect();

        LegacyOutline {
            title: self.title.clone(),
            chapters,
        }
    }

    /// Check index strings without rejecting the outline.
    ///
    /// The tree itself is permissive; callers decide what to do with issues.
    pub fn validate(&self) -> Vec<IndexIssue> {
        let mut issues = Vec::new();
        let mut seen = HashSet::new();
        for section in &self.sections {
            check_section(section, None, &mut seen, &mut issues);
        }
        issues
    }
}

fn check_section<'a>(
    section: &'a Section,
    parent: Option<&str>,
    seen: &mut HashSet<&'a str>,
    issues: &mut Vec<IndexIssue>,
) {
    let index = section.index.as_str();

    if !seen.insert(index) {
        issues.push(IndexIssue::Duplicate(index.to_string()));
    }

    if index.split('.').any(str::is_empty) {
        issues.push(IndexIssue::EmptySegment(index.to_string()));
    } else if !index.split('.').all(|seg| seg.chars().all(|c| c.is_ascii_digit())) {
        issues.push(IndexIssue::NonNumericSegment(index.to_string()));
    }

    if let Some(parent) = parent {
        let extends_parent = index
            .strip_prefix(parent)
            .and_then(|rest| rest.strip_prefix('.'))
            .is_some_and(|rest| !rest.is_empty() && !rest.contains('.'));
        if !extends_parent {
            issues.push(IndexIssue::NotNested {
                parent: parent.to_string(),
                child: index.to_string(),
            });
        }
    }

    for child in &section.subsections {
        check_section(child, Some(index), seen, issues);
    }
}

/// A problem found by [`Outline::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexIssue {
    EmptySegment(String),
    NonNumericSegment(String),
    NotNested { parent: String, child: String },
    Duplicate(String),
}

impl fmt::Display for IndexIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySegment(i) => write!(f, "index {i:?} has an empty segment"),
            Self::NonNumericSegment(i) => write!(f, "index {i:?} has a non-numeric segment"),
            Self::NotNested { parent, child } => {
                write!(f, "index {child:?} does not extend parent {parent:?} by one segment")
            }
            Self::Duplicate(i) => write!(f, "index {i:?} appears more than once"),
        }
    }
}

/// Pre-order traversal produced by [`Outline::walk`].
pub struct Walk<'a> {
    stack: Vec<&'a Section>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a Section;

    fn next(&mut self) -> Option<Self::Item> {
        let section = self.stack.pop()?;
        self.stack.extend(section.subsections.iter().rev());
        Some(section)
    }
}

// ---------------------------------------------------------------------------
// Legacy outline
// ---------------------------------------------------------------------------

/// One entry of the flat legacy outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub index: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Flat, non-hierarchical predecessor of [`Outline`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyOutline {
    pub title: String,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

impl LegacyOutline {
    pub fn get_chapter_by_index(&self, index: u32) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.index == index)
    }

    /// Each chapter becomes a top-level leaf section.
    pub fn to_hierarchical(&self) -> Outline {
        let sections = self
            .chapters
            .iter()
            .map(|c| Section {
                index: c.index.to_string(),
                title: c.title.clone(),
                description: c.description.clone(),
                content: c.content.clone(),
                subsections: Vec::new(),
            })
            .collect();

        Outline::new(self.title.clone(), sections)
    }
}

impl From<LegacyOutline> for Outline {
    fn from(legacy: LegacyOutline) -> Self {
        legacy.to_hierarchical()
    }
}

// ---------------------------------------------------------------------------
// OutlineShape
// ---------------------------------------------------------------------------

/// Either outline shape, resolved once when a decoded document is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutlineShape {
    Hierarchical(Outline),
    Legacy(LegacyOutline),
}

impl OutlineShape {
    /// Detect the shape of a decoded document by its top-level keys.
    ///
    /// A `sections` key wins over `chapters` when both are present.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let Some(object) = value.as_object() else {
            return Err(ReportFlowError::parse("outline document is not a mapping"));
        };

        if object.contains_key("sections") {
            serde_json::from_value(value)
                .map(Self::Hierarchical)
                .map_err(|e| ReportFlowError::parse(format!("invalid hierarchical outline: {e}")))
        } else if object.contains_key("chapters") {
            serde_json::from_value(value)
                .map(Self::Legacy)
                .map_err(|e| ReportFlowError::parse(format!("invalid legacy outline: {e}")))
        } else {
            Err(ReportFlowError::parse(
                "outline document has neither `sections` nor `chapters`",
            ))
        }
    }

    /// Normalize to the hierarchical tree; legacy chapters become a depth-0 forest.
    pub fn into_outline(self) -> Outline {
        match self {
            Self::Hierarchical(outline) => outline,
            Self::Legacy(legacy) => legacy.into(),
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Outline {
        Outline::new(
            "Test Report",
            vec![
                Section::new("1", "Introduction", "Introduce the topic").with_subsections(vec![
                    Section::new("1.1", "Background", "Context"),
                    Section::new("1.2", "Problem", "Define the problem").with_subsections(vec![
                        Section::new("1.2.1", "Scope", "Limits"),
                    ]),
                ]),
                Section::new("2", "Methodology", "Describe the methods"),
            ],
        )
    }

    #[test]
    fn flatten_returns_leaves_in_document_order() {
        let outline = sample();
        let indices: Vec<&str> = outline.flatten().iter().map(|s| s.index.as_str()).collect();
        assert_eq!(indices, vec!["1.1", "1.2.1", "2"]);
        assert!(outline.flatten().iter().all(|s| s.is_leaf()));
    }

    #[test]
    fn flatten_is_idempotent() {
        let outline = sample();
        assert_eq!(outline.flatten(), outline.flatten());
        assert_eq!(outline.leaf_count(), 3);
    }

    #[test]
    fn flatten_empty_outline() {
        let outline = Outline::new("Empty", vec![]);
        assert!(outline.flatten().is_empty());
        assert_eq!(outline.walk().count(), 0);
    }

    #[test]
    fn walk_is_preorder_over_all_nodes() {
        let outline = sample();
        let indices: Vec<&str> = outline.walk().map(|s| s.index.as_str()).collect();
        assert_eq!(indices, vec!["1", "1.1", "1.2", "1.2.1", "2"]);
    }

    #[test]
    fn get_by_index_is_exact_string_match() {
        let outline = Outline::new(
            "R",
            vec![Section::new("1", "One", "").with_subsections(vec![
                Section::new("1.1", "First", ""),
                Section::new("1.10", "Tenth", ""),
            ])],
        );
        assert_eq!(outline.get_by_index("1.10").unwrap().title, "Tenth");
        assert_eq!(outline.get_by_index("1.1").unwrap().title, "First");
        assert!(outline.get_by_index("1.01").is_none());
        assert!(outline.get_by_index("3").is_none());
    }

    #[test]
    fn set_content_targets_one_section() {
        let mut outline = sample();
        assert!(outline.set_content("1.2.1", "body"));
        assert!(!outline.set_content("9", "nothing"));
        assert_eq!(outline.get_by_index("1.2.1").unwrap().content.as_deref(), Some("body"));
        assert!(outline.get_by_index("1.1").unwrap().content.is_none());
    }

    #[test]
    fn to_legacy_matches_flatten() {
        let outline = sample();
        let legacy = outline.to_legacy();
        let leaves = outline.flatten();
        assert_eq!(legacy.chapters.len(), leaves.len());
        for (i, (chapter, leaf)) in legacy.chapters.iter().zip(&leaves).enumerate() {
            assert_eq!(chapter.index as usize, i + 1);
            assert_eq!(chapter.title, leaf.title);
            assert_eq!(chapter.description, leaf.description);
        }
    }

    #[test]
    fn legacy_roundtrip_keeps_sequential_indices() {
        let legacy = LegacyOutline {
            title: "Report".into(),
            chapters: vec![
                Chapter {
                    index: 1,
                    title: "Intro".into(),
                    description: "Open".into(),
                    content: None,
                },
                Chapter {
                    index: 2,
                    title: "Methods".into(),
                    description: "How".into(),
                    content: Some("text".into()),
                },
            ],
        };

        let outline = legacy.to_hierarchical();
        assert!(outline.sections.iter().all(Section::is_leaf));
        assert_eq!(outline.sections[1].index, "2");

        let back = outline.to_legacy();
        assert_eq!(back, legacy);
    }

    #[test]
    fn heading_levels() {
        assert_eq!(heading_level("3.2.1"), 3);
        assert_eq!(heading_level("7"), 1);
        assert_eq!(heading_level("1.2.3.4.5.6.7.8"), 6);
        assert_eq!(Section::new("4.1", "", "").heading_level(), 2);
    }

    #[test]
    fn validate_reports_index_problems() {
        let outline = Outline::new(
            "R",
            vec![
                Section::new("1", "A", "").with_subsections(vec![
                    Section::new("2.1", "wrong parent", ""),
                    Section::new("1.x", "letters", ""),
                ]),
                Section::new("1", "dup", ""),
                Section::new("3.", "trailing dot", ""),
            ],
        );
        let issues = outline.validate();
        assert!(issues.contains(&IndexIssue::NotNested {
            parent: "1".into(),
            child: "2.1".into()
        }));
        assert!(issues.contains(&IndexIssue::NonNumericSegment("1.x".into())));
        assert!(issues.contains(&IndexIssue::Duplicate("1".into())));
        assert!(issues.contains(&IndexIssue::EmptySegment("3.".into())));
        assert!(sample().validate().is_empty());
    }

    #[test]
    fn shape_detects_hierarchical_and_legacy() {
        let hier = serde_json::json!({
            "title": "T",
            "sections": [{"index": "1", "title": "A", "description": "d",
                          "subsections": [{"index": "1.1", "title": "B", "description": "e"}]}]
        });
        let shape = OutlineShape::from_value(hier).unwrap();
        assert!(!shape.is_legacy());
        assert_eq!(shape.into_outline().flatten()[0].index, "1.1");

        let legacy = serde_json::json!({
            "title": "T",
            "chapters": [{"index": 1, "title": "Intro", "description": "d"}]
        });
        let shape = OutlineShape::from_value(legacy).unwrap();
        assert!(shape.is_legacy());
        assert_eq!(shape.into_outline().sections[0].index, "1");
    }

    #[test]
    fn shape_rejects_unknown_documents() {
        assert!(OutlineShape::from_value(serde_json::json!({"title": "T"})).is_err());
        assert!(OutlineShape::from_value(serde_json::json!([1, 2])).is_err());
    }

    #[test]
    fn section_index_accepts_integers_but_not_floats() {
        let s: Section =
            serde_json::from_str(r#"{"index": 3, "title": "T", "description": ""}"#).unwrap();
        assert_eq!(s.index, "3");

        let err = serde_json::from_str::<Section>(r#"{"index": 1.1, "title": "T"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn legacy_type_tag_is_ignored() {
        let s: Section = serde_json::from_str(
            r#"{"type": "section", "index": "1", "title": "T", "description": "", "content": null}"#,
        )
        .unwrap();
        assert!(s.content.is_none());
        assert!(s.is_leaf());
    }
}

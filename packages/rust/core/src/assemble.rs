//! Report assembly: merge written sections into the outline and render it.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use reportflow_artifacts::{
    IntermediateStore, MetadataTemplate, OutlineFormat, ReportMetadata, save_report,
};
use reportflow_flow::{Compartment, DEFAULT_TRANSITION, Node, SharedStore};
use reportflow_shared::{Outline, ReportFlowError, Result};

use crate::state::{Input, OutlineState, Output, Writing};

/// Intermediate category for the outline with leaf content filled in.
pub const WRITTEN_OUTLINE_CATEGORY: &str = "written_outline";

/// Markdown body: every node's heading at its index level, leaf content
/// beneath its heading.
pub fn render_body(outline: &Outline) -> String {
    let mut blocks = Vec::new();
    for section in outline.walk() {
        blocks.push(format!(
            "{} {}",
            "#".repeat(section.heading_level()),
            section.title
        ));
        if let Some(content) = section
            .content
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        {
            blocks.push(content.to_string());
        }
    }
    let mut body = blocks.join("\n\n");
    body.push('\n');
    body
}

/// Frontmatter block, blank line, body.
pub fn render_report(outline: &Outline, template: &MetadataTemplate) -> Result<String> {
    let frontmatter = template.render(&ReportMetadata::titled(&outline.title))?;
    Ok(format!("{frontmatter}\n\n{}", render_body(outline)))
}

pub struct AssembleJob {
    outline: Outline,
    report_path: Option<PathBuf>,
    output_dir: PathBuf,
}

/// Renders the report and writes it to disk.
pub struct Assemble {
    metadata: Arc<MetadataTemplate>,
    format: OutlineFormat,
}

impl Assemble {
    pub fn new(metadata: Arc<MetadataTemplate>, format: OutlineFormat) -> Self {
        Self { metadata, format }
    }
}

#[async_trait]
impl Node for Assemble {
    type Prepared = AssembleJob;
    type Output = String;

    fn name(&self) -> &str {
        "assemble"
    }

    fn prepare(&self, store: &SharedStore) -> Result<AssembleJob> {
        let input = store.require::<Input>("seed the store with the run input")?;
        let mut outline = store
            .require::<OutlineState>("design or load an outline first")?
            .outline
            .clone();
        let writing = store.require::<Writing>("run the writer first")?;
        if writing.sections.is_empty() {
            return Err(ReportFlowError::missing(Writing::NAME, "no sections were written"));
        }

        // Sections were written in flatten order; indices may repeat.
        let mut leaves = outline.flatten_mut();
        if leaves.len() != writing.sections.len() {
            warn!(
                leaves = leaves.len(),
                written = writing.sections.len(),
                "written sections do not match the outline leaves"
            );
        }
        for (i, leaf) in leaves.iter_mut().enumerate() {
            match writing.sections.get(i) {
                Some(written) => {
                    if written.index != leaf.index {
                        warn!(
                            leaf = %leaf.index,
                            written = %written.index,
                            "written section index differs from its leaf"
                        );
                    }
                    leaf.content = Some(written.content.clone());
                }
                None => warn!(index = %leaf.index, "leaf section has no content"),
            }
        }

        Ok(AssembleJob {
            outline,
            report_path: input.report_path.clone(),
            output_dir: input.output_dir.clone(),
        })
    }

    #[instrument(skip_all, fields(title = %job.outline.title))]
    async fn execute(&self, job: &AssembleJob) -> Result<String> {
        render_report(&job.outline, &self.metadata)
    }

    fn finalize(&self, store: &mut SharedStore, job: AssembleJob, report: String) -> Result<String> {
        let saved = save_report(
            &report,
            job.report_path.as_deref(),
            &job.output_dir,
            &job.outline.title,
        )?;
        let written = IntermediateStore::new(&job.output_dir).save_outline(
            WRITTEN_OUTLINE_CATEGORY,
            &job.outline,
            self.format,
        )?;
        info!(
            path = %saved.path.display(),
            size = saved.size_bytes,
            written_outline = %written.display(),
            "report assembled"
        );

        store.put(Output {
            report,
            path: saved.path,
            size_bytes: saved.size_bytes,
            sha256: saved.sha256,
        });
        Ok(DEFAULT_TRANSITION.into())
    }
}

//! The writing stage: one generation call per leaf section.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use reportflow_flow::{BatchNode, Compartment, DEFAULT_TRANSITION, SharedStore};
use reportflow_llm::{GenerationRequest, TextGenerator};
use reportflow_shared::{Outline, ReportFlowError, Result, Section};

use crate::prompts::{PromptCatalog, WRITER, excerpt};
use crate::state::{Analysis, Materials, OutlineState, WrittenSection, Writing};

/// Material characters sent with every section request.
pub const WRITER_MATERIAL_CHARS: usize = 10_000;

/// Characters of the preceding section passed as context.
pub const PREVIOUS_SECTION_CHARS: usize = 500;

/// Separator between titles in a section breadcrumb.
const BREADCRUMB_SEPARATOR: &str = " > ";

/// Context shared by every section of one report.
#[derive(Debug)]
pub struct ReportContext {
    pub report_title: String,
    pub analysis: String,
    pub materials: String,
}

/// One leaf to write.
#[derive(Debug, Clone)]
pub struct SectionJob {
    pub index: String,
    pub title: String,
    pub description: String,
    /// Titles from the top-level section down to this leaf.
    pub breadcrumb: String,
    pub context: Arc<ReportContext>,
}

/// Leaves of `outline` in flatten order, each with its title path.
pub fn leaf_breadcrumbs(outline: &Outline) -> Vec<(&Section, String)> {
    fn visit<'a>(section: &'a Section, trail: &mut Vec<&'a str>, out: &mut Vec<(&'a Section, String)>) {
        trail.push(&section.title);
        if section.is_leaf() {
            out.push((section, trail.join(BREADCRUMB_SEPARATOR)));
        } else {
            for child in &section.subsections {
                visit(child, trail, out);
            }
        }
        trail.pop();
    }

    let mut out = Vec::new();
    let mut trail = Vec::new();
    for section in &outline.sections {
        visit(section, &mut trail, &mut out);
    }
    out
}

/// Writes every leaf of the outline into the `writing` compartment.
pub struct Writer {
    generator: Arc<dyn TextGenerator>,
    prompts: Arc<PromptCatalog>,
}

impl Writer {
    pub fn new(generator: Arc<dyn TextGenerator>, prompts: Arc<PromptCatalog>) -> Self {
        Self { generator, prompts }
    }

    fn request(&self, job: &SectionJob, previous: Option<&WrittenSection>) -> Result<GenerationRequest> {
        let previous_summary = previous
            .map(|p| {
                format!(
                    "Previous section ({}): {}...",
                    p.title,
                    excerpt(&p.content, PREVIOUS_SECTION_CHARS)
                )
            })
            .unwrap_or_default();

        let prompt = self.prompts.render_user(
            WRITER,
            &[
                ("report_title", job.context.report_title.as_str()),
                ("breadcrumb", job.breadcrumb.as_str()),
                ("title", job.title.as_str()),
                ("index", job.index.as_str()),
                ("description", job.description.as_str()),
                ("analysis_summary", job.context.analysis.as_str()),
                ("previous_summary", previous_summary.as_str()),
                ("raw_content", job.context.materials.as_str()),
            ],
        )?;
        Ok(GenerationRequest::new(prompt).with_system(self.prompts.system(WRITER)?.trim()))
    }
}

#[async_trait]
impl BatchNode for Writer {
    type Item = SectionJob;
    type Output = WrittenSection;

    fn name(&self) -> &str {
        "writer"
    }

    fn prepare(&self, store: &SharedStore) -> Result<Vec<SectionJob>> {
        let outline = &store
            .require::<OutlineState>("design or load an outline first")?
            .outline;
        let materials = store.require::<Materials>("run load_materials first")?;
        let analysis = store
            .get::<Analysis>()
            .map(|a| a.summary.clone())
            .unwrap_or_default();

        let leaves = leaf_breadcrumbs(outline);
        if leaves.is_empty() {
            return Err(ReportFlowError::missing(
                OutlineState::NAME,
                "the outline has no leaf sections",
            ));
        }

        let context = Arc::new(ReportContext {
            report_title: outline.title.clone(),
            analysis,
            materials: excerpt(&materials.content, WRITER_MATERIAL_CHARS).to_string(),
        });
        Ok(leaves
            .into_iter()
            .map(|(leaf, breadcrumb)| SectionJob {
                index: leaf.index.clone(),
                title: leaf.title.clone(),
                description: leaf.description.clone(),
                breadcrumb,
                context: Arc::clone(&context),
            })
            .collect())
    }

    #[instrument(skip_all, fields(index = %job.index))]
    async fn execute_item(
        &self,
        job: &SectionJob,
        previous: Option<&WrittenSection>,
    ) -> Result<WrittenSection> {
        let request = self.request(job, previous)?;
        let content = self.generator.generate(&request).await?.into_text()?;
        if content.trim().is_empty() {
            return Err(ReportFlowError::malformed(
                format!("section {} came back empty", job.index),
                &content,
            ));
        }
        debug!(chars = content.chars().count(), "section written");
        Ok(WrittenSection {
            index: job.index.clone(),
            title: job.title.clone(),
            content,
        })
    }

    fn finalize(
        &self,
        store: &mut SharedStore,
        _jobs: Vec<SectionJob>,
        sections: Vec<WrittenSection>,
    ) -> Result<String> {
        for section in &sections {
            info!(
                index = %section.index,
                title = %section.title,
                chars = section.content.chars().count(),
                "section stored"
            );
        }
        store.put(Writing { sections });
        Ok(DEFAULT_TRANSITION.into())
    }
}

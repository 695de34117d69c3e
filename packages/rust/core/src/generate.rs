//! Stages that call the text generator once: analysis and outline design.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use reportflow_artifacts::{IntermediateStore, OutlineFormat};
use reportflow_flow::{Compartment, DEFAULT_TRANSITION, Node, SharedStore};
use reportflow_llm::{GenerationRequest, TextGenerator};
use reportflow_shared::{Outline, OutlineShape, ReportFlowError, Result};

use crate::load::log_index_issues;
use crate::prompts::{ANALYST, ARCHITECT, PromptCatalog, excerpt};
use crate::state::{Analysis, Input, Materials, OutlineState};

/// Material characters sent to the analyst.
pub const ANALYST_MATERIAL_CHARS: usize = 15_000;

/// Intermediate categories written by these stages.
pub const ANALYSIS_CATEGORY: &str = "analysis";
pub const OUTLINE_CATEGORY: &str = "outline";

/// A prepared generation call plus where to persist its result.
pub struct PreparedCall {
    pub request: GenerationRequest,
    topic: String,
    output_dir: PathBuf,
}

fn request_for(
    catalog: &PromptCatalog,
    agent: &str,
    vars: &[(&str, &str)],
) -> Result<GenerationRequest> {
    Ok(GenerationRequest::new(catalog.render_user(agent, vars)?)
        .with_system(catalog.system(agent)?.trim()))
}

// ---------------------------------------------------------------------------
// Analyst
// ---------------------------------------------------------------------------

/// Condenses the raw materials into a knowledge summary.
pub struct Analyst {
    generator: Arc<dyn TextGenerator>,
    prompts: Arc<PromptCatalog>,
}

impl Analyst {
    pub fn new(generator: Arc<dyn TextGenerator>, prompts: Arc<PromptCatalog>) -> Self {
        Self { generator, prompts }
    }
}

#[async_trait]
impl Node for Analyst {
    type Prepared = PreparedCall;
    type Output = String;

    fn name(&self) -> &str {
        "analyst"
    }

    fn prepare(&self, store: &SharedStore) -> Result<PreparedCall> {
        let input = store.require::<Input>("seed the store with the run input")?;
        let materials = store.require::<Materials>("run load_materials first")?;
        if materials.content.trim().is_empty() {
            return Err(ReportFlowError::missing(
                Materials::NAME,
                "no material content was loaded",
            ));
        }

        let request = request_for(
            &self.prompts,
            ANALYST,
            &[
                ("topic", input.topic.as_str()),
                ("raw_content", excerpt(&materials.content, ANALYST_MATERIAL_CHARS)),
            ],
        )?;
        Ok(PreparedCall {
            request,
            topic: input.topic.clone(),
            output_dir: input.output_dir.clone(),
        })
    }

    #[instrument(skip_all, fields(model = %self.generator.model()))]
    async fn execute(&self, call: &PreparedCall) -> Result<String> {
        let summary = self.generator.generate(&call.request).await?.into_text()?;
        if summary.trim().is_empty() {
            return Err(ReportFlowError::malformed("analysis summary is empty", &summary));
        }
        Ok(summary)
    }

    fn finalize(
        &self,
        store: &mut SharedStore,
        call: PreparedCall,
        summary: String,
    ) -> Result<String> {
        let path =
            IntermediateStore::new(&call.output_dir).save_text(ANALYSIS_CATEGORY, "md", &summary)?;
        info!(
            topic = %call.topic,
            chars = summary.chars().count(),
            path = %path.display(),
            "analysis summary generated"
        );
        store.put(Analysis { summary });
        Ok(DEFAULT_TRANSITION.into())
    }
}

// ---------------------------------------------------------------------------
// Architect
// ---------------------------------------------------------------------------

/// Designs the hierarchical outline from the topic and analysis.
pub struct Architect {
    generator: Arc<dyn TextGenerator>,
    prompts: Arc<PromptCatalog>,
    format: OutlineFormat,
}

impl Architect {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        prompts: Arc<PromptCatalog>,
        format: OutlineFormat,
    ) -> Self {
        Self {
            generator,
            prompts,
            format,
        }
    }
}

#[async_trait]
impl Node for Architect {
    type Prepared = PreparedCall;
    type Output = Outline;

    fn name(&self) -> &str {
        "architect"
    }

    fn prepare(&self, store: &SharedStore) -> Result<PreparedCall> {
        let input = store.require::<Input>("seed the store with the run input")?;
        let analysis = store.require::<Analysis>("run the analyst first")?;
        if analysis.summary.trim().is_empty() {
            return Err(ReportFlowError::missing(
                Analysis::NAME,
                "the analysis summary is empty",
            ));
        }

        let request = request_for(
            &self.prompts,
            ARCHITECT,
            &[
                ("topic", input.topic.as_str()),
                ("analysis_summary", analysis.summary.as_str()),
            ],
        )?
        .structured();
        Ok(PreparedCall {
            request,
            topic: input.topic.clone(),
            output_dir: input.output_dir.clone(),
        })
    }

    #[instrument(skip_all, fields(model = %self.generator.model()))]
    async fn execute(&self, call: &PreparedCall) -> Result<Outline> {
        let value = self.generator.generate(&call.request).await?.into_structured()?;
        let raw = value.to_string();
        let shape = OutlineShape::from_value(value)
            .map_err(|e| ReportFlowError::malformed(format!("unusable outline: {e}"), &raw))?;
        if shape.is_legacy() {
            warn!("generator returned a flat chapter list; converting");
        }

        let mut outline = shape.into_outline();
        if outline.leaf_count() == 0 {
            return Err(ReportFlowError::malformed("outline has no sections", &raw));
        }
        if outline.title.trim().is_empty() {
            outline.title = call.topic.clone();
        }
        Ok(outline)
    }

    fn finalize(
        &self,
        store: &mut SharedStore,
        call: PreparedCall,
        outline: Outline,
    ) -> Result<String> {
        log_index_issues(&outline);
        let path = IntermediateStore::new(&call.output_dir).save_outline(
            OUTLINE_CATEGORY,
            &outline,
            self.format,
        )?;

        info!(
            title = %outline.title,
            chapters = outline.sections.len(),
            leaves = outline.leaf_count(),
            path = %path.display(),
            "outline designed"
        );
        for section in outline.walk() {
            info!(index = %section.index, title = %section.title, "outline section");
        }

        store.put(OutlineState {
            outline,
            path: Some(path),
        });
        Ok(DEFAULT_TRANSITION.into())
    }
}

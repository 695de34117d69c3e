//! End-to-end report pipeline: materials → analysis → outline → sections → report.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use reportflow_artifacts::{IntermediateStore, MetadataTemplate, OutlineFormat};
use reportflow_flow::{
    Activate, BatchTask, Flow, FlowObserver, FlowReport, NodeId, RetryPolicy, SharedStore,
    SilentObserver, Sleeper, Task, TokioSleeper,
};
use reportflow_llm::TextGenerator;
use reportflow_shared::{AppConfig, ReportFlowError, Result};

use crate::assemble::Assemble;
use crate::generate::{Analyst, Architect};
use crate::load::{LoadMaterials, LoadOutline};
use crate::prompts::PromptCatalog;
use crate::state::{Input, Output};
use crate::summary::{LogSink, RunSummary, Summary, SummarySink};
use crate::writer::Writer;

/// Intermediate category holding the store of a failed run.
pub const FAILED_RUN_CATEGORY: &str = "failed_runs";

// ---------------------------------------------------------------------------
// Variants and settings
// ---------------------------------------------------------------------------

/// Which stages run after the outline is available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PipelineVariant {
    /// Write every section, assemble the report, print a summary.
    #[default]
    Full,
    /// Stop after the outline and print a summary.
    Minimal,
    /// Stop after the outline.
    OutlineOnly,
}

impl PipelineVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Minimal => "minimal",
            Self::OutlineOnly => "outline-only",
        }
    }

    /// Whether a run of this variant calls the text generator.
    ///
    /// With a user-supplied outline only the writing stage needs it.
    pub fn needs_generator(&self, from_outline: bool) -> bool {
        !from_outline || *self == Self::Full
    }
}

impl fmt::Display for PipelineVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineVariant {
    type Err = ReportFlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full" => Ok(Self::Full),
            "minimal" => Ok(Self::Minimal),
            "outline-only" | "outline_only" => Ok(Self::OutlineOnly),
            other => Err(ReportFlowError::validation(format!(
                "unknown pipeline variant {other:?}; use full, minimal or outline-only"
            ))),
        }
    }
}

/// Engine knobs for one pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub variant: PipelineVariant,
    /// Policy for the generating stages; local stages run once.
    pub retry: RetryPolicy,
    pub writer_concurrency: usize,
    pub outline_format: OutlineFormat,
}

impl PipelineSettings {
    pub fn new(variant: PipelineVariant) -> Self {
        Self {
            variant,
            retry: RetryPolicy::default(),
            writer_concurrency: 1,
            outline_format: OutlineFormat::Yaml,
        }
    }

    pub fn from_config(config: &AppConfig, variant: PipelineVariant) -> Result<Self> {
        let defaults = &config.defaults;
        Ok(Self {
            variant,
            retry: RetryPolicy::new(defaults.max_attempts)
                .with_base_delay(defaults.retry_base())
                .with_timeout(defaults.execute_timeout()),
            writer_concurrency: defaults.writer_concurrency.max(1),
            outline_format: defaults.outline_format.parse()?,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_writer_concurrency(mut self, concurrency: usize) -> Self {
        self.writer_concurrency = concurrency.max(1);
        self
    }

    pub fn with_outline_format(mut self, format: OutlineFormat) -> Self {
        self.outline_format = format;
        self
    }
}

/// Collaborators handed to the stages.
#[derive(Clone)]
pub struct Services {
    /// Absent when no API key is configured.
    pub generator: Option<Arc<dyn TextGenerator>>,
    pub prompts: Arc<PromptCatalog>,
    pub metadata: Arc<MetadataTemplate>,
    pub summary: Arc<dyn SummarySink>,
}

impl Services {
    pub fn new(prompts: PromptCatalog, metadata: MetadataTemplate) -> Self {
        Self {
            generator: None,
            prompts: Arc::new(prompts),
            metadata: Arc::new(metadata),
            summary: Arc::new(LogSink),
        }
    }

    /// Prompt and metadata templates named in `config`, built-ins otherwise.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let prompts = PromptCatalog::load_or_builtin(config.templates.prompts.as_deref().map(Path::new))?;
        let metadata = match config.templates.metadata.as_deref() {
            Some(path) => MetadataTemplate::load(Path::new(path))?,
            None => MetadataTemplate::builtin(),
        };
        Ok(Self::new(prompts, metadata))
    }

    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_summary_sink(mut self, sink: Arc<dyn SummarySink>) -> Self {
        self.summary = sink;
        self
    }

    fn require_generator(&self) -> Result<Arc<dyn TextGenerator>> {
        self.generator.clone().ok_or_else(|| {
            ReportFlowError::config("this pipeline calls the text generator, but no API key is set")
        })
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Result of a successful run.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub store: SharedStore,
    pub flow: FlowReport,
}

impl RunOutcome {
    pub fn summary(&self) -> RunSummary {
        RunSummary::from_store(&self.store)
    }

    pub fn report_path(&self) -> Option<&Path> {
        self.store.get::<Output>().map(|o| o.path.as_path())
    }

    pub fn elapsed(&self) -> Duration {
        self.flow.elapsed
    }
}

pub struct Pipeline {
    settings: PipelineSettings,
    services: Services,
    observer: Arc<dyn FlowObserver>,
    sleeper: Arc<dyn Sleeper>,
}

impl Pipeline {
    pub fn new(settings: PipelineSettings, services: Services) -> Self {
        Self {
            settings,
            services,
            observer: Arc::new(SilentObserver),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn FlowObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Wire the stages for `input` as one linear chain.
    ///
    /// An outline file in `input` replaces the analyst and architect.
    pub fn build_flow(&self, input: &Input) -> Result<Flow> {
        let from_outline = input.outline_path.is_some();
        let variant = self.settings.variant;
        let policy = self.settings.retry;
        let services = &self.services;

        let mut flow = Flow::new();
        let mut last = flow.add(Task::new(LoadMaterials).with_policy(RetryPolicy::once()));

        if from_outline {
            last = append(
                &mut flow,
                last,
                Task::new(LoadOutline).with_policy(RetryPolicy::once()),
            );
        } else {
            let generator = services.require_generator()?;
            last = append(
                &mut flow,
                last,
                Task::new(Analyst::new(generator.clone(), services.prompts.clone()))
                    .with_policy(policy),
            );
            last = append(
                &mut flow,
                last,
                Task::new(Architect::new(
                    generator,
                    services.prompts.clone(),
                    self.settings.outline_format,
                ))
                .with_policy(policy),
            );
        }

        match variant {
            PipelineVariant::Full => {
                let writer = Writer::new(services.require_generator()?, services.prompts.clone());
                last = append(
                    &mut flow,
                    last,
                    BatchTask::new(writer)
                        .with_policy(policy)
                        .with_concurrency(self.settings.writer_concurrency),
                );
                last = append(
                    &mut flow,
                    last,
                    Task::new(Assemble::new(
                        services.metadata.clone(),
                        self.settings.outline_format,
                    ))
                    .with_policy(RetryPolicy::once()),
                );
                append(&mut flow, last, self.summary_task());
            }
            PipelineVariant::Minimal => {
                append(&mut flow, last, self.summary_task());
            }
            PipelineVariant::OutlineOnly => {}
        }

        Ok(flow
            .with_observer(self.observer.clone())
            .with_sleeper(self.sleeper.clone()))
    }

    fn summary_task(&self) -> Task<Summary> {
        Task::new(Summary::new(self.services.summary.clone())).with_policy(RetryPolicy::once())
    }

    /// Run the pipeline against a fresh store seeded with `input`.
    ///
    /// On failure the partial store is saved as a `failed_runs` artifact
    /// before the error is returned.
    #[instrument(skip_all, fields(topic = %input.topic, variant = %self.settings.variant))]
    pub async fn run(&self, input: Input) -> Result<RunOutcome> {
        let run_id = Uuid::now_v7();
        info!(%run_id, materials = %input.materials_dir.display(), "starting report pipeline");

        let flow = self.build_flow(&input)?;
        let output_dir = input.output_dir.clone();
        let mut store = SharedStore::new().with(input);

        match flow.run(&mut store).await {
            Ok(report) => {
                info!(%run_id, elapsed_ms = report.elapsed.as_millis() as u64, "pipeline complete");
                Ok(RunOutcome {
                    run_id,
                    store,
                    flow: report,
                })
            }
            Err(err) => {
                if let Some(path) = persist_failed_run(&store, &output_dir, run_id, &err) {
                    warn!(%run_id, path = %path.display(), "partial run state saved");
                }
                Err(err)
            }
        }
    }
}

fn append(flow: &mut Flow, prev: NodeId, unit: impl Activate + 'static) -> NodeId {
    let id = flow.add(unit);
    flow.link(prev, id);
    id
}

/// Best effort: a failure to save is logged, never returned.
fn persist_failed_run(
    store: &SharedStore,
    output_dir: &Path,
    run_id: Uuid,
    err: &ReportFlowError,
) -> Option<PathBuf> {
    let snapshot = match store.snapshot() {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "could not snapshot run state");
            return None;
        }
    };
    let record = json!({
        "run_id": run_id,
        "error": err.to_string(),
        "written": store.written(),
        "state": snapshot,
    });
    IntermediateStore::new(output_dir)
        .save_json(FAILED_RUN_CATEGORY, &record)
        .map_err(|e| warn!(error = %e, "could not save run state"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Analysis, Materials, OutlineState, Writing};
    use crate::testing::ScriptedGenerator;
    use reportflow_flow::RecordingSleeper;
    use reportflow_llm::Generated;

    fn materials(root: &Path) -> PathBuf {
        let dir = root.join("materials");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.md"), "# Tides\n\nThe moon pulls the sea.\n").unwrap();
        std::fs::write(dir.join("b.txt"), "Spring and neap tides alternate.\n").unwrap();
        dir
    }

    fn outline_json() -> Generated {
        Generated::Structured(json!({
            "title": "Ocean Tides",
            "sections": [
                {"index": "1", "title": "Causes", "description": "Why tides happen",
                 "subsections": [
                    {"index": "1.1", "title": "Moon", "description": "Lunar pull"},
                    {"index": "1.2", "title": "Sun", "description": "Solar pull"}
                 ]},
                {"index": "2", "title": "Cycles", "description": "Spring and neap"}
            ]
        }))
    }

    fn settings(variant: PipelineVariant) -> PipelineSettings {
        PipelineSettings::new(variant)
            .with_retry(RetryPolicy::new(3).with_base_delay(Duration::from_millis(10)))
    }

    fn services(generator: Option<Arc<ScriptedGenerator>>) -> Services {
        let services = Services::new(
            PromptCatalog::builtin().unwrap(),
            MetadataTemplate::builtin(),
        );
        match generator {
            Some(g) => services.with_generator(g),
            None => services,
        }
    }

    #[tokio::test]
    async fn full_run_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(ScriptedGenerator::new([
            Ok(Generated::Text("Knowledge: moon and sun.".into())),
            Ok(outline_json()),
            Ok(Generated::Text("The moon dominates.".into())),
            Ok(Generated::Text("The sun helps.".into())),
            Ok(Generated::Text("Spring tides are larger.".into())),
        ]));
        let pipeline = Pipeline::new(settings(PipelineVariant::Full), services(Some(generator.clone())))
            .with_sleeper(Arc::new(RecordingSleeper::new()));

        let input = Input::new("Ocean Tides", materials(dir.path())).with_output_dir(dir.path().join("out"));
        let outcome = pipeline.run(input).await.unwrap();

        assert_eq!(
            outcome.flow.path(),
            ["load_materials", "analyst", "architect", "writer", "assemble", "summary"]
        );
        assert_eq!(
            outcome.store.written(),
            ["input", "materials", "analysis", "outline", "writing", "output"]
        );

        let report = std::fs::read_to_string(outcome.report_path().unwrap()).unwrap();
        assert!(report.starts_with("---\ntitle: Ocean Tides\n"));
        assert!(report.contains("# Causes\n\n## Moon\n\nThe moon dominates."));
        assert!(report.contains("# Cycles\n\nSpring tides are larger."));

        let summary = outcome.summary();
        assert_eq!(summary.materials_files, 2);
        assert_eq!(summary.sections_written, 3);
        assert_eq!(summary.leaf_sections, 3);

        // The analyst sees the materials; the architect asks for structure.
        let requests = generator.requests();
        assert!(requests[0].prompt.contains("The moon pulls the sea."));
        assert!(requests[1].structured);
        assert!(requests[3].prompt.contains("Previous section (Moon)"));
    }

    #[tokio::test]
    async fn transient_failure_is_retried_with_backoff() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(ScriptedGenerator::new([
            Err(ReportFlowError::Generation("503".into())),
            Err(ReportFlowError::Timeout { elapsed_ms: 5 }),
            Ok(Generated::Text("Knowledge.".into())),
            Ok(outline_json()),
        ]));
        let sleeper = Arc::new(RecordingSleeper::new());
        let pipeline = Pipeline::new(settings(PipelineVariant::OutlineOnly), services(Some(generator)))
            .with_sleeper(sleeper.clone());

        let input = Input::new("Ocean Tides", materials(dir.path())).with_output_dir(dir.path().join("out"));
        let outcome = pipeline.run(input).await.unwrap();

        assert_eq!(outcome.flow.path(), ["load_materials", "analyst", "architect"]);
        assert_eq!(
            sleeper.delays(),
            [Duration::from_millis(10), Duration::from_millis(20)]
        );
        assert_eq!(outcome.store.get::<Analysis>().unwrap().summary, "Knowledge.");
        assert!(!outcome.store.contains::<Output>());
    }

    #[tokio::test]
    async fn exhausted_retries_abort_and_save_partial_state() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let bad = || Ok(Generated::Structured(json!({"headline": "no sections"})));
        let generator = Arc::new(ScriptedGenerator::new([
            Ok(Generated::Text("Knowledge.".into())),
            bad(),
            bad(),
            bad(),
        ]));
        let pipeline = Pipeline::new(settings(PipelineVariant::Full), services(Some(generator.clone())))
            .with_sleeper(Arc::new(RecordingSleeper::new()));

        let input = Input::new("Ocean Tides", materials(dir.path())).with_output_dir(&out);
        let err = pipeline.run(input).await.unwrap_err();
        assert!(matches!(err, ReportFlowError::MalformedResponse { .. }));
        // analyst + three architect attempts, no writer calls
        assert_eq!(generator.requests().len(), 4);

        let saved: serde_json::Value = IntermediateStore::new(&out)
            .load_latest_json(FAILED_RUN_CATEGORY)
            .unwrap();
        assert_eq!(saved["written"], json!(["input", "materials", "analysis"]));
        assert_eq!(saved["state"]["analysis"]["summary"], "Knowledge.");
    }

    #[tokio::test]
    async fn outline_file_skips_generation() {
        let dir = tempfile::tempdir().unwrap();
        let outline_path = dir.path().join("outline.yaml");
        std::fs::write(
            &outline_path,
            "title: Given\nsections:\n  - index: '1'\n    title: Only\n    description: d\n",
        )
        .unwrap();

        assert!(!PipelineVariant::Minimal.needs_generator(true));
        let pipeline = Pipeline::new(settings(PipelineVariant::Minimal), services(None));
        let input = Input::new("Ignored", materials(dir.path()))
            .with_output_dir(dir.path().join("out"))
            .with_outline(&outline_path);
        let outcome = pipeline.run(input).await.unwrap();

        assert_eq!(outcome.flow.path(), ["load_materials", "load_outline", "summary"]);
        let state = outcome.store.get::<OutlineState>().unwrap();
        assert_eq!(state.outline.title, "Given");
        assert!(outcome.store.get::<Materials>().is_some());
    }

    #[tokio::test]
    async fn outline_file_full_run_uses_writer_only() {
        let dir = tempfile::tempdir().unwrap();
        let outline_path = dir.path().join("outline.json");
        std::fs::write(
            &outline_path,
            r#"{"title": "Given", "chapters": [{"index": 1, "title": "One", "description": "d"}]}"#,
        )
        .unwrap();
        let generator = Arc::new(ScriptedGenerator::new([Ok(Generated::Text("Body.".into()))]));

        let pipeline = Pipeline::new(settings(PipelineVariant::Full), services(Some(generator)));
        let input = Input::new("Ignored", materials(dir.path()))
            .with_output_dir(dir.path().join("out"))
            .with_outline(&outline_path)
            .with_report_path(dir.path().join("given.md"));
        let outcome = pipeline.run(input).await.unwrap();

        assert_eq!(
            outcome.flow.path(),
            ["load_materials", "load_outline", "writer", "assemble", "summary"]
        );
        assert_eq!(outcome.report_path(), Some(dir.path().join("given.md").as_path()));
        assert_eq!(outcome.store.get::<Writing>().unwrap().sections.len(), 1);
        assert!(!outcome.store.contains::<Analysis>());
    }

    #[test]
    fn generating_variants_need_a_client() {
        let pipeline = Pipeline::new(settings(PipelineVariant::Full), services(None));
        let err = pipeline.build_flow(&Input::new("T", "m")).unwrap_err();
        assert!(matches!(err, ReportFlowError::Config { .. }));

        let err = pipeline
            .build_flow(&Input::new("T", "m").with_outline("o.yaml"))
            .unwrap_err();
        assert!(matches!(err, ReportFlowError::Config { .. }));
    }

    #[test]
    fn settings_follow_config() {
        let mut config = AppConfig::default();
        config.defaults.max_attempts = 5;
        config.defaults.retry_base_ms = 250;
        config.defaults.outline_format = "json".into();
        config.defaults.writer_concurrency = 0;

        let settings = PipelineSettings::from_config(&config, PipelineVariant::Minimal).unwrap();
        assert_eq!(settings.retry.attempts(), 5);
        assert_eq!(settings.retry.backoff(1), Duration::from_millis(500));
        assert_eq!(settings.outline_format, OutlineFormat::Json);
        assert_eq!(settings.writer_concurrency, 1);

        config.defaults.outline_format = "xml".into();
        assert!(PipelineSettings::from_config(&config, PipelineVariant::Full).is_err());
    }

    #[test]
    fn variant_parsing() {
        assert_eq!("outline-only".parse::<PipelineVariant>().unwrap(), PipelineVariant::OutlineOnly);
        assert_eq!(PipelineVariant::default().to_string(), "full");
        assert!("partial".parse::<PipelineVariant>().is_err());
    }
}

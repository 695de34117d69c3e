//! End-of-run summary.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use reportflow_flow::{DEFAULT_TRANSITION, Node, SharedStore};
use reportflow_shared::Result;

use crate::state::{Input, Materials, OutlineState, Output, Writing};

const RULE_WIDTH: usize = 60;

/// What a run produced, read from the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub topic: String,
    pub materials_files: usize,
    pub outline_title: Option<String>,
    pub outline_path: Option<PathBuf>,
    pub leaf_sections: usize,
    pub sections_written: usize,
    pub report_path: Option<PathBuf>,
}

impl RunSummary {
    pub fn from_store(store: &SharedStore) -> Self {
        let outline = store.get::<OutlineState>();
        Self {
            topic: store
                .get::<Input>()
                .map(|i| i.topic.clone())
                .unwrap_or_default(),
            materials_files: store.get::<Materials>().map_or(0, |m| m.file_count),
            outline_title: outline.map(|o| o.outline.title.clone()),
            outline_path: outline.and_then(|o| o.path.clone()),
            leaf_sections: outline.map_or(0, |o| o.outline.leaf_count()),
            sections_written: store.get::<Writing>().map_or(0, |w| w.sections.len()),
            report_path: store.get::<Output>().map(|o| o.path.clone()),
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(RULE_WIDTH);
        let na = |p: &Option<PathBuf>| {
            p.as_ref()
                .map_or_else(|| "N/A".to_string(), |p| p.display().to_string())
        };
        writeln!(f, "{rule}")?;
        writeln!(f, "REPORT RUN SUMMARY")?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Topic:             {}", self.topic)?;
        writeln!(f, "Materials loaded:  {} files", self.materials_files)?;
        writeln!(
            f,
            "Outline:           {}",
            self.outline_title.as_deref().unwrap_or("N/A")
        )?;
        writeln!(f, "Outline file:      {}", na(&self.outline_path))?;
        writeln!(
            f,
            "Sections written:  {}/{}",
            self.sections_written, self.leaf_sections
        )?;
        writeln!(f, "Report saved to:   {}", na(&self.report_path))?;
        write!(f, "{rule}")
    }
}

/// Receives the summary at the end of a run.
pub trait SummarySink: Send + Sync {
    fn publish(&self, summary: &RunSummary);
}

/// Logs the summary through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl SummarySink for LogSink {
    fn publish(&self, summary: &RunSummary) {
        info!(
            topic = %summary.topic,
            materials = summary.materials_files,
            outline = summary.outline_title.as_deref().unwrap_or(""),
            written = summary.sections_written,
            leaves = summary.leaf_sections,
            report = ?summary.report_path,
            "run summary"
        );
    }
}

/// Publishes a [`RunSummary`]; writes no compartment.
pub struct Summary {
    sink: Arc<dyn SummarySink>,
}

impl Summary {
    pub fn new(sink: Arc<dyn SummarySink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Node for Summary {
    type Prepared = RunSummary;
    type Output = ();

    fn name(&self) -> &str {
        "summary"
    }

    fn prepare(&self, store: &SharedStore) -> Result<RunSummary> {
        Ok(RunSummary::from_store(store))
    }

    async fn execute(&self, _summary: &RunSummary) -> Result<()> {
        Ok(())
    }

    fn finalize(&self, _store: &mut SharedStore, summary: RunSummary, _: ()) -> Result<String> {
        self.sink.publish(&summary);
        Ok(DEFAULT_TRANSITION.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Captured(Mutex<Vec<RunSummary>>);

    impl SummarySink for Captured {
        fn publish(&self, summary: &RunSummary) {
            self.0.lock().unwrap().push(summary.clone());
        }
    }

    #[test]
    fn summary_of_partial_run() {
        let store = SharedStore::new().with(Input::new("Tides", "m"));
        let summary = RunSummary::from_store(&store);
        assert_eq!(summary.topic, "Tides");
        assert_eq!(summary.sections_written, 0);

        let text = summary.to_string();
        assert!(text.contains("Outline:           N/A"));
        assert!(text.contains("Report saved to:   N/A"));
        assert!(text.starts_with(&"=".repeat(RULE_WIDTH)));
    }

    #[tokio::test]
    async fn publishes_to_sink_without_writing() {
        let sink = Arc::new(Captured::default());
        let node = Summary::new(sink.clone());
        let mut store = SharedStore::new().with(Input::new("Tides", "m"));

        let prepared = node.prepare(&store).unwrap();
        node.execute(&prepared).await.unwrap();
        node.finalize(&mut store, prepared, ()).unwrap();

        assert_eq!(sink.0.lock().unwrap().len(), 1);
        assert_eq!(store.written(), ["input"]);
    }
}

//! Terminal progress for pipeline runs.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use reportflow_core::{RunSummary, SummarySink};
use reportflow_flow::FlowObserver;
use reportflow_shared::ReportFlowError;

/// Spinner label for a stage.
fn stage_label(node: &str) -> &str {
    match node {
        "load_materials" => "Loading materials",
        "load_outline" => "Loading outline",
        "analyst" => "Analyzing materials",
        "architect" => "Designing outline",
        "writer" => "Writing sections",
        "assemble" => "Assembling report",
        "summary" => "Summarizing",
        other => other,
    }
}

/// CLI progress reporter using an indicatif spinner.
pub(crate) struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    pub(crate) fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    pub(crate) fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl FlowObserver for CliProgress {
    fn node_started(&self, node: &str) {
        self.spinner.set_message(format!("{}...", stage_label(node)));
    }

    fn retrying(&self, node: &str, attempt: u32, delay: Duration, error: &ReportFlowError) {
        self.spinner.suspend(|| {
            println!(
                "  ! {} failed (attempt {attempt}), retrying in {:.1}s: {error}",
                stage_label(node),
                delay.as_secs_f64()
            );
        });
    }

    fn item_finished(&self, node: &str, completed: usize, total: usize) {
        self.spinner
            .set_message(format!("{} [{completed}/{total}]", stage_label(node)));
    }

    fn node_finished(&self, node: &str, _transition: &str) {
        self.spinner
            .suspend(|| println!("  ✓ {}", stage_label(node)));
    }

    fn node_failed(&self, node: &str, error: &ReportFlowError) {
        self.spinner
            .suspend(|| println!("  ✗ {}: {error}", stage_label(node)));
    }
}

impl SummarySink for CliProgress {
    fn publish(&self, summary: &RunSummary) {
        self.spinner.suspend(|| println!("\n{summary}"));
    }
}

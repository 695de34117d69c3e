//! Report pipeline for reportflow.
//!
//! Stages are flow units over a shared store: materials are loaded, analyzed
//! and turned into an outline, every leaf section is written, and the result
//! is assembled into one markdown report. [`Pipeline`] wires the stages for
//! a [`PipelineVariant`] and runs them.

pub mod assemble;
pub mod generate;
pub mod load;
pub mod pipeline;
pub mod prompts;
pub mod state;
pub mod summary;
pub mod writer;

#[cfg(test)]
mod testing;

pub use pipeline::{Pipeline, PipelineSettings, PipelineVariant, RunOutcome, Services};
pub use prompts::PromptCatalog;
pub use state::Input;
pub use summary::{LogSink, RunSummary, SummarySink};

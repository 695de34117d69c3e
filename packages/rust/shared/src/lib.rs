//! Shared types, error model, and configuration for reportflow.
//!
//! This crate is the foundation depended on by all other reportflow crates.
//! It provides:
//! - [`ReportFlowError`]: the unified error type
//! - The outline tree ([`Outline`], [`Section`], [`LegacyOutline`], [`OutlineShape`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod outline;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, LlmConfig, TemplatesConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{PREVIEW_CHARS, ReportFlowError, Result, preview};
pub use outline::{
    Chapter, IndexIssue, LegacyOutline, MAX_HEADING_LEVEL, Outline, OutlineShape, Section,
    heading_level,
};

//! Application configuration for reportflow.
//!
//! User config lives at `~/.reportflow/reportflow.toml`.
//! CLI flags override environment variables, which override config file
//! values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ReportFlowError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "reportflow.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".reportflow";

/// Environment variable overriding the configured model.
pub const MODEL_ENV: &str = "LLM_MODEL";

/// Environment variable overriding the configured API base URL.
pub const BASE_URL_ENV: &str = "LLM_BASE_URL";

// ---------------------------------------------------------------------------
// Config structs (matching reportflow.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Text-generation client settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Prompt and metadata template locations.
    #[serde(default)]
    pub templates: TemplatesConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Root directory for reports and intermediate artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Directory scanned for source materials.
    #[serde(default = "default_materials_dir")]
    pub materials_dir: String,

    /// Format for saved outlines: "yaml" or "json".
    #[serde(default = "default_outline_format")]
    pub outline_format: String,

    /// Execute attempts per unit (first try included).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff unit in ms; attempt `n` waits `2^n` units before retrying.
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    /// Optional deadline for each execute attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute_timeout_secs: Option<u64>,

    /// Sections written concurrently. 1 keeps previous-section context.
    #[serde(default = "default_writer_concurrency")]
    pub writer_concurrency: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            materials_dir: default_materials_dir(),
            outline_format: default_outline_format(),
            max_attempts: default_max_attempts(),
            retry_base_ms: default_retry_base_ms(),
            execute_timeout_secs: None,
            writer_concurrency: default_writer_concurrency(),
        }
    }
}

impl DefaultsConfig {
    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    pub fn execute_timeout(&self) -> Option<Duration> {
        self.execute_timeout_secs.map(Duration::from_secs)
    }
}

fn default_output_dir() -> String {
    "./output".into()
}
fn default_materials_dir() -> String {
    "./materials".into()
}
fn default_outline_format() -> String {
    "yaml".into()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_base_ms() -> u64 {
    1_000
}
fn default_writer_concurrency() -> usize {
    1
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// OpenAI-compatible API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum output tokens per request.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// HTTP request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    "LLM_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    4_000
}
fn default_timeout_secs() -> u64 {
    60
}

/// `[templates]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// TOML prompt catalog replacing the built-in prompts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<String>,

    /// YAML frontmatter template for assembled reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.reportflow/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ReportFlowError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.reportflow/reportflow.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    let mut config = if path.exists() {
        load_config_from(&path)?
    } else {
        tracing::debug!(?path, "config file not found, using defaults");
        AppConfig::default()
    };

    config.apply_env(|name| std::env::var(name).ok());
    Ok(config)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ReportFlowError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ReportFlowError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ReportFlowError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ReportFlowError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ReportFlowError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

impl AppConfig {
    /// Apply `LLM_MODEL` / `LLM_BASE_URL` overrides from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(model) = lookup(MODEL_ENV).filter(|v| !v.is_empty()) {
            self.llm.model = model;
        }
        if let Some(base_url) = lookup(BASE_URL_ENV).filter(|v| !v.is_empty()) {
            self.llm.base_url = base_url;
        }
    }

    /// Read the API key from the configured env var.
    pub fn api_key(&self) -> Result<String> {
        let var_name = &self.llm.api_key_env;
        match std::env::var(var_name) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Err(ReportFlowError::config(format!(
                "API key not found. Set the {var_name} environment variable."
            ))),
        }
    }
}

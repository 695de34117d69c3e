//! Prompt catalog for the generating stages.
//!
//! A [`PromptCatalog`] is built once (built-in defaults or a TOML file) and
//! handed to the stages that call the generator. Editing the file has no
//! effect until [`PromptCatalog::reload`] is called.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Deserialize;
use tracing::{debug, instrument};

use reportflow_shared::{ReportFlowError, Result};

const BUILTIN_PROMPTS: &str = include_str!("../prompts/default.toml");

/// Stage names with prompts in the catalog.
pub const ANALYST: &str = "analyst";
pub const ARCHITECT: &str = "architect";
pub const WRITER: &str = "writer";

/// System prompt and user-prompt template for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AgentPrompts {
    pub system_prompt: String,
    pub user_prompt_template: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptCatalog {
    agents: BTreeMap<String, AgentPrompts>,
    source: Option<PathBuf>,
}

impl PromptCatalog {
    /// The prompts compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_PROMPTS)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let agents: BTreeMap<String, AgentPrompts> = toml::from_str(text)
            .map_err(|e| ReportFlowError::config(format!("invalid prompt catalog: {e}")))?;
        Ok(Self {
            agents,
            source: None,
        })
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ReportFlowError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path).map_err(|e| ReportFlowError::io(path, e))?;
        let mut catalog = Self::from_toml_str(&text)?;
        catalog.source = Some(path.to_path_buf());
        debug!(agents = catalog.agents.len(), "prompt catalog loaded");
        Ok(catalog)
    }

    /// `path` if given, otherwise the built-in catalog.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Self::builtin(),
        }
    }

    /// Re-read the source file. The built-in catalog is left unchanged.
    pub fn reload(&mut self) -> Result<()> {
        if let Some(path) = self.source.clone() {
            *self = Self::load(&path)?;
        }
        Ok(())
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn agent(&self, name: &str) -> Result<&AgentPrompts> {
        self.agents.get(name).ok_or_else(|| {
            ReportFlowError::config(format!("prompt catalog has no `{name}` section"))
        })
    }

    pub fn system(&self, agent: &str) -> Result<&str> {
        Ok(&self.agent(agent)?.system_prompt)
    }

    /// The agent's user prompt with `{name}` placeholders filled from `vars`.
    pub fn render_user(&self, agent: &str, vars: &[(&str, &str)]) -> Result<String> {
        let template = &self.agent(agent)?.user_prompt_template;
        render(template, vars).map_err(|missing| {
            ReportFlowError::config(format!(
                "prompt `{agent}` uses {{{missing}}} but no value was supplied"
            ))
        })
    }
}

/// Fill `{name}` placeholders; `{{` and `}}` are literal braces.
///
/// Returns the name of the first placeholder without a value.
pub fn render(template: &str, vars: &[(&str, &str)]) -> std::result::Result<String, String> {
    static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex")
    });

    let mut missing = None;
    let rendered = PLACEHOLDER_RE.replace_all(template, |caps: &Captures<'_>| {
        match caps.get(1) {
            None if &caps[0] == "{{" => "{".to_string(),
            None => "}".to_string(),
            Some(name) => match vars.iter().find(|(k, _)| *k == name.as_str()) {
                Some((_, v)) => (*v).to_string(),
                None => {
                    missing.get_or_insert_with(|| name.as_str().to_string());
                    String::new()
                }
            },
        }
    });

    match missing {
        Some(name) => Err(name),
        None => Ok(rendered.into_owned()),
    }
}

/// At most `max_chars` characters from the start of `text`.
pub fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

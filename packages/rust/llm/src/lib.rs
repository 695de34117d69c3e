//! Text-generation client abstraction.
//!
//! Pipeline units depend only on [`TextGenerator`]; [`OpenAiClient`] is the
//! production implementation against an OpenAI-compatible chat endpoint.
//! Clients never retry internally: retries belong to the flow engine.

mod openai;

use async_trait::async_trait;
use serde_json::Value;

use reportflow_shared::{ReportFlowError, Result};

pub use openai::{ClientSettings, OpenAiClient};

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// One generation call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationRequest {
    /// Optional system instruction sent before the prompt.
    pub system: Option<String>,
    /// The user prompt.
    pub prompt: String,
    /// Ask for a JSON object and parse it.
    pub structured: bool,
    /// Per-call overrides of the client defaults.
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Request structured (JSON object) output.
    pub fn structured(mut self) -> Self {
        self.structured = true;
        self
    }
}

/// What a generation call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Generated {
    Text(String),
    Structured(Value),
}

impl Generated {
    /// The free text, or a `MalformedResponse` if structured data came back.
    pub fn into_text(self) -> Result<String> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Structured(value) => Err(ReportFlowError::malformed(
                "expected free text, got structured data",
                &value.to_string(),
            )),
        }
    }

    /// The structured value; free text is parsed as a JSON object.
    pub fn into_structured(self) -> Result<Value> {
        match self {
            Self::Structured(value) => Ok(value),
            Self::Text(text) => parse_structured(&text),
        }
    }
}

/// A client that turns prompts into text or structured data.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Model used when a request does not override it.
    fn model(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<Generated>;
}

// ---------------------------------------------------------------------------
// Structured output parsing
// ---------------------------------------------------------------------------

/// Parse generated text as a JSON object, tolerating a markdown code fence.
pub fn parse_structured(text: &str) -> Result<Value> {
    let body = strip_code_fence(text);
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ReportFlowError::malformed(format!("invalid JSON: {e}"), text))?;

    if !value.is_object() {
        return Err(ReportFlowError::malformed("expected a JSON object", text));
    }
    Ok(value)
}

/// Remove a surrounding ```` ``` ```` / ```` ```json ```` fence, if any.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json", "JSON", ...) on the opening line.
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json_object() {
        let value = parse_structured(r#"{"title": "T", "sections": []}"#).unwrap();
        assert_eq!(value["title"], "T");
    }

    #[test]
    fn parses_fenced_json() {
        let text = "```json\n{\"title\": \"Fenced\"}\n```";
        assert_eq!(parse_structured(text).unwrap()["title"], "Fenced");

        let bare = "```\n{\"a\": 1}\n```\n";
        assert_eq!(parse_structured(bare).unwrap()["a"], 1);
    }

    #[test]
    fn rejects_non_json_with_preview() {
        let err = parse_structured("Sure! Here is your outline:").unwrap_err();
        match err {
            ReportFlowError::MalformedResponse { preview, .. } => {
                assert!(preview.starts_with("Sure!"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_non_object_json() {
        assert!(matches!(
            parse_structured("[1, 2, 3]"),
            Err(ReportFlowError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn generated_conversions() {
        assert_eq!(Generated::Text("hi".into()).into_text().unwrap(), "hi");
        assert!(Generated::Structured(serde_json::json!({})).into_text().is_err());
        assert_eq!(
            Generated::Text("{\"k\": true}".into())
                .into_structured()
                .unwrap()["k"],
            true
        );
    }

    #[test]
    fn request_builder() {
        let req = GenerationRequest::new("prompt").with_system("sys").structured();
        assert_eq!(req.prompt, "prompt");
        assert_eq!(req.system.as_deref(), Some("sys"));
        assert!(req.structured);
        assert!(req.model.is_none());
    }
}

//! OpenAI-compatible `chat/completions` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use reportflow_shared::{LlmConfig, PREVIEW_CHARS, ReportFlowError, Result, preview};

use crate::{GenerationRequest, Generated, TextGenerator, parse_structured};

/// User-Agent string for generation requests.
const USER_AGENT: &str = concat!("reportflow/", env!("CARGO_PKG_VERSION"));

/// Endpoint path appended to the configured base URL.
const COMPLETIONS_PATH: &str = "chat/completions";

/// Connection settings and request defaults.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl ClientSettings {
    pub fn from_config(config: &LlmConfig, api_key: impl Into<String>) -> Self {
        Self {
            base_url: config.base_url.clone(),
            api_key: api_key.into(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// [`TextGenerator`] backed by an OpenAI-compatible HTTP API.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: Client,
    endpoint: Url,
    settings: ClientSettings,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

impl OpenAiClient {
    pub fn new(settings: ClientSettings) -> Result<Self> {
        let endpoint = completions_url(&settings.base_url)?;
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ReportFlowError::Generation(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint,
            settings,
        })
    }

    pub fn from_config(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        Self::new(ClientSettings::from_config(config, api_key))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post(&self, body: &ChatRequest<'_>) -> Result<String> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.settings.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            let message = format!(
                "{}: HTTP {status}: {}",
                self.endpoint,
                preview(text.trim(), PREVIEW_CHARS)
            );
            return Err(if is_retryable_status(status) {
                ReportFlowError::Generation(message)
            } else {
                ReportFlowError::config(message)
            });
        }
        Ok(text)
    }

    fn transport_error(&self, e: reqwest::Error) -> ReportFlowError {
        if e.is_timeout() {
            ReportFlowError::Timeout {
                elapsed_ms: u64::try_from(self.settings.timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else {
            ReportFlowError::Generation(format!("{}: {e}", self.endpoint))
        }
    }
}

/// Server failures, timeouts and rate limits; other client errors are final.
fn is_retryable_status(status: StatusCode) -> bool {
    !status.is_client_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    fn model(&self) -> &str {
        &self.settings.model
    }

    #[instrument(skip_all, fields(structured = request.structured))]
    async fn generate(&self, request: &GenerationRequest) -> Result<Generated> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatRequest {
            model: request.model.as_deref().unwrap_or(&self.settings.model),
            messages,
            temperature: request.temperature.unwrap_or(self.settings.temperature),
            max_tokens: request.max_tokens.unwrap_or(self.settings.max_tokens),
            response_format: request.structured.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        debug!(model = body.model, prompt_chars = request.prompt.len(), "sending completion request");
        let raw = self.post(&body).await?;

        let parsed: ChatResponse = serde_json::from_str(&raw)
            .map_err(|e| ReportFlowError::malformed(format!("unreadable completion body: {e}"), &raw))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ReportFlowError::malformed("completion has no message content", &raw))?;

        debug!(response_chars = content.len(), "completion received");

        if request.structured {
            parse_structured(&content).map(Generated::Structured)
        } else {
            Ok(Generated::Text(content))
        }
    }
}

/// `{base_url}/chat/completions`, keeping any path prefix such as `/v1`.
fn completions_url(base_url: &str) -> Result<Url> {
    let mut base = Url::parse(base_url)
        .map_err(|e| ReportFlowError::config(format!("invalid base URL {base_url:?}: {e}")))?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(COMPLETIONS_PATH)
        .map_err(|e| ReportFlowError::config(format!("invalid base URL {base_url:?}: {e}")))
}

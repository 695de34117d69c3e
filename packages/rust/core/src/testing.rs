//! Test doubles shared by the stage tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use reportflow_llm::{Generated, GenerationRequest, TextGenerator};
use reportflow_shared::{ReportFlowError, Result};

/// Replays canned responses in order and records every request.
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<Generated>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new(responses: impl IntoIterator<Item = Result<Generated>>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generated> {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ReportFlowError::Generation("script exhausted".into())))
    }
}

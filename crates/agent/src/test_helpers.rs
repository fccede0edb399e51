//! Shared test helpers for generator tests.

use std::sync::Mutex;
use unillm_core::error::ProviderError;
use unillm_core::provider::{
    FinishReason, Provider, ProviderRequest, ProviderResponse, ResponseMeta, Usage,
};
use unillm_core::tool::{ToolArguments, ToolCall};

/// A mock provider that plays back a script of responses.
///
/// Each call to `complete` returns the next entry. Once the script runs
/// out, the last entry is repeated. Every request is recorded.
pub struct ScriptedProvider {
    script: Vec<Result<ProviderResponse, ProviderError>>,
    call_count: Mutex<usize>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        assert!(!script.is_empty(), "ScriptedProvider needs at least one entry");
        Self {
            script,
            call_count: Mutex::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn responses(responses: Vec<ProviderResponse>) -> Self {
        Self::new(responses.into_iter().map(Ok).collect())
    }

    /// Create a provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::responses(vec![make_text_response(text)])
    }

    pub fn failing(error: ProviderError) -> Self {
        Self::new(vec![Err(error)])
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let mut count = self.call_count.lock().unwrap();
        let index = (*count).min(self.script.len() - 1);
        *count += 1;
        self.script[index].clone()
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        text: text.into(),
        finish_reason: FinishReason::Stop,
        tool_calls: vec![],
        usage: Usage::new(10, 5),
        meta: ResponseMeta::new("resp_text", "mock-model"),
    }
}

/// Create a response requesting tool calls.
pub fn make_tool_call_response(tool_calls: Vec<ToolCall>, text: &str) -> ProviderResponse {
    ProviderResponse {
        text: text.into(),
        finish_reason: FinishReason::ToolCalls,
        tool_calls,
        usage: Usage::new(10, 5),
        meta: ResponseMeta::new("resp_tools", "mock-model"),
    }
}

/// Helper to create a tool call.
pub fn make_tool_call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
    let arguments: ToolArguments = args.as_object().cloned().unwrap_or_default();
    ToolCall::new(id, name, arguments)
}

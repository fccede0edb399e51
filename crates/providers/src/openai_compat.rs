//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Mistral, Groq, Ollama, vLLM and any
//! endpoint exposing `/chat/completions`.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Tool use / function calling, including tool choice
//! - Embeddings via `/embeddings`

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, trace};
use unillm_core::error::ProviderError;
use unillm_core::message::Message;
use unillm_core::provider::*;
use unillm_core::tool::ToolCall;

use crate::http::{LineBuffer, build_client, check_status, json_body, sse_data, transport_error};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// An OpenAI-compatible LLM provider.
///
/// This handles the vast majority of LLM providers since most expose
/// an OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: build_client(REQUEST_TIMEOUT)?,
        })
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an OpenRouter provider (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    pub fn mistral(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("mistral", "https://api.mistral.ai/v1", api_key)
    }

    pub fn groq(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("groq", "https://api.groq.com/openai/v1", api_key)
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Result<Self, ProviderError> {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert system prompts and messages to OpenAI API format.
    ///
    /// A tool result message expands into one `tool` message per result.
    fn to_api_messages(system_prompts: &[String], messages: &[Message]) -> Vec<ApiMessage> {
        let mut out: Vec<ApiMessage> = system_prompts
            .iter()
            .map(|p| ApiMessage::text("system", p))
            .collect();

        for message in messages {
            match message {
                Message::User { content } => out.push(ApiMessage::text("user", content)),
                Message::System { content } => out.push(ApiMessage::text("system", content)),
                Message::Assistant {
                    content,
                    tool_calls,
                } => {
                    let mut api = ApiMessage::text("assistant", content);
                    if !tool_calls.is_empty() {
                        api.tool_calls = Some(
                            tool_calls
                                .iter()
                                .map(|tc| ApiToolCall {
                                    id: tc.id.clone(),
                                    r#type: "function".into(),
                                    function: ApiFunction {
                                        name: tc.name.clone(),
                                        arguments: tc.arguments_json(),
                                    },
                                })
                                .collect(),
                        );
                    }
                    out.push(api);
                }
                Message::ToolResult { tool_results } => {
                    out.extend(tool_results.iter().map(|r| ApiMessage {
                        role: "tool".into(),
                        content: Some(r.result.clone()),
                        tool_calls: None,
                        tool_call_id: Some(r.tool_call_id.clone()),
                    }));
                }
            }
        }
        out
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn to_api_tool_choice(choice: &ToolChoice) -> serde_json::Value {
        match choice {
            ToolChoice::Auto => json!("auto"),
            ToolChoice::Any => json!("required"),
            ToolChoice::None => json!("none"),
            ToolChoice::Tool(name) => json!({"type": "function", "function": {"name": name}}),
        }
    }

    fn request_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.system_prompts, &request.messages),
            "stream": stream,
        });

        if stream {
            body["stream_options"] = json!({ "include_usage": true });
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = request.top_p {
            body["top_p"] = json!(top_p);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = json!(Self::to_api_tools(&request.tools));
            body["tool_choice"] = Self::to_api_tool_choice(&request.tool_choice);
        }
        for (key, value) in &request.provider_options {
            body[key] = value.clone();
        }
        body
    }

    async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
        accept_sse: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let mut builder = self
            .client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body);
        if accept_sse {
            builder = builder.header("Accept", "text/event-stream");
        }
        let response = builder.send().await.map_err(transport_error)?;
        check_status(response, &self.name).await
    }

    fn parse_response(api: ApiResponse) -> Result<ProviderResponse, ProviderError> {
        let choice = api
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("no choices in response".into()))?;

        let finish_reason = match choice.finish_reason.as_deref() {
            Some(reason) => map_finish_reason(reason)?,
            None => {
                return Err(ProviderError::InvalidResponse(
                    "response has no finish reason".into(),
                ));
            }
        };

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall::from_raw(tc.id, tc.function.name, &tc.function.arguments))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ProviderResponse {
            text: choice.message.content.unwrap_or_default(),
            finish_reason,
            tool_calls,
            usage: api.usage.map(ApiUsage::into_usage).unwrap_or_default(),
            meta: ResponseMeta::new(api.id, api.model),
        })
    }
}

/// Map an OpenAI-style finish reason. Unknown values are malformed payloads.
pub(crate) fn map_finish_reason(reason: &str) -> Result<FinishReason, ProviderError> {
    match reason {
        "stop" => Ok(FinishReason::Stop),
        "tool_calls" | "function_call" => Ok(FinishReason::ToolCalls),
        "length" | "model_length" => Ok(FinishReason::Length),
        "content_filter" => Ok(FinishReason::ContentFilter),
        "error" => Ok(FinishReason::Error),
        other => Err(ProviderError::InvalidResponse(format!(
            "unknown finish reason: {other}"
        ))),
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let body = Self::request_body(&request, false);
        let response = self.post("/chat/completions", &body, false).await?;
        let api: ApiResponse = json_body(response).await?;
        Self::parse_response(api)
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let body = Self::request_body(&request, true);
        let response = self.post("/chat/completions", &body, true).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        // Spawn task to read the SSE byte stream and parse chunks
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = LineBuffer::default();
            let mut state = StreamState::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for line in lines.push(&bytes) {
                    let Some(data) = sse_data(&line) else {
                        continue;
                    };
                    if data == "[DONE]" {
                        let _ = tx.send(state.finish()).await;
                        return;
                    }
                    match state.on_data(data, &provider_name) {
                        Ok(Some(chunk)) => {
                            if tx.send(Ok(chunk)).await.is_err() {
                                return; // receiver dropped
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    }
                }
            }

            // Stream ended without [DONE]
            if let Some(data) = lines.finish().as_deref().and_then(sse_data) {
                if data != "[DONE]" {
                    if let Err(e) = state.on_data(data, &provider_name) {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
            let _ = tx.send(state.finish()).await;
        });

        Ok(rx)
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        debug!(
            provider = %self.name,
            model = %request.model,
            count = request.inputs.len(),
            "Sending embedding request"
        );

        let mut body = json!({
            "model": request.model,
            "input": request.inputs,
            "encoding_format": "float",
        });
        for (key, value) in &request.provider_options {
            body[key] = value.clone();
        }

        let response = self.post("/embeddings", &body, false).await?;
        let mut api: EmbeddingApiResponse = json_body(response).await?;
        api.data.sort_by_key(|d| d.index);

        Ok(EmbeddingResponse {
            embeddings: api.data.into_iter().map(|d| d.embedding).collect(),
            model: api.model,
            tokens: api.usage.map(|u| u.total_tokens).unwrap_or_default(),
        })
    }
}

/// Folds OpenAI SSE `data:` payloads into [`StreamChunk`]s.
///
/// Text deltas are forwarded as they arrive; tool-call fragments are
/// accumulated by index and emitted whole in the final chunk.
#[derive(Debug, Default)]
struct StreamState {
    tool_calls: BTreeMap<u32, ToolCallAccumulator>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
    id: String,
    model: String,
}

impl StreamState {
    fn on_data(&mut self, data: &str, provider: &str) -> Result<Option<StreamChunk>, ProviderError> {
        let resp: StreamResponse = serde_json::from_str(data).map_err(|e| {
            trace!(provider, data, error = %e, "Unparseable SSE chunk");
            ProviderError::InvalidResponse(format!("malformed stream chunk: {e}"))
        })?;

        if let Some(id) = resp.id {
            self.id = id;
        }
        if let Some(model) = resp.model {
            self.model = model;
        }
        if let Some(usage) = resp.usage {
            self.usage = Some(usage.into_usage());
        }

        let Some(choice) = resp.choices.into_iter().next() else {
            return Ok(None);
        };

        for delta in choice.delta.tool_calls.unwrap_or_default() {
            let acc = self.tool_calls.entry(delta.index).or_default();
            if let Some(id) = delta.id {
                acc.id = id;
            }
            if let Some(function) = delta.function {
                if let Some(name) = function.name {
                    acc.name = name;
                }
                if let Some(args) = function.arguments {
                    acc.arguments.push_str(&args);
                }
            }
        }

        if let Some(reason) = choice.finish_reason {
            self.finish_reason = Some(map_finish_reason(&reason)?);
        }

        Ok(choice
            .delta
            .content
            .filter(|c| !c.is_empty())
            .map(StreamChunk::text))
    }

    fn finish(self) -> Result<StreamChunk, ProviderError> {
        let tool_calls = self
            .tool_calls
            .into_values()
            .map(|acc| ToolCall::from_raw(acc.id, acc.name, &acc.arguments))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(StreamChunk {
            text: None,
            tool_calls,
            finish_reason: self.finish_reason,
            usage: self.usage,
            meta: Some(ResponseMeta::new(self.id, self.model)),
        })
    }
}

/// Accumulates incremental tool call deltas into a complete tool call.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl ApiUsage {
    fn into_usage(self) -> Usage {
        Usage::new(self.prompt_tokens, self.completion_tokens)
    }
}

// --- Embedding API types ---

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    model: String,
    #[serde(default)]
    usage: Option<EmbeddingApiUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiUsage {
    total_tokens: u32,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta; arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

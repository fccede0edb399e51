//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly (not OpenAI-compatible proxy).
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks
//! - Streaming via SSE with `content_block_delta` events

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

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client: build_client(REQUEST_TIMEOUT)?,
        })
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Collect the top-level system prompt.
    /// Anthropic puts system prompt as a top-level field, not in messages.
    fn extract_system(system_prompts: &[String], messages: &[Message]) -> Option<String> {
        let parts: Vec<&str> = system_prompts
            .iter()
            .map(String::as_str)
            .chain(messages.iter().filter_map(|m| match m {
                Message::System { content } => Some(content.as_str()),
                _ => None,
            }))
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }

    /// Convert messages to Anthropic API format with content blocks.
    fn to_api_messages(messages: &[Message]) -> Vec<AnthropicMessage> {
        let mut result = Vec::new();

        for msg in messages {
            match msg {
                Message::User { content } => result.push(AnthropicMessage {
                    role: "user".into(),
                    content: AnthropicContent::Text(content.clone()),
                }),
                Message::Assistant {
                    content,
                    tool_calls,
                } if tool_calls.is_empty() => result.push(AnthropicMessage {
                    role: "assistant".into(),
                    content: AnthropicContent::Text(content.clone()),
                }),
                Message::Assistant {
                    content,
                    tool_calls,
                } => {
                    let mut blocks: Vec<ContentBlock> = Vec::new();
                    if !content.is_empty() {
                        blocks.push(ContentBlock::Text {
                            text: content.clone(),
                        });
                    }
                    blocks.extend(tool_calls.iter().map(|tc| ContentBlock::ToolUse {
                        id: tc.id.clone(),
                        name: tc.name.clone(),
                        input: serde_json::Value::Object(tc.arguments.clone()),
                    }));
                    result.push(AnthropicMessage {
                        role: "assistant".into(),
                        content: AnthropicContent::Blocks(blocks),
                    });
                }
                // Tool results travel back as a user turn
                Message::ToolResult { tool_results } => result.push(AnthropicMessage {
                    role: "user".into(),
                    content: AnthropicContent::Blocks(
                        tool_results
                            .iter()
                            .map(|r| ContentBlock::ToolResult {
                                tool_use_id: r.tool_call_id.clone(),
                                content: r.result.clone(),
                                is_error: r.is_error,
                            })
                            .collect(),
                    ),
                }),
                Message::System { .. } => {} // handled separately
            }
        }

        result
    }

    /// Convert tool definitions to Anthropic format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<AnthropicTool> {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect()
    }

    fn to_api_tool_choice(choice: &ToolChoice) -> serde_json::Value {
        match choice {
            ToolChoice::Auto => json!({"type": "auto"}),
            ToolChoice::Any => json!({"type": "any"}),
            ToolChoice::None => json!({"type": "none"}),
            ToolChoice::Tool(name) => json!({"type": "tool", "name": name}),
        }
    }

    fn request_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });

        if stream {
            body["stream"] = json!(true);
        }
        if let Some(system) = Self::extract_system(&request.system_prompts, &request.messages) {
            body["system"] = json!(system);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = request.top_p {
            body["top_p"] = json!(top_p);
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

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response, &self.name).await
    }

    /// Convert Anthropic API response to our ProviderResponse.
    fn response_to_provider_response(resp: AnthropicResponse) -> ProviderResponse {
        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for block in resp.content {
            match block {
                ResponseContentBlock::Text { text: t } => {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(&t);
                }
                ResponseContentBlock::ToolUse { id, name, input } => {
                    let arguments = match input {
                        serde_json::Value::Object(map) => map,
                        _ => serde_json::Map::new(),
                    };
                    tool_calls.push(ToolCall::new(id, name, arguments));
                }
                ResponseContentBlock::Other => {}
            }
        }

        ProviderResponse {
            text,
            finish_reason: map_stop_reason(resp.stop_reason.as_deref()),
            tool_calls,
            usage: Usage::new(resp.usage.input_tokens, resp.usage.output_tokens),
            meta: ResponseMeta::new(resp.id, resp.model),
        }
    }
}

fn map_stop_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("end_turn" | "stop_sequence") => FinishReason::Stop,
        Some("tool_use") => FinishReason::ToolCalls,
        Some("max_tokens") => FinishReason::Length,
        Some("refusal") => FinishReason::ContentFilter,
        _ => FinishReason::Other,
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        debug!(provider = "anthropic", model = %request.model, "Sending completion request");

        let response = self.post(&Self::request_body(&request, false)).await?;
        let api_resp: AnthropicResponse = json_body(response).await?;
        Ok(Self::response_to_provider_response(api_resp))
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        debug!(provider = "anthropic", model = %request.model, "Sending streaming request");

        let response = self.post(&Self::request_body(&request, true)).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(64);

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
                    match state.on_event(data) {
                        Ok(StreamStep::Continue) => {}
                        Ok(StreamStep::Emit(chunk)) => {
                            if tx.send(Ok(chunk)).await.is_err() {
                                return;
                            }
                        }
                        Ok(StreamStep::Stop) => {
                            let _ = tx.send(Ok(state.finish())).await;
                            return;
                        }
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    }
                }
            }

            // Stream ended without message_stop
            let _ = tx.send(Ok(state.finish())).await;
        });

        Ok(rx)
    }
}

enum StreamStep {
    Continue,
    Emit(StreamChunk),
    Stop,
}

/// Tracks a Messages API event stream.
#[derive(Debug, Default)]
struct StreamState {
    id: String,
    model: String,
    input_tokens: u32,
    output_tokens: u32,
    stop_reason: Option<String>,
    current_tool: Option<(String, String, String)>,
    tool_calls: Vec<ToolCall>,
}

impl StreamState {
    fn on_event(&mut self, data: &str) -> Result<StreamStep, ProviderError> {
        let event: serde_json::Value = serde_json::from_str(data).map_err(|e| {
            trace!(error = %e, data = %data, "Unparseable Anthropic SSE");
            ProviderError::InvalidResponse(format!("malformed stream event: {e}"))
        })?;

        match event["type"].as_str().unwrap_or("") {
            "message_start" => {
                let message = &event["message"];
                self.id = message["id"].as_str().unwrap_or_default().to_string();
                self.model = message["model"].as_str().unwrap_or_default().to_string();
                self.input_tokens = token_count(&message["usage"]["input_tokens"]);
            }
            "content_block_start" => {
                let block = &event["content_block"];
                if block["type"].as_str() == Some("tool_use") {
                    self.close_tool()?;
                    self.current_tool = Some((
                        block["id"].as_str().unwrap_or_default().to_string(),
                        block["name"].as_str().unwrap_or_default().to_string(),
                        String::new(),
                    ));
                }
            }
            "content_block_delta" => {
                let delta = &event["delta"];
                match delta["type"].as_str().unwrap_or("") {
                    "text_delta" => {
                        if let Some(text) = delta["text"].as_str() {
                            return Ok(StreamStep::Emit(StreamChunk::text(text)));
                        }
                    }
                    "input_json_delta" => {
                        if let (Some(partial), Some((_, _, args))) =
                            (delta["partial_json"].as_str(), self.current_tool.as_mut())
                        {
                            args.push_str(partial);
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => self.close_tool()?,
            "message_delta" => {
                if let Some(reason) = event["delta"]["stop_reason"].as_str() {
                    self.stop_reason = Some(reason.to_string());
                }
                self.output_tokens = token_count(&event["usage"]["output_tokens"]);
            }
            "message_stop" => {
                self.close_tool()?;
                return Ok(StreamStep::Stop);
            }
            "error" => {
                let message = event["error"]["message"]
                    .as_str()
                    .unwrap_or("unknown stream error");
                return Err(ProviderError::StreamInterrupted(message.to_string()));
            }
            _ => {}
        }
        Ok(StreamStep::Continue)
    }

    fn close_tool(&mut self) -> Result<(), ProviderError> {
        if let Some((id, name, args)) = self.current_tool.take() {
            self.tool_calls.push(ToolCall::from_raw(id, name, &args)?);
        }
        Ok(())
    }

    fn finish(mut self) -> StreamChunk {
        // A half-received tool call at end of stream is dropped rather than guessed at.
        self.current_tool = None;
        StreamChunk {
            text: None,
            tool_calls: self.tool_calls,
            finish_reason: Some(map_stop_reason(self.stop_reason.as_deref())),
            usage: Some(Usage::new(self.input_tokens, self.output_tokens)),
            meta: Some(ResponseMeta::new(self.id, self.model)),
        }
    }
}

fn token_count(value: &serde_json::Value) -> u32 {
    value.as_u64().map_or(0, |v| u32::try_from(v).unwrap_or(u32::MAX))
}

// --- Anthropic API types ---

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<ResponseContentBlock>,
    usage: AnthropicUsage,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// Thinking and other block types carry nothing we surface.
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

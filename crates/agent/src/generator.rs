//! The text generation loop.
//!
//! A [`TextGenerator`] holds an immutable request configuration. Each call
//! to [`run`](TextGenerator::run) or [`stream`](TextGenerator::stream)
//! starts a fresh transcript and step recorder, then drives the loop:
//!
//! ```text
//! Requesting ──▶ Interpreting ──▶ ExecutingTools ──▶ Requesting | Done
//!                      └──────────────────────────▶ Requesting | Done
//! ```
//!
//! The loop stops once the step limit is reached or the model reports
//! [`FinishReason::Stop`].

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};
use unillm_core::error::{Error, Result};
use unillm_core::message::Message;
use unillm_core::provider::{
    FinishReason, Provider, ProviderOptions, ProviderRequest, ProviderResponse, ResponseMeta,
    StreamChunk, ToolChoice, Usage,
};
use unillm_core::tool::{Tool, ToolCall, ToolRegistry, ToolResult};
use uuid::Uuid;

use crate::invoker::call_tools;
use crate::step::{ResponseBuilder, Step, TextResponse};
use crate::stream_event::StreamEvent;
use crate::transcript::Transcript;

const EVENT_BUFFER: usize = 64;

/// Receiving half of [`TextGenerator::stream`].
pub type EventReceiver = mpsc::Receiver<Result<StreamEvent>>;

/// Configures and runs multi-step text generation against one provider.
#[derive(Clone)]
pub struct TextGenerator {
    provider: Arc<dyn Provider>,
    model: String,
    prompt: Option<String>,
    messages: Vec<Message>,
    system_prompts: Vec<String>,
    tools: ToolRegistry,
    tool_choice: ToolChoice,
    max_steps: u32,
    temperature: Option<f32>,
    top_p: Option<f32>,
    max_tokens: Option<u32>,
    provider_options: ProviderOptions,
}

impl TextGenerator {
    /// Create a generator for `model` on `provider`, limited to one step.
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            prompt: None,
            messages: Vec::new(),
            system_prompts: Vec::new(),
            tools: ToolRegistry::new(),
            tool_choice: ToolChoice::Auto,
            max_steps: 1,
            temperature: None,
            top_p: None,
            max_tokens: None,
            provider_options: ProviderOptions::new(),
        }
    }

    /// Start from a single user prompt. Cannot be combined with messages.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Start from existing history. Cannot be combined with a prompt.
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompts.push(prompt.into());
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = tool_choice;
        self
    }

    /// Set the maximum number of provider round trips. Zero behaves as one.
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_provider_option(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.provider_options.insert(key.into(), value.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Run the loop to completion and return the aggregate response.
    ///
    /// Provider failures abort the run. Tool failures are recorded in the
    /// step's tool results and the loop carries on.
    pub async fn run(&self) -> Result<TextResponse> {
        let mut run = Run::new(self.initial_transcript()?);
        let run_id = Uuid::new_v4();

        info!(
            %run_id,
            provider = self.provider.name(),
            model = %self.model,
            max_steps = self.step_limit(),
            tools = self.tools.len(),
            "Starting text generation"
        );

        let mut state = LoopState::Requesting;
        loop {
            state = match state {
                LoopState::Requesting => {
                    debug!(%run_id, step = run.builder.step_count() + 1, "Requesting completion");
                    let response = self
                        .provider
                        .complete(self.request(&run.transcript))
                        .await
                        .map_err(|e| Error::from_provider(self.model.as_str(), e))?;
                    LoopState::Interpreting(response)
                }
                LoopState::Interpreting(response) => {
                    self.check_tool_call_ids(&response.tool_calls)?;
                    run.record_assistant(&response);
                    if response.finish_reason == FinishReason::ToolCalls {
                        LoopState::ExecutingTools(response)
                    } else {
                        self.complete_step(&mut run, response, Vec::new())
                    }
                }
                LoopState::ExecutingTools(response) => {
                    let results = call_tools(&self.tools, &response.tool_calls).await;
                    run.record_tool_results(&results);
                    self.complete_step(&mut run, response, results)
                }
                LoopState::Done => break,
            };
        }

        let response = run.builder.to_response();
        info!(
            %run_id,
            steps = response.steps.len(),
            finish_reason = %response.finish_reason,
            total_tokens = response.usage.total_tokens(),
            "Text generation finished"
        );
        Ok(response)
    }

    /// Run the loop on a background task, streaming events as they happen.
    ///
    /// Request validation errors are returned immediately. A provider
    /// failure arrives as an `Err` item and ends the stream. Dropping the
    /// receiver cancels the run. Must be called within a Tokio runtime.
    pub fn stream(&self) -> Result<EventReceiver> {
        let transcript = self.initial_transcript()?;
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let generator = self.clone();

        tokio::spawn(async move {
            if let Err(e) = generator.drive_stream(transcript, &tx).await {
                let _ = tx.send(Err(e)).await;
            }
        });

        Ok(rx)
    }

    async fn drive_stream(
        &self,
        transcript: Transcript,
        tx: &mpsc::Sender<Result<StreamEvent>>,
    ) -> Result<()> {
        let mut run = Run::new(transcript);
        let run_id = Uuid::new_v4();
        info!(%run_id, model = %self.model, max_steps = self.step_limit(), "Starting streamed text generation");

        let mut state = LoopState::Requesting;
        loop {
            state = match state {
                LoopState::Requesting => {
                    let mut chunks = self
                        .provider
                        .stream(self.request(&run.transcript))
                        .await
                        .map_err(|e| Error::from_provider(self.model.as_str(), e))?;

                    let mut collected = CollectedChunks::default();
                    while let Some(chunk) = chunks.recv().await {
                        let chunk = chunk.map_err(|e| Error::from_provider(self.model.as_str(), e))?;
                        if let Some(delta) = chunk.text.as_deref().filter(|d| !d.is_empty()) {
                            let event = StreamEvent::TextDelta {
                                delta: delta.to_string(),
                            };
                            if !emit(tx, event).await {
                                return Ok(());
                            }
                        }
                        collected.absorb(chunk);
                    }
                    LoopState::Interpreting(collected.into_response())
                }
                LoopState::Interpreting(response) => {
                    self.check_tool_call_ids(&response.tool_calls)?;
                    run.record_assistant(&response);
                    for call in &response.tool_calls {
                        let event = StreamEvent::ToolCall {
                            tool_call: call.clone(),
                        };
                        if !emit(tx, event).await {
                            return Ok(());
                        }
                    }
                    if response.finish_reason == FinishReason::ToolCalls {
                        LoopState::ExecutingTools(response)
                    } else {
                        let next = self.complete_step(&mut run, response, Vec::new());
                        if !emit(tx, run.step_finished()).await {
                            return Ok(());
                        }
                        next
                    }
                }
                LoopState::ExecutingTools(response) => {
                    let results = call_tools(&self.tools, &response.tool_calls).await;
                    for result in &results {
                        let event = StreamEvent::ToolResult {
                            tool_result: result.clone(),
                        };
                        if !emit(tx, event).await {
                            return Ok(());
                        }
                    }
                    run.record_tool_results(&results);
                    let next = self.complete_step(&mut run, response, results);
                    if !emit(tx, run.step_finished()).await {
                        return Ok(());
                    }
                    next
                }
                LoopState::Done => break,
            };
        }

        let response = run.builder.to_response();
        info!(%run_id, steps = response.steps.len(), finish_reason = %response.finish_reason, "Streamed text generation finished");
        emit(
            tx,
            StreamEvent::Finish {
                response: Box::new(response),
            },
        )
        .await;
        Ok(())
    }

    fn initial_transcript(&self) -> Result<Transcript> {
        match &self.prompt {
            Some(_) if !self.messages.is_empty() => Err(Error::InvalidRequest(
                "prompt and messages are mutually exclusive".into(),
            )),
            Some(prompt) => Ok(Transcript::from_messages(vec![Message::user(prompt.clone())])),
            None => Ok(Transcript::from_messages(self.messages.clone())),
        }
    }

    fn step_limit(&self) -> usize {
        self.max_steps.max(1) as usize
    }

    fn request(&self, transcript: &Transcript) -> ProviderRequest {
        ProviderRequest {
            model: self.model.clone(),
            system_prompts: self.system_prompts.clone(),
            messages: transcript.snapshot(),
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            tools: self.tools.definitions(),
            tool_choice: self.tool_choice.clone(),
            provider_options: self.provider_options.clone(),
        }
    }

    /// Each tool result must link back to exactly one call in its step.
    fn check_tool_call_ids(&self, calls: &[ToolCall]) -> Result<()> {
        let mut seen = HashSet::new();
        for call in calls {
            if !seen.insert(call.id.as_str()) {
                return Err(Error::ProviderResponse {
                    model: self.model.clone(),
                    message: format!("duplicate tool call id \"{}\" in one step", call.id),
                });
            }
        }
        Ok(())
    }

    /// Record the step for `response` and decide whether to go round again.
    fn complete_step(
        &self,
        run: &mut Run,
        response: ProviderResponse,
        tool_results: Vec<ToolResult>,
    ) -> LoopState {
        let finish_reason = response.finish_reason;
        let usage = response.usage;
        run.builder.add_step(Step {
            text: response.text,
            finish_reason,
            usage,
            meta: response.meta,
            tool_calls: response.tool_calls,
            tool_results,
            messages: run.transcript.snapshot(),
            system_prompts: self.system_prompts.clone(),
        });

        let steps = run.builder.step_count();
        debug!(
            step = steps,
            %finish_reason,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "Step recorded"
        );

        if steps < self.step_limit() && finish_reason != FinishReason::Stop {
            LoopState::Requesting
        } else {
            LoopState::Done
        }
    }
}

impl std::fmt::Debug for TextGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextGenerator")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("max_steps", &self.max_steps)
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

enum LoopState {
    Requesting,
    Interpreting(ProviderResponse),
    ExecutingTools(ProviderResponse),
    Done,
}

/// Per-run accumulator.
struct Run {
    transcript: Transcript,
    builder: ResponseBuilder,
}

impl Run {
    fn new(transcript: Transcript) -> Self {
        Self {
            transcript,
            builder: ResponseBuilder::new(),
        }
    }

    fn record_assistant(&mut self, response: &ProviderResponse) {
        let message =
            Message::assistant_with_tool_calls(response.text.clone(), response.tool_calls.clone());
        self.transcript.push(message.clone());
        self.builder.add_response_message(message);
    }

    fn record_tool_results(&mut self, results: &[ToolResult]) {
        if results.is_empty() {
            return;
        }
        let message = Message::tool_results(results.to_vec());
        self.transcript.push(message.clone());
        self.builder.add_response_message(message);
    }

    fn step_finished(&self) -> StreamEvent {
        let (finish_reason, usage) = self
            .builder
            .steps()
            .last()
            .map_or((FinishReason::Other, Usage::default()), |s| {
                (s.finish_reason, s.usage)
            });
        StreamEvent::StepFinish {
            step: self.builder.step_count(),
            finish_reason,
            usage,
        }
    }
}

/// Folds a provider chunk stream back into one response.
#[derive(Default)]
struct CollectedChunks {
    text: String,
    tool_calls: Vec<ToolCall>,
    finish_reason: Option<FinishReason>,
    usage: Usage,
    meta: Option<ResponseMeta>,
}

impl CollectedChunks {
    fn absorb(&mut self, chunk: StreamChunk) {
        if let Some(text) = chunk.text {
            self.text.push_str(&text);
        }
        self.tool_calls.extend(chunk.tool_calls);
        if chunk.finish_reason.is_some() {
            self.finish_reason = chunk.finish_reason;
        }
        if let Some(usage) = chunk.usage {
            self.usage += usage;
        }
        if chunk.meta.is_some() {
            self.meta = chunk.meta;
        }
    }

    fn into_response(self) -> ProviderResponse {
        let finish_reason = self.finish_reason.unwrap_or(if self.tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        });
        ProviderResponse {
            text: self.text,
            finish_reason,
            tool_calls: self.tool_calls,
            usage: self.usage,
            meta: self.meta.unwrap_or_default(),
        }
    }
}

/// Returns false once the receiver has gone away.
async fn emit(tx: &mpsc::Sender<Result<StreamEvent>>, event: StreamEvent) -> bool {
    tx.send(Ok(event)).await.is_ok()
}

//! Step recording and final response assembly.

use serde::{Deserialize, Serialize};
use unillm_core::message::Message;
use unillm_core::provider::{FinishReason, ResponseMeta, Usage};
use unillm_core::tool::{ToolCall, ToolResult};

/// One iteration of the generation loop. Never mutated after recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub text: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub meta: ResponseMeta,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
    /// The transcript as it stood when the step was recorded.
    pub messages: Vec<Message>,
    pub system_prompts: Vec<String>,
}

/// The aggregate result of a generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextResponse {
    /// Text of the last step
    pub text: String,
    /// Finish reason of the last step
    pub finish_reason: FinishReason,
    pub steps: Vec<Step>,
    /// Usage summed over every step
    pub usage: Usage,
    /// Meta of the last step
    pub meta: ResponseMeta,
    /// All tool calls, in step order
    pub tool_calls: Vec<ToolCall>,
    /// All tool results, in step order
    pub tool_results: Vec<ToolResult>,
    /// Messages produced during the run (assistant and tool results)
    pub response_messages: Vec<Message>,
    /// The full transcript
    pub messages: Vec<Message>,
}

impl TextResponse {
    /// Concatenated text of all assistant messages produced by the run.
    pub fn assistant_text(&self) -> String {
        self.response_messages
            .iter()
            .filter(|m| matches!(m, Message::Assistant { .. }))
            .map(Message::text)
            .collect()
    }
}

/// Accumulates steps and response messages over a run.
#[derive(Debug, Clone, Default)]
pub struct ResponseBuilder {
    steps: Vec<Step>,
    response_messages: Vec<Message>,
}

impl ResponseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_step(&mut self, step: Step) -> &mut Self {
        self.steps.push(step);
        self
    }

    pub fn add_response_message(&mut self, message: Message) -> &mut Self {
        self.response_messages.push(message);
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Build the response from everything recorded so far.
    ///
    /// With no steps the result is empty but well-formed, reporting
    /// [`FinishReason::Other`].
    pub fn to_response(&self) -> TextResponse {
        let last = self.steps.last();

        TextResponse {
            text: last.map(|s| s.text.clone()).unwrap_or_default(),
            finish_reason: last.map_or(FinishReason::Other, |s| s.finish_reason),
            usage: self.steps.iter().fold(Usage::default(), |acc, s| acc + s.usage),
            meta: last.map(|s| s.meta.clone()).unwrap_or_default(),
            tool_calls: self
                .steps
                .iter()
                .flat_map(|s| s.tool_calls.iter().cloned())
                .collect(),
            tool_results: self
                .steps
                .iter()
                .flat_map(|s| s.tool_results.iter().cloned())
                .collect(),
            response_messages: self.response_messages.clone(),
            messages: last.map(|s| s.messages.clone()).unwrap_or_default(),
            steps: self.steps.clone(),
        }
    }
}

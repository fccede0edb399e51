//! Generator-level streaming events.
//!
//! `StreamEvent` wraps provider-level stream chunks into higher-level events
//! that callers (and the gateway) can forward to clients over SSE.

use serde::{Deserialize, Serialize};
use unillm_core::provider::{FinishReason, Usage};
use unillm_core::tool::{ToolCall, ToolResult};

use crate::step::TextResponse;

/// Events emitted by [`TextGenerator::stream`](crate::TextGenerator::stream).
///
/// - `text_delta`  — partial text from the model
/// - `tool_call`   — the model requested a tool
/// - `tool_result` — a tool finished (successfully or not)
/// - `step_finish` — a loop iteration was recorded
/// - `finish`      — the run is complete, with the aggregate response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    TextDelta { delta: String },

    ToolCall { tool_call: ToolCall },

    ToolResult { tool_result: ToolResult },

    StepFinish {
        step: usize,
        finish_reason: FinishReason,
        usage: Usage,
    },

    Finish { response: Box<TextResponse> },
}

impl StreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TextDelta { .. } => "text_delta",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::StepFinish { .. } => "step_finish",
            Self::Finish { .. } => "finish",
        }
    }
}

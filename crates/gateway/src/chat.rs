//! OpenAI-compatible chat completion and model listing handlers.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};
use unillm_agent::StreamEvent;
use unillm_core::error::Result;
use unillm_core::message::Message;
use unillm_core::provider::Usage;

use crate::SharedState;
use crate::error::{ApiError, ErrorEnvelope};

#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub usage: CompletionUsage,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompletionUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl From<Usage> for CompletionUsage {
    fn from(u: Usage) -> Self {
        Self {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChatMessage,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    pub object: String,
    pub owned_by: String,
}

fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

fn to_messages(messages: &[ChatMessage]) -> Result<Vec<Message>> {
    messages
        .iter()
        .map(|m| Message::from_role(&m.role, m.content.as_str()))
        .collect()
}

/// `POST /openai/v1/chat/completions`
pub async fn chat_completions(
    State(state): State<SharedState>,
    Json(request): Json<ChatCompletionRequest>,
) -> std::result::Result<Response, ApiError> {
    info!(model = %request.model, messages = request.messages.len(), stream = request.stream, "Chat completion request");

    let generator = state
        .registry
        .resolve(&request.model)?
        .with_messages(to_messages(&request.messages)?);

    if request.stream {
        let events = generator.stream()?;
        return Ok(stream_reply(events, request.model).into_response());
    }

    let response = generator.run().await?;
    let meta = &response.meta;
    let completion = ChatCompletion {
        id: if meta.id.is_empty() { completion_id() } else { meta.id.clone() },
        object: "chat.completion".into(),
        created: chrono::Utc::now().timestamp(),
        model: if meta.model.is_empty() { request.model } else { meta.model.clone() },
        usage: response.usage.into(),
        choices: vec![Choice {
            index: 0,
            message: ChatMessage {
                role: "assistant".into(),
                content: response.assistant_text(),
            },
            finish_reason: response.finish_reason.as_str().into(),
        }],
    };
    Ok(Json(completion).into_response())
}

/// Forward text deltas as chunk frames, then `[DONE]`. A failure after the
/// stream started becomes an error frame and no `[DONE]` follows.
fn stream_reply(
    mut events: unillm_agent::EventReceiver,
    model: String,
) -> Sse<ReceiverStream<std::result::Result<SseEvent, Infallible>>> {
    let (tx, rx) = mpsc::channel(64);
    let id = completion_id();
    let created = chrono::Utc::now().timestamp();

    tokio::spawn(async move {
        while let Some(item) = events.recv().await {
            let frame = match item {
                Ok(StreamEvent::TextDelta { delta }) => {
                    let chunk = ChatCompletionChunk {
                        id: id.clone(),
                        object: "chat.completion.chunk".into(),
                        created,
                        model: model.clone(),
                        choices: vec![ChunkChoice {
                            index: 0,
                            delta: ChatMessage {
                                role: "assistant".into(),
                                content: delta,
                            },
                        }],
                    };
                    json_frame(&chunk)
                }
                Ok(other) => {
                    debug!(event = other.event_type(), "Skipping non-text stream event");
                    continue;
                }
                Err(e) => {
                    let _ = tx.send(Ok(json_frame(&ErrorEnvelope::new(e.to_string())))).await;
                    return;
                }
            };
            if tx.send(Ok(frame)).await.is_err() {
                // Client went away; dropping `events` cancels the run.
                return;
            }
        }
        let _ = tx.send(Ok(SseEvent::default().data("[DONE]"))).await;
    });

    Sse::new(ReceiverStream::new(rx))
}

fn json_frame<T: Serialize>(value: &T) -> SseEvent {
    SseEvent::default().data(serde_json::to_string(value).unwrap_or_default())
}

/// `GET /openai/v1/models`
pub async fn list_models(State(state): State<SharedState>) -> Json<ModelList> {
    Json(ModelList {
        object: "list".into(),
        data: state
            .registry
            .names()
            .into_iter()
            .map(|name| ModelEntry {
                id: name.to_string(),
                object: "model".into(),
                owned_by: "unillm".into(),
            })
            .collect(),
    })
}

//! The generation loop at the heart of UniLLM.
//!
//! A run follows a **Request → Interpret → Execute tools** cycle:
//!
//! 1. **Send** the transcript, system prompts and tool definitions to the provider
//! 2. **Append** the assistant reply to the transcript
//! 3. **If tool calls**: execute them in order, append their results
//! 4. **Record** a step, then go round again or stop
//!
//! The loop stops when the model finishes with `stop` or the step limit is
//! reached. The final [`TextResponse`] is assembled from every recorded step.

pub mod embeddings;
pub mod generator;
pub mod invoker;
pub mod step;
pub mod stream_event;
pub mod transcript;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use embeddings::{EmbeddingsGenerator, EmbeddingsResponse, EmbeddingsUsage};
pub use generator::{EventReceiver, TextGenerator};
pub use invoker::{call_tools, invoke};
pub use step::{ResponseBuilder, Step, TextResponse};
pub use stream_event::StreamEvent;
pub use transcript::Transcript;

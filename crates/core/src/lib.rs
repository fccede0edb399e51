//! # UniLLM Core
//!
//! Domain types, traits, and error definitions for UniLLM.
//! This crate has **no HTTP or runtime framework dependencies** — it defines
//! the provider-neutral model that every other crate builds on.
//!
//! - [`Message`] / [`Role`]: the transcript vocabulary
//! - [`Tool`] / [`ToolRegistry`]: callable capabilities and their schemas
//! - [`Provider`]: the seam every upstream adapter implements

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use message::{Message, Role};
pub use provider::{
    ChunkReceiver, EmbeddingRequest, EmbeddingResponse, FinishReason, Provider, ProviderOptions,
    ProviderRequest, ProviderResponse, ResponseMeta, StreamChunk, ToolChoice, ToolDefinition, Usage,
};
pub use tool::{
    FunctionTool, FunctionToolBuilder, ParameterKind, Tool, ToolArguments, ToolCall, ToolParameter,
    ToolRegistry, ToolResult,
};

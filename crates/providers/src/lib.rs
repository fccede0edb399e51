//! LLM provider adapters for UniLLM.
//!
//! All providers implement the `unillm_core::Provider` trait.
//! The router selects the correct provider based on configuration.

pub mod anthropic;
pub(crate) mod http;
pub mod openai_compat;
pub mod router;
pub mod voyageai;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config};
pub use voyageai::VoyageAiProvider;

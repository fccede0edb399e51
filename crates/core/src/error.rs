//! Error types for the UniLLM domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] is what escapes a
//! generation run.

use thiserror::Error;

/// The top-level error type for all UniLLM operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The provider call itself failed (transport, auth, upstream status).
    /// Fatal to the run.
    #[error("Sending to model {model} failed: {source}")]
    ProviderRequest {
        model: String,
        #[source]
        source: ProviderError,
    },

    /// The provider answered with something we could not interpret.
    #[error("Model {model} returned an invalid response: {message}")]
    ProviderResponse { model: String, message: String },

    /// The caller asked for a model that nothing is registered under.
    #[error("Model \"{model}\" is not registered with the server")]
    UnresolvableModel { model: String },

    #[error("Couldn't map message with role \"{0}\" to a known message type")]
    MessageMapping(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a provider failure for the given model, splitting malformed
    /// payloads from transport failures.
    pub fn from_provider(model: impl Into<String>, source: ProviderError) -> Self {
        let model = model.into();
        match source {
            ProviderError::InvalidResponse(message) => Self::ProviderResponse { model, message },
            source => Self::ProviderRequest { model, source },
        }
    }

    /// Seconds the upstream asked us to wait, if this is a rate-limit failure.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::ProviderRequest {
                source: ProviderError::RateLimited { retry_after_secs },
                ..
            } => *retry_after_secs,
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            Self::ProviderRequest {
                source: ProviderError::RateLimited { .. },
                ..
            }
        )
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider{}", retry_hint(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    /// Malformed or unexpected upstream payload.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(", retry after {secs}s"),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool \"{name}\" is not registered (call id: {call_id})")]
    UnknownTool { name: String, call_id: String },

    #[error("Invalid arguments for tool \"{tool_name}\": {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },
}

//! HTTP plumbing shared by the adapters: client construction, status
//! mapping and SSE line splitting.

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use tracing::warn;
use unillm_core::error::ProviderError;

/// Build a reqwest client with the given request timeout.
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::NotConfigured(format!("failed to create HTTP client: {e}")))
}

/// Map a transport failure from `send()` or body reads.
pub(crate) fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// Turn non-success statuses into typed errors, passing successes through.
pub(crate) async fn check_status(
    response: reqwest::Response,
    provider: &str,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let code = status.as_u16();
    match code {
        429 => {
            let retry_after_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            Err(ProviderError::RateLimited { retry_after_secs })
        }
        401 | 403 => Err(ProviderError::AuthenticationFailed(format!(
            "{provider} rejected the API key (status {code})"
        ))),
        _ => {
            let body = response.text().await.unwrap_or_default();
            warn!(provider, status = code, body = %body, "Provider returned error");
            Err(ProviderError::ApiError {
                status_code: code,
                message: body,
            })
        }
    }
}

/// Decode a JSON body, reporting failures as malformed upstream payloads.
pub(crate) async fn json_body<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let bytes = response.bytes().await.map_err(transport_error)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ProviderError::InvalidResponse(format!("failed to parse response body: {e}")))
}

/// Splits a byte stream into lines. Bytes are buffered until a newline
/// arrives so multi-byte characters split across network chunks survive.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Feed bytes, returning every line completed by them.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            lines.push(line.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Whatever is left once the stream ends without a trailing newline.
    pub(crate) fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.pending).trim_end().to_string())
        }
    }
}

/// The payload of an SSE `data:` line, if this is one.
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

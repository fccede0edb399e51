//! Voyage AI embeddings provider.
//!
//! Voyage only serves embeddings; text generation requests are refused.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use unillm_core::error::ProviderError;
use unillm_core::provider::*;

use crate::http::{build_client, check_status, json_body, transport_error};

const DEFAULT_BASE_URL: &str = "https://api.voyageai.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct VoyageAiProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl VoyageAiProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client: build_client(REQUEST_TIMEOUT)?,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request_body(request: &EmbeddingRequest) -> serde_json::Value {
        let mut body = json!({
            "input": request.inputs,
            "model": request.model,
        });

        // Accept both the camelCase option name and the wire spelling
        let input_type = request
            .provider_options
            .get("inputType")
            .or_else(|| request.provider_options.get("input_type"));
        if let Some(input_type) = input_type {
            body["input_type"] = input_type.clone();
        }
        for (key, value) in &request.provider_options {
            if key != "inputType" && key != "input_type" {
                body[key] = value.clone();
            }
        }
        body
    }
}

#[async_trait]
impl Provider for VoyageAiProvider {
    fn name(&self) -> &str {
        "voyageai"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::Unsupported(
            "voyageai does not support text generation".into(),
        ))
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        debug!(provider = "voyageai", model = %request.model, inputs = request.inputs.len(), "Sending embeddings request");

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&Self::request_body(&request))
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response, self.name()).await?;
        let mut body: VoyageResponse = json_body(response).await?;

        body.data.sort_by_key(|d| d.index);
        Ok(EmbeddingResponse {
            embeddings: body.data.into_iter().map(|d| d.embedding).collect(),
            model: body.model,
            tokens: body.usage.total_tokens,
        })
    }
}

#[derive(Debug, Deserialize)]
struct VoyageResponse {
    data: Vec<VoyageEmbedding>,
    model: String,
    usage: VoyageUsage,
}

#[derive(Debug, Deserialize)]
struct VoyageEmbedding {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct VoyageUsage {
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use unillm_core::message::Message;

    fn embedding_request(options: ProviderOptions) -> EmbeddingRequest {
        EmbeddingRequest {
            model: "voyage-3-lite".into(),
            inputs: vec!["The food was delicious.".into(), "The wine too.".into()],
            provider_options: options,
        }
    }

    #[test]
    fn input_type_option_maps_to_wire_field() {
        let mut options = ProviderOptions::new();
        options.insert("inputType".into(), json!("query"));
        options.insert("truncation".into(), json!(false));

        let body = VoyageAiProvider::request_body(&embedding_request(options));
        assert_eq!(body["input_type"], "query");
        assert_eq!(body["truncation"], false);
        assert!(body.get("inputType").is_none());
        assert_eq!(body["input"][1], "The wine too.");
    }

    #[tokio::test]
    async fn text_generation_is_unsupported() {
        let provider = VoyageAiProvider::new("pa-test").unwrap();
        let err = provider
            .complete(ProviderRequest::new("voyage-3", vec![Message::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unsupported(_)));
    }

    #[tokio::test]
    async fn embeddings_over_http() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/embeddings")
                    .header("authorization", "Bearer pa-test");
                then.status(200).json_body(json!({
                    "object": "list",
                    "data": [
                        {"object": "embedding", "embedding": [0.3, 0.4], "index": 1},
                        {"object": "embedding", "embedding": [0.1, 0.2], "index": 0}
                    ],
                    "model": "voyage-3-lite",
                    "usage": {"total_tokens": 12}
                }));
            })
            .await;

        let provider = VoyageAiProvider::new("pa-test")
            .unwrap()
            .with_base_url(server.base_url());
        let mut options = ProviderOptions::new();
        options.insert("inputType".into(), json!("document"));
        let response = provider.embed(embedding_request(options)).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.embeddings, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
        assert_eq!(response.tokens, 12);
        assert_eq!(response.model, "voyage-3-lite");
    }
}

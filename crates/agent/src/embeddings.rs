//! Embeddings generation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use unillm_core::error::{Error, Result};
use unillm_core::provider::{EmbeddingRequest, Provider, ProviderOptions};

/// Builds and sends one embeddings request.
#[derive(Clone)]
pub struct EmbeddingsGenerator {
    provider: Arc<dyn Provider>,
    model: String,
    inputs: Vec<String>,
    provider_options: ProviderOptions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingsUsage {
    pub tokens: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingsMeta {
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingsResponse {
    /// One vector per input, in input order.
    pub embeddings: Vec<Vec<f32>>,
    pub usage: EmbeddingsUsage,
    pub meta: EmbeddingsMeta,
}

impl EmbeddingsGenerator {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            inputs: Vec::new(),
            provider_options: ProviderOptions::new(),
        }
    }

    /// Add one input text. May be called repeatedly.
    pub fn from_input(mut self, input: impl Into<String>) -> Self {
        self.inputs.push(input.into());
        self
    }

    pub fn from_inputs(mut self, inputs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.inputs.extend(inputs.into_iter().map(Into::into));
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

    pub async fn generate(&self) -> Result<EmbeddingsResponse> {
        if self.inputs.is_empty() {
            return Err(Error::InvalidRequest(
                "embeddings require at least one input".into(),
            ));
        }

        debug!(
            provider = self.provider.name(),
            model = %self.model,
            inputs = self.inputs.len(),
            "Requesting embeddings"
        );

        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs: self.inputs.clone(),
                provider_options: self.provider_options.clone(),
            })
            .await
            .map_err(|e| Error::from_provider(self.model.as_str(), e))?;

        Ok(EmbeddingsResponse {
            embeddings: response.embeddings,
            usage: EmbeddingsUsage {
                tokens: response.tokens,
            },
            meta: EmbeddingsMeta {
                model: response.model,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use unillm_core::error::ProviderError;
    use unillm_core::provider::{EmbeddingResponse, ProviderRequest, ProviderResponse};

    #[derive(Default)]
    struct FakeEmbedder {
        seen: Mutex<Vec<EmbeddingRequest>>,
    }

    #[async_trait::async_trait]
    impl Provider for FakeEmbedder {
        fn name(&self) -> &str {
            "fake_embedder"
        }

        async fn complete(&self, _request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError> {
            Err(ProviderError::Unsupported("text".into()))
        }

        async fn embed(&self, request: EmbeddingRequest) -> std::result::Result<EmbeddingResponse, ProviderError> {
            let embeddings = request.inputs.iter().map(|i| vec![i.len() as f32, 0.5]).collect();
            let tokens = request.inputs.len() as u32 * 4;
            let model = request.model.clone();
            self.seen.lock().unwrap().push(request);
            Ok(EmbeddingResponse {
                embeddings,
                model,
                tokens,
            })
        }
    }

    #[tokio::test]
    async fn generates_one_vector_per_input() {
        let provider = Arc::new(FakeEmbedder::default());
        let response = EmbeddingsGenerator::new(provider.clone(), "voyage-3-lite")
            .from_input("The food was delicious.")
            .from_inputs(["and the wine too"])
            .with_provider_option("inputType", "document")
            .generate()
            .await
            .unwrap();

        assert_eq!(response.embeddings.len(), 2);
        assert_eq!(response.embeddings[0][0], 23.0);
        assert_eq!(response.usage.tokens, 8);
        assert_eq!(response.meta.model, "voyage-3-lite");

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].provider_options["inputType"], "document");
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let provider = Arc::new(FakeEmbedder::default());
        let err = EmbeddingsGenerator::new(provider.clone(), "voyage-3-lite")
            .generate()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert!(provider.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsupported_provider_surfaces_as_request_error() {
        let provider = Arc::new(crate::test_helpers::ScriptedProvider::single_text("x"));
        let err = EmbeddingsGenerator::new(provider, "gpt-4o")
            .from_input("hello")
            .generate()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ProviderRequest {
                source: ProviderError::Unsupported(_),
                ..
            }
        ));
    }
}

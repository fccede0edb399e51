//! OpenAI-compatible HTTP server for UniLLM.
//!
//! Exposes named models from a [`ModelRegistry`] behind
//! `POST /openai/v1/chat/completions`, plus model listing and a health check.
//!
//! Built on Axum for high performance async HTTP.

pub mod chat;
pub mod error;
pub mod registry;

use std::sync::Arc;

use axum::{
    Router,
    response::Json,
    routing::{get, post},
};
use serde::Serialize;
use tracing::info;

pub use error::ApiError;
pub use registry::ModelRegistry;

/// Shared application state for the gateway.
#[derive(Debug)]
pub struct GatewayState {
    pub registry: ModelRegistry,
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(registry: ModelRegistry) -> Router {
    let state = Arc::new(GatewayState { registry });
    Router::new()
        .route("/health", get(health_handler))
        .route("/openai/v1/models", get(chat::list_models))
        .route("/openai/v1/chat/completions", post(chat::chat_completions))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server.
pub async fn start(
    config: unillm_config::AppConfig,
    port_override: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let host = config.server.host.clone();
    let port = port_override.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");

    let providers = unillm_providers::build_from_config(&config)?;
    let registry = ModelRegistry::from_config(&config, &providers)?;
    info!(models = ?registry.names(), "Model registry ready");

    let app = build_router(registry);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use unillm_agent::TextGenerator;
    use unillm_core::error::ProviderError;
    use unillm_core::provider::*;

    use crate::chat::{ChatCompletion, ModelList};

    /// Lightweight mock provider for gateway tests.
    struct MockProvider {
        response_text: String,
        meta: ResponseMeta,
    }

    #[async_trait::async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            "gateway_mock"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                text: self.response_text.clone(),
                finish_reason: FinishReason::Stop,
                tool_calls: vec![],
                usage: Usage::new(10, 5),
                meta: self.meta.clone(),
            })
        }
    }

    struct DownProvider;

    #[async_trait::async_trait]
    impl Provider for DownProvider {
        fn name(&self) -> &str {
            "down"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::ApiError {
                status_code: 503,
                message: "upstream unavailable".into(),
            })
        }
    }

    fn test_app() -> Router {
        let mut registry = ModelRegistry::new();
        registry.register_generator(
            "nyx",
            TextGenerator::new(
                Arc::new(MockProvider {
                    response_text: "I'm Nyx!".into(),
                    meta: ResponseMeta::new("resp_1", "mock-model-0613"),
                }),
                "mock-model",
            ),
        );
        registry.register_generator("down", TextGenerator::new(Arc::new(DownProvider), "down-model"));
        build_router(registry)
    }

    fn chat_request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/openai/v1/chat/completions")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = test_app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn chat_completion() {
        let response = test_app()
            .oneshot(chat_request(json!({
                "model": "nyx",
                "messages": [{"role": "user", "content": "Who are you?"}]
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let completion: ChatCompletion = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(completion.object, "chat.completion");
        assert_eq!(completion.id, "resp_1");
        assert_eq!(completion.model, "mock-model-0613");
        assert_eq!(completion.choices[0].message.role, "assistant");
        assert_eq!(completion.choices[0].message.content, "I'm Nyx!");
        assert_eq!(completion.choices[0].finish_reason, "stop");
        assert_eq!(completion.usage.total_tokens, 15);
    }

    #[tokio::test]
    async fn chat_completion_without_upstream_meta() {
        let mut registry = ModelRegistry::new();
        registry.register_generator(
            "nyx",
            TextGenerator::new(
                Arc::new(MockProvider {
                    response_text: "I'm Nyx!".into(),
                    meta: ResponseMeta::default(),
                }),
                "mock-model",
            ),
        );

        let response = build_router(registry)
            .oneshot(chat_request(json!({
                "model": "nyx",
                "messages": [{"role": "user", "content": "Who are you?"}]
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let completion: ChatCompletion = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(completion.id.starts_with("chatcmpl-"));
        assert_eq!(completion.model, "nyx");
    }

    #[tokio::test]
    async fn streaming_single_chunk() {
        let response = test_app()
            .oneshot(chat_request(json!({
                "model": "nyx",
                "messages": [{"role": "user", "content": "Who are you?"}],
                "stream": true
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let text = body_text(response).await;
        let frames: Vec<&str> = text
            .lines()
            .filter_map(|l| l.strip_prefix("data: "))
            .collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], "[DONE]");

        let chunk: Value = serde_json::from_str(frames[0]).unwrap();
        assert_eq!(chunk["object"], "chat.completion.chunk");
        assert_eq!(chunk["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(chunk["choices"][0]["delta"]["content"], "I'm Nyx!");
    }

    #[tokio::test]
    async fn streaming_failure_sends_error_frame_without_done() {
        let response = test_app()
            .oneshot(chat_request(json!({
                "model": "down",
                "messages": [{"role": "user", "content": "hello"}],
                "stream": true
            })))
            .await
            .unwrap();

        let text = body_text(response).await;
        let frames: Vec<&str> = text
            .lines()
            .filter_map(|l| l.strip_prefix("data: "))
            .collect();
        assert_eq!(frames.len(), 1);
        let error: Value = serde_json::from_str(frames[0]).unwrap();
        assert!(
            error["error"]["message"]
                .as_str()
                .unwrap()
                .contains("upstream unavailable")
        );
    }

    #[tokio::test]
    async fn unregistered_model_is_server_error() {
        let response = test_app()
            .oneshot(chat_request(json!({
                "model": "unregistered",
                "messages": [{"role": "user", "content": "hi"}]
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(
            body["error"]["message"]
                .as_str()
                .unwrap()
                .contains("unregistered")
        );
    }

    #[tokio::test]
    async fn unknown_role_is_mapping_error() {
        let response = test_app()
            .oneshot(chat_request(json!({
                "model": "nyx",
                "messages": [{"role": "narrator", "content": "Once upon a time"}]
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(
            body["error"]["message"]
                .as_str()
                .unwrap()
                .contains("narrator")
        );
    }

    #[tokio::test]
    async fn provider_failure_is_server_error() {
        let response = test_app()
            .oneshot(chat_request(json!({
                "model": "down",
                "messages": [{"role": "user", "content": "hello"}]
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn list_models() {
        let req = Request::builder()
            .uri("/openai/v1/models")
            .body(Body::empty())
            .unwrap();
        let response = test_app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let list: ModelList = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(list.object, "list");
        let ids: Vec<&str> = list.data.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["down", "nyx"]);
    }
}

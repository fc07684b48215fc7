//! API routes for the gateway

use super::server::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use homelink_shared::{DeviceSpec, ReplyMeta};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};

type AppStateArc = Arc<AppState>;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub meta: ReplyMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub devices: usize,
}

#[derive(Debug, Serialize)]
pub struct DevicesResponse {
    pub confidence_threshold: f32,
    pub devices: Vec<DeviceSpec>,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// Chat
// ============================================================================

pub fn chat_routes() -> Router<AppStateArc> {
    Router::new().route("/api/chat", post(chat))
}

async fn chat(
    State(state): State<AppStateArc>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let message = match body {
        Ok(Json(req)) if !req.message.trim().is_empty() => req.message,
        Ok(_) => {
            return error_response(StatusCode::BAD_REQUEST, "Message must not be empty.");
        }
        Err(rejection) => {
            warn!("Rejected chat request: {}", rejection.body_text());
            return error_response(
                StatusCode::BAD_REQUEST,
                "Request body must be JSON with a string \"message\".",
            );
        }
    };

    match state.pipeline.handle(&message).await {
        Ok(composed) => {
            let status = StatusCode::from_u16(composed.status.http_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (
                status,
                Json(ChatResponse {
                    reply: composed.reply,
                    meta: composed.meta,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Chat request failed: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong.")
        }
    }
}

// ============================================================================
// Health and whitelist
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/health", get(health_check))
}

async fn health_check(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        devices: state.pipeline.registry().len(),
    })
}

pub fn device_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/devices", get(list_devices))
}

async fn list_devices(State(state): State<AppStateArc>) -> Json<DevicesResponse> {
    Json(DevicesResponse {
        confidence_threshold: state.pipeline.threshold(),
        devices: state.pipeline.registry().devices().cloned().collect(),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::command::ActionExecutor;
    use crate::config::ControllerConfig;
    use crate::http::server::router;
    use crate::llm::{Conversationalist, IntentClassifier};
    use crate::pipeline::Pipeline;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use homelink_shared::{DeviceRegistry, DispatchGate, IntentResult};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    /// Classifies by keyword so each test picks its path through the message
    struct KeywordClassifier;

    #[async_trait]
    impl IntentClassifier for KeywordClassifier {
        async fn classify(&self, message: &str, _whitelist: &DeviceRegistry) -> Result<IntentResult> {
            let raw = if message.contains("lights") {
                r#"{"intent":"turn_on","device":"lights","confidence":0.9,"reason":"lights"}"#
            } else if message.contains("fan") {
                r#"{"intent":"turn_off","device":"fan","confidence":0.9,"reason":"fan"}"#
            } else {
                "not json"
            };
            Ok(IntentResult::from_model_output(raw))
        }

        fn name(&self) -> &'static str {
            "keyword"
        }
    }

    struct StaticResponder;

    #[async_trait]
    impl Conversationalist for StaticResponder {
        async fn respond(&self, message: &str) -> Result<String> {
            if message.contains("crash") {
                return Err(anyhow!("upstream exploded at /srv/secret/path"));
            }
            Ok("Happy to help!".into())
        }

        fn name(&self) -> &'static str {
            "static"
        }
    }

    fn app() -> Router {
        let registry = Arc::new(
            DeviceRegistry::from_json(r#"{"lights": {"payloads": {"turn_on": "3101"}}}"#).unwrap(),
        );
        let controller = ControllerConfig {
            program: "sh".into(),
            prefix_args: vec![
                "-c".into(),
                r#"echo '{"ok":true,"payload":"3101"}'"#.into(),
                "controller".into(),
            ],
            timeout: Duration::from_secs(5),
        };
        let pipeline = Pipeline::new(
            Arc::new(KeywordClassifier),
            Arc::new(StaticResponder),
            DispatchGate::new(registry.clone(), 0.65),
            ActionExecutor::new(registry, &controller),
        );
        router(Arc::new(AppState::new(pipeline)))
    }

    async fn post_chat(body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_chat_executes_action() {
        let (status, body) = post_chat(r#"{"message": "turn on the lights"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["reply"].as_str().unwrap().contains("lights"));
        assert_eq!(body["meta"]["intent"], "turn_on");
        assert_eq!(body["meta"]["outcome"]["ok"], true);
        assert_eq!(body["meta"]["outcome"]["payload"], json!({"payload": "3101"}));
    }

    #[tokio::test]
    async fn test_chat_rejects_disallowed_device() {
        let (status, body) = post_chat(r#"{"message": "turn off the fan"}"#).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["reply"].as_str().is_some());
        assert_eq!(body["meta"]["decision"], "reject");
        assert_eq!(body["meta"]["reject_reason"], "DISALLOWED");
    }

    #[tokio::test]
    async fn test_chat_falls_back() {
        let (status, body) = post_chat(r#"{"message": "how are you?"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reply"], "Happy to help!");
        assert_eq!(body["meta"]["decision"], "fallback");
    }

    #[tokio::test]
    async fn test_chat_bad_requests() {
        for body in [
            r#"{"message": ""}"#,
            r#"{"message": "   "}"#,
            r#"{"message": 42}"#,
            r#"{"text": "hi"}"#,
            "not json at all",
        ] {
            let (status, value) = post_chat(body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
            assert!(value["error"].is_string());
        }
    }

    #[tokio::test]
    async fn test_chat_internal_error_is_generic() {
        let (status, body) = post_chat(r#"{"message": "crash please"}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "Something went wrong."}));
    }

    #[tokio::test]
    async fn test_health_and_devices() {
        let response = app()
            .oneshot(Request::get("/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["devices"], 1);

        let response = app()
            .oneshot(Request::get("/v1/devices").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["devices"][0]["name"], "lights");
        assert_eq!(body["devices"][0]["actions"], json!(["turn_on"]));
    }
}

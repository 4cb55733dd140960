//! HTTP 서버 (axum)
//!
//! - `POST /chat` - 질문 한 턴
//! - `GET /chat-sessions` - 세션 목록
//! - `GET /history/{session_id}` - 세션 기록
//! - `GET /health` - 상태 확인
//!
//! 미들웨어: CORS(GET/POST, 모든 origin), 요청 트레이싱

mod error;

pub use error::AppError;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::Method;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::chat::{ChatService, SessionHistory};
use crate::config::AppConfig;

// ============================================================================
// State & Router
// ============================================================================

/// 핸들러 공유 상태
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
}

/// 라우터 구성
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(chat))
        .route("/chat-sessions", get(list_sessions))
        .route("/history/{session_id}", get(history))
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 설정으로 서비스를 만들고 서버 실행
pub async fn serve(config: &AppConfig) -> Result<()> {
    let chat = ChatService::from_config(config)
        .await
        .context("Failed to initialize chat service")?;
    let router = build_router(AppState {
        chat: Arc::new(chat),
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Listening on http://{}", addr);
    axum::serve(listener, router).await.context("Server error")?;
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub session_id: String,
}

/// POST /chat
async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let reply = state
        .chat
        .chat(req.session_id.as_deref(), &req.question)
        .await?;

    Ok(Json(ChatResponse {
        answer: reply.answer,
        session_id: reply.session_id,
    }))
}

/// GET /chat-sessions
async fn list_sessions(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let sessions = state.chat.sessions().await?;
    Ok(Json(serde_json::json!({ "all_sessions": sessions })))
}

/// GET /history/{session_id}
async fn history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionHistory>, AppError> {
    Ok(Json(state.chat.history(&session_id).await?))
}

/// GET /health
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::testing::{service_with, FailingGenerator, RecordingGenerator};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn router(dir: &TempDir) -> Router {
        let service = service_with(dir, Arc::new(RecordingGenerator::default())).await;
        build_router(AppState {
            chat: Arc::new(service),
        })
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_chat(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_chat_then_history_and_sessions() {
        let dir = TempDir::new().unwrap();
        let app = router(&dir).await;

        let response = app
            .clone()
            .oneshot(post_chat(r#"{"question": "What is the capital of France?"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let reply = body_json(response).await;
        assert_eq!(reply["answer"], "answer 1");
        let session_id = reply["session_id"].as_str().unwrap().to_string();
        assert!(session_id.starts_with("what-is-the-capital-"));

        let response = app
            .clone()
            .oneshot(get_request(&format!("/history/{}", session_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let history = body_json(response).await;
        assert_eq!(history["session_id"], session_id.as_str());
        assert_eq!(
            history["history"],
            "Human: What is the capital of France?\nAI: answer 1"
        );
        assert_eq!(history["turns"].as_array().unwrap().len(), 1);

        let response = app.oneshot(get_request("/chat-sessions")).await.unwrap();
        let sessions = body_json(response).await;
        assert_eq!(sessions["all_sessions"], serde_json::json!([session_id]));
    }

    #[tokio::test]
    async fn test_blank_question_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let app = router(&dir).await;

        let response = app
            .oneshot(post_chat(r#"{"session_id": "s", "question": "  "}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["kind"], "invalid_input");
        assert!(body["detail"].as_str().unwrap().contains("question"));
    }

    #[tokio::test]
    async fn test_generation_failure_is_bad_gateway() {
        let dir = TempDir::new().unwrap();
        let service = service_with(&dir, Arc::new(FailingGenerator)).await;
        let app = build_router(AppState {
            chat: Arc::new(service),
        });

        let response = app
            .oneshot(post_chat(r#"{"session_id": "s", "question": "hello"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_json(response).await["kind"], "generation");
    }

    #[tokio::test]
    async fn test_health_and_cors() {
        let dir = TempDir::new().unwrap();
        let app = router(&dir).await;

        let request = Request::builder()
            .uri("/health")
            .header("origin", "http://localhost:5173")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_unknown_session_history_is_empty() {
        let dir = TempDir::new().unwrap();
        let app = router(&dir).await;

        let response = app.oneshot(get_request("/history/fresh")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let history = body_json(response).await;
        assert_eq!(history["history"], "");
        assert!(history["turns"].as_array().unwrap().is_empty());
    }
}

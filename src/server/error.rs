//! HTTP 에러 응답
//!
//! `RagError` 종류별로 상태 코드를 정하고 `{detail, kind}` 본문으로 돌려줍니다.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::RagError;

/// 핸들러 에러
#[derive(Debug)]
pub struct AppError(pub RagError);

impl From<RagError> for AppError {
    fn from(e: RagError) -> Self {
        AppError(e)
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            RagError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RagError::EmbeddingBackend(_) | RagError::Generation(_) => StatusCode::BAD_GATEWAY,
            RagError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RagError::Ingestion { .. } | RagError::DimensionMismatch { .. } | RagError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed ({}): {}", self.0.kind(), self.0);
        } else {
            tracing::debug!("Request rejected ({}): {}", self.0.kind(), self.0);
        }

        let body = json!({
            "detail": self.0.to_string(),
            "kind": self.0.kind(),
        });
        (status, Json(body)).into_response()
    }
}

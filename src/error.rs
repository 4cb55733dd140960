//! 에러 타입
//!
//! 검색/메모리 코어가 경계 계층(CLI, HTTP)으로 전달하는 실패 종류입니다.
//! 경계 계층은 `kind()`로 실패 원인을 구분해 사용자 메시지를 결정합니다.

use thiserror::Error;

/// RAG 코어 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 문서 레코드 누락/형식 오류 (해당 문서만 실패)
    #[error("ingestion failed for '{document}': {reason}")]
    Ingestion { document: String, reason: String },

    /// 임베딩 백엔드 접근 불가 또는 잘못된 응답 형태
    #[error("embedding backend error: {0}")]
    EmbeddingBackend(String),

    /// 영구 저장소(벡터 DB, 세션 DB) 열기/쓰기 실패
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// 임베딩 차원 불일치
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// 잘못된 호출 인자
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// 답변 생성 실패
    #[error("answer generation failed: {0}")]
    Generation(String),

    /// 설정 파일 오류
    #[error("config error: {0}")]
    Config(String),
}

impl RagError {
    /// 실패 종류 식별자 (직렬화/패턴 매칭용)
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::Ingestion { .. } => "ingestion",
            RagError::EmbeddingBackend(_) => "embedding_backend",
            RagError::StoreUnavailable(_) => "store_unavailable",
            RagError::DimensionMismatch { .. } => "dimension_mismatch",
            RagError::InvalidInput(_) => "invalid_input",
            RagError::Generation(_) => "generation",
            RagError::Config(_) => "config",
        }
    }

    pub(crate) fn ingestion(document: impl Into<String>, reason: impl Into<String>) -> Self {
        RagError::Ingestion {
            document: document.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn store(context: &str, err: impl std::fmt::Display) -> Self {
        RagError::StoreUnavailable(format!("{}: {}", context, err))
    }
}

impl From<rusqlite::Error> for RagError {
    fn from(e: rusqlite::Error) -> Self {
        RagError::StoreUnavailable(format!("sqlite: {}", e))
    }
}

impl From<lancedb::Error> for RagError {
    fn from(e: lancedb::Error) -> Self {
        RagError::StoreUnavailable(format!("lancedb: {}", e))
    }
}

/// 코어 결과 타입
pub type Result<T> = std::result::Result<T, RagError>;

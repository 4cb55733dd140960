//! 설정 모듈
//!
//! `<data_dir>/config.toml`(또는 `--config` 경로)을 프로세스 시작 시 한 번 읽습니다.
//! 파일이 없으면 기본값을 사용하고, 형식이 잘못되었거나 값이 유효하지 않으면
//! `RagError::Config`로 즉시 실패합니다.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::knowledge::{ChunkConfig, DistanceMetric};

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.rag-assistant/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".rag-assistant")
}

/// 기본 설정 파일 경로
pub fn default_config_path() -> PathBuf {
    get_data_dir().join("config.toml")
}

// ============================================================================
// Sections
// ============================================================================

/// 벡터 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// LanceDB 디렉토리
    pub path: PathBuf,
    /// 컬렉션(도메인) 이름
    pub collection: String,
    /// 거리 함수 (적재 시와 조회 시 동일해야 함)
    pub distance: DistanceMetric,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: get_data_dir().join("vector_db"),
            collection: "publications".to_string(),
            distance: DistanceMetric::L2,
        }
    }
}

/// 세션 메모리 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// SQLite 파일 경로
    pub path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: get_data_dir().join("sessions.db"),
        }
    }
}

/// 임베딩 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
    pub base_url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "gemini-embedding-001".to_string(),
            dimension: 768,
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }
}

/// 검색 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// 최근접 후보 수
    pub n_results: usize,
    /// 거리 임계값 (미만만 통과)
    ///
    /// 임베딩 모델과 거리 함수 조합에 종속된 값이므로 둘 중 하나를 바꾸면 다시 조정해야 합니다.
    pub threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            n_results: 5,
            threshold: 0.3,
        }
    }
}

/// 답변 생성 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub base_url: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            temperature: 0.2,
            max_output_tokens: 2048,
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }
}

/// 프롬프트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// 어시스턴트 역할 설명
    pub role: String,
    /// 답변 규칙
    pub instructions: Vec<String>,
    /// 관련 문서가 없을 때 프롬프트에 넣을 안내
    pub no_context_note: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            role: "You are a helpful research assistant that answers questions about a \
                   collection of publications."
                .to_string(),
            instructions: vec![
                "Answer only from the provided documents and the conversation so far.".to_string(),
                "If the documents do not contain the answer, say that you don't know.".to_string(),
                "Keep answers concise and cite the publication title when possible.".to_string(),
            ],
            no_context_note: "No relevant documents were found for this question.".to_string(),
        }
    }
}

/// 문서 적재 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// 원본 문서 디렉토리
    pub data_dir: PathBuf,
    /// PDF 포함 여부
    pub include_pdfs: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            include_pdfs: false,
        }
    }
}

/// HTTP 서버 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
        }
    }
}

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

// ============================================================================
// AppConfig
// ============================================================================

/// 전체 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub sessions: SessionConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub chunking: ChunkConfig,
    pub generation: GenerationConfig,
    pub prompt: PromptConfig,
    pub ingest: IngestConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// TOML 문자열 파싱 + 검증
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(content).map_err(|e| RagError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 값 검증
    pub fn validate(&self) -> Result<()> {
        self.chunking
            .validate()
            .map_err(|e| RagError::Config(format!("chunking: {}", e)))?;

        if self.store.collection.trim().is_empty() {
            return Err(RagError::Config("store.collection must not be empty".into()));
        }
        if self.retrieval.n_results == 0 {
            return Err(RagError::Config("retrieval.n_results must be positive".into()));
        }
        if !self.retrieval.threshold.is_finite() || self.retrieval.threshold < 0.0 {
            return Err(RagError::Config(format!(
                "retrieval.threshold must be a finite non-negative number, got {}",
                self.retrieval.threshold
            )));
        }
        if self.embedding.dimension == 0 {
            return Err(RagError::Config("embedding.dimension must be positive".into()));
        }

        Ok(())
    }
}

/// 설정 파일 로드
///
/// - 파일이 없으면 기본값
/// - 읽기/파싱/검증 실패 시 `RagError::Config`
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(AppConfig::default());
        }
        Err(err) => {
            return Err(RagError::Config(format!(
                "failed to read {}: {}",
                path.display(),
                err
            )))
        }
    };

    let config = AppConfig::from_toml_str(&content)
        .map_err(|e| RagError::Config(format!("{}: {}", path.display(), e)))?;

    tracing::info!("Config loaded from {}", path.display());
    Ok(config)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.store.collection, "publications");
        assert_eq!(config.retrieval.n_results, 5);
        assert!((config.retrieval.threshold - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.server.port, 9000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.embedding.model, "gemini-embedding-001");
    }

    #[test]
    fn test_partial_file_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[store]
collection = "papers"
distance = "cosine"

[retrieval]
threshold = 0.5

[chunking]
chunk_size = 500
chunk_overlap = 50
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.store.collection, "papers");
        assert_eq!(config.store.distance, DistanceMetric::Cosine);
        assert!((config.retrieval.threshold - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.retrieval.n_results, 5);
        assert_eq!(config.chunking.chunk_size, 500);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is not { valid toml").unwrap();

        let err = load_config(&path).unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let err = AppConfig::from_toml_str(
            r#"
[chunking]
chunk_size = 100
chunk_overlap = 100
"#,
        )
        .unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let err = AppConfig::from_toml_str("[retrieval]\nthreshold = -0.1\n").unwrap_err();
        assert_eq!(err.kind(), "config");
    }
}

//! 임베딩 모듈 - Gemini API를 통한 텍스트 벡터화
//!
//! 텍스트 배치를 같은 길이/순서의 고정 차원 벡터로 변환합니다.
//! 백엔드 접근 실패나 개수/차원이 맞지 않는 응답은 `EmbeddingBackend` 에러이며,
//! 부분 결과는 돌려주지 않습니다. 재시도는 호출자 몫입니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = GeminiEmbedding::from_env(&config.embedding)?;
//! let vectors = embed_documents(&embedder, &["Hello, world!".to_string()]).await?;
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 검색 질의 임베딩 (기본 구현: 문서와 동일)
    ///
    /// 질의/문서 임베딩을 구분하는 모델은 재정의합니다.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 모델 이름
    fn name(&self) -> &str;
}

/// 배치 임베딩 + 응답 형태 검증
///
/// 입력과 개수가 다르거나 차원이 프로바이더 선언과 다르면 `EmbeddingBackend`.
pub async fn embed_documents(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(vec![]);
    }

    let vectors = provider.embed_batch(texts).await?;

    if vectors.len() != texts.len() {
        return Err(RagError::EmbeddingBackend(format!(
            "{} returned {} embeddings for {} inputs",
            provider.name(),
            vectors.len(),
            texts.len()
        )));
    }

    if let Some(bad) = vectors.iter().find(|v| v.len() != provider.dimension()) {
        return Err(RagError::EmbeddingBackend(format!(
            "{} returned a {}-dimensional embedding, expected {}",
            provider.name(),
            bad.len(),
            provider.dimension()
        )));
    }

    Ok(vectors)
}

/// 검색 질의 임베딩 + 차원 검증
pub async fn embed_question(provider: &dyn EmbeddingProvider, question: &str) -> Result<Vec<f32>> {
    let vector = provider.embed_query(question).await?;
    if vector.len() != provider.dimension() {
        return Err(RagError::EmbeddingBackend(format!(
            "{} returned a {}-dimensional query embedding, expected {}",
            provider.name(),
            vector.len(),
            provider.dimension()
        )));
    }
    Ok(vector)
}

/// 단위 벡터로 정규화 (영벡터는 그대로)
pub fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
    vector
}

// ============================================================================
// Google Gemini Embedding
// ============================================================================

/// 지원 차원 (gemini-embedding-001 MRL)
/// source: https://ai.google.dev/gemini-api/docs/embeddings
const VALID_DIMENSIONS: [usize; 3] = [768, 1536, 3072];

/// API가 정규화된 벡터를 돌려주는 차원 (나머지는 직접 정규화)
const NORMALIZED_DIMENSION: usize = 3072;

/// taskType 값
const TASK_DOCUMENT: &str = "RETRIEVAL_DOCUMENT";
const TASK_QUERY: &str = "RETRIEVAL_QUERY";

/// batchEmbedContents 요청당 최대 텍스트 수
const MAX_BATCH_SIZE: usize = 100;

/// Rate Limiter 설정 (Gemini 무료 티어: 60 RPM)
const RATE_LIMIT_RPM: u32 = 60;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
/// 호출 간 최소 딜레이 (1000ms = 60 RPM 준수)
const MIN_DELAY_MS: u64 = 1000;

/// Google Gemini 임베딩 구현체
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
    dimension: usize,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

/// Rate Limiter with minimum delay between requests
#[derive(Debug)]
struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            requests: Vec::new(),
            max_requests,
            window,
            min_delay: Duration::from_millis(MIN_DELAY_MS),
            last_request: None,
        }
    }

    /// 요청 가능 여부 확인 및 대기
    async fn acquire(&mut self) {
        // 1. 최소 딜레이 적용 (버스트 방지)
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!("Min delay: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        let now = Instant::now();

        // 2. 윈도우 밖의 오래된 요청 제거
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        // 3. Rate limit 초과 시 대기
        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        // 4. 현재 요청 기록
        let now = Instant::now();
        self.requests.push(now);
        self.last_request = Some(now);
    }
}

impl GeminiEmbedding {
    /// 새 Gemini 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `config` - 모델/차원/엔드포인트 설정
    pub fn new(api_key: String, config: &EmbeddingConfig) -> Result<Self> {
        if !VALID_DIMENSIONS.contains(&config.dimension) {
            return Err(RagError::InvalidInput(format!(
                "Invalid dimension: {}. Must be 768, 1536, or 3072",
                config.dimension
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RagError::EmbeddingBackend(format!("Failed to create HTTP client: {}", e)))?;

        let rate_limiter = Arc::new(Mutex::new(RateLimiter::new(
            RATE_LIMIT_RPM,
            RATE_LIMIT_WINDOW,
        )));

        Ok(Self {
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            dimension: config.dimension,
            rate_limiter,
        })
    }

    /// 환경변수에서 API 키를 읽어 생성
    pub fn from_env(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = get_api_key()?;
        Self::new(api_key, config)
    }

    fn model_path(&self) -> String {
        format!("models/{}", self.model)
    }

    fn request_for(&self, text: &str, task_type: &str) -> EmbedRequest {
        EmbedRequest {
            model: self.model_path(),
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.to_string(),
                }],
            },
            task_type: task_type.to_string(),
            output_dimensionality: Some(self.dimension),
        }
    }

    /// 잘린(MRL) 차원 출력은 정규화해 거리 척도를 맞춤
    fn finish(&self, values: Vec<f32>) -> Vec<f32> {
        if self.dimension == NORMALIZED_DIMENSION {
            values
        } else {
            normalize(values)
        }
    }

    /// API 호출 + 에러 응답 해석
    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(&self, method: &str, body: &B) -> Result<R> {
        {
            let mut limiter = self.rate_limiter.lock().await;
            limiter.acquire().await;
        }

        let url = format!("{}/{}:{}", self.base_url, self.model_path(), method);

        // API 키는 URL이 아닌 헤더로 전송
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| RagError::EmbeddingBackend(format!("Failed to send embedding request: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RagError::EmbeddingBackend(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<GeminiError>(&text) {
                return Err(RagError::EmbeddingBackend(format!(
                    "Gemini API error ({}): {}",
                    error.error.status, error.error.message
                )));
            }
            return Err(RagError::EmbeddingBackend(format!(
                "Gemini API error ({}): {}",
                status, text
            )));
        }

        serde_json::from_str(&text).map_err(|e| {
            RagError::EmbeddingBackend(format!("Failed to parse embedding response: {}", e))
        })
    }
}

/// Gemini API 요청 본문
/// source: https://ai.google.dev/gemini-api/docs/embeddings
#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: EmbedContent,
    #[serde(rename = "taskType")]
    task_type: String,
    #[serde(rename = "outputDimensionality", skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

/// Gemini API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Gemini API 에러 응답
#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = self.request_for(text, TASK_DOCUMENT);
        let response: EmbedResponse = self.post("embedContent", &request).await?;
        Ok(self.finish(response.embedding.values))
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let request = self.request_for(text, TASK_QUERY);
        let response: EmbedResponse = self.post("embedContent", &request).await?;
        Ok(self.finish(response.embedding.values))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());

        for (i, group) in texts.chunks(MAX_BATCH_SIZE).enumerate() {
            tracing::debug!(
                "Embedding batch {}/{}",
                i + 1,
                texts.len().div_ceil(MAX_BATCH_SIZE)
            );

            let request = BatchEmbedRequest {
                requests: group
                    .iter()
                    .map(|t| self.request_for(t, TASK_DOCUMENT))
                    .collect(),
            };
            let response: BatchEmbedResponse = self.post("batchEmbedContents", &request).await?;

            if response.embeddings.len() != group.len() {
                return Err(RagError::EmbeddingBackend(format!(
                    "batchEmbedContents returned {} embeddings for {} inputs",
                    response.embeddings.len(),
                    group.len()
                )));
            }

            results.extend(response.embeddings.into_iter().map(|e| self.finish(e.values)));
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_api_key() -> Result<String> {
    for var in ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(key);
            }
        }
    }

    Err(RagError::EmbeddingBackend(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.\n\
         Get your API key at: https://aistudio.google.com/app/apikey"
            .to_string(),
    ))
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    get_api_key().is_ok()
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정으로 임베딩 프로바이더 생성
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder = GeminiEmbedding::from_env(config)?;
    tracing::info!(
        "Using Gemini API embedding (model: {}, dimension: {})",
        embedder.name(),
        embedder.dimension()
    );
    Ok(Arc::new(embedder))
}

// ============================================================================
// Test Doubles
// ============================================================================


// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_invalid_dimension() {
        let config = EmbeddingConfig {
            dimension: 999,
            ..EmbeddingConfig::default()
        };
        let err = GeminiEmbedding::new("fake_key".to_string(), &config).unwrap_err();
        assert!(err.to_string().contains("Invalid dimension"));
    }

    #[test]
    fn test_valid_dimensions() {
        for dim in VALID_DIMENSIONS {
            let config = EmbeddingConfig {
                dimension: dim,
                ..EmbeddingConfig::default()
            };
            let embedder = GeminiEmbedding::new("fake_key".to_string(), &config).unwrap();
            assert_eq!(embedder.dimension(), dim);
            assert_eq!(embedder.name(), "gemini-embedding-001");
        }
    }

    #[test]
    fn test_batch_request_shape() {
        let embedder =
            GeminiEmbedding::new("fake_key".to_string(), &EmbeddingConfig::default()).unwrap();
        let request = BatchEmbedRequest {
            requests: vec![embedder.request_for("hello", TASK_DOCUMENT)],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["requests"][0]["model"], "models/gemini-embedding-001");
        assert_eq!(json["requests"][0]["content"]["parts"][0]["text"], "hello");
        assert_eq!(json["requests"][0]["taskType"], "RETRIEVAL_DOCUMENT");
        assert_eq!(json["requests"][0]["outputDimensionality"], 768);

        let query = serde_json::to_value(embedder.request_for("where?", TASK_QUERY)).unwrap();
        assert_eq!(query["taskType"], "RETRIEVAL_QUERY");
    }

    #[test]
    fn test_truncated_dimensions_are_normalized() {
        let embedder =
            GeminiEmbedding::new("fake_key".to_string(), &EmbeddingConfig::default()).unwrap();
        let v = embedder.finish(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let full = GeminiEmbedding::new(
            "fake_key".to_string(),
            &EmbeddingConfig {
                dimension: 3072,
                ..EmbeddingConfig::default()
            },
        )
        .unwrap();
        assert_eq!(full.finish(vec![3.0, 4.0]), vec![3.0, 4.0]);

        assert_eq!(normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_embed_question_checks_dimension() {
        let embedder = KeywordEmbedding::new(&["france"]);
        let v = embed_question(&embedder, "France?").await.unwrap();
        assert_eq!(v.len(), 2);

        let err = embed_question(&FailingEmbedding, "France?").await.unwrap_err();
        assert_eq!(err.kind(), "embedding_backend");
    }

    #[tokio::test]
    async fn test_embed_documents_preserves_order() {
        let embedder = KeywordEmbedding::new(&["france", "rust"]);
        let texts = vec!["Rust crates".to_string(), "Paris, France".to_string()];
        let vectors = embed_documents(&embedder, &texts).await.unwrap();

        assert_eq!(vectors.len(), 2);
        assert!(vectors[0][1] > 0.9);
        assert!(vectors[1][0] > 0.9);
    }

    #[tokio::test]
    async fn test_embed_documents_rejects_short_batch() {
        let texts = vec!["a".to_string(), "b".to_string()];
        let err = embed_documents(&ShortBatchEmbedding, &texts).await.unwrap_err();
        assert_eq!(err.kind(), "embedding_backend");
    }

    #[tokio::test]
    async fn test_embed_documents_propagates_backend_error() {
        let err = embed_documents(&FailingEmbedding, &["a".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "embedding_backend");
    }

    #[tokio::test]
    async fn test_embed_documents_empty_input() {
        let vectors = embed_documents(&FailingEmbedding, &[]).await.unwrap();
        assert!(vectors.is_empty());
    }
}

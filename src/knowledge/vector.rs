//! Vector Store - 벡터 저장소 트레이트 및 유틸리티
//!
//! 저장소(`VectorStore`)는 이름으로 구분되는 컬렉션(`Collection`)을 돌려주고,
//! 컬렉션은 (id, text, embedding) 엔트리의 upsert 와 최근접 조회를 제공합니다.
//! LanceDB 구현과 인메모리 구현이 같은 트레이트를 구현합니다.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

// ============================================================================
// Types
// ============================================================================

/// 벡터 엔트리 (저장용)
#[derive(Debug, Clone, PartialEq)]
pub struct VectorEntry {
    /// 컬렉션 내 고유 ID
    pub id: String,
    /// 청크 텍스트
    pub text: String,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

impl VectorEntry {
    /// 병렬 슬라이스(ids/texts/embeddings)를 엔트리 목록으로 묶기
    ///
    /// 세 슬라이스 길이가 다르면 `InvalidInput`.
    pub fn zip(ids: &[String], texts: &[String], embeddings: &[Vec<f32>]) -> Result<Vec<Self>> {
        if ids.len() != texts.len() || ids.len() != embeddings.len() {
            return Err(RagError::InvalidInput(format!(
                "ids/texts/embeddings length mismatch: {}/{}/{}",
                ids.len(),
                texts.len(),
                embeddings.len()
            )));
        }

        Ok(ids
            .iter()
            .zip(texts)
            .zip(embeddings)
            .map(|((id, text), embedding)| VectorEntry {
                id: id.clone(),
                text: text.clone(),
                embedding: embedding.clone(),
            })
            .collect())
    }
}

/// 조회 결과 (거리 오름차순)
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    pub id: String,
    pub text: String,
    /// 작을수록 유사
    pub distance: f32,
}

/// 거리 함수
///
/// 적재 시와 조회 시 같은 함수를 써야 임계값이 의미를 가집니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// 제곱 유클리드 거리
    #[default]
    L2,
    /// 1 - 코사인 유사도 (0.0 ~ 2.0)
    Cosine,
}

impl DistanceMetric {
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::L2 => squared_l2(a, b),
            DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::L2 => "l2",
            DistanceMetric::Cosine => "cosine",
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// 컬렉션 핸들
#[async_trait]
pub trait Collection: Send + Sync {
    /// 컬렉션 이름
    fn name(&self) -> &str;

    /// 삽입 또는 ID 기준 교체
    ///
    /// 한 호출 안에서 임베딩 길이가 다르거나 컬렉션 차원과 다르면 `DimensionMismatch`.
    async fn upsert(&self, entries: &[VectorEntry]) -> Result<usize>;

    /// 문서 단위 교체
    ///
    /// `entries`를 upsert하고, `document_ids` 문서에 속하지만 `entries`에 없는
    /// 청크는 삭제합니다. 청크가 줄어든 문서를 다시 적재해도 이전 청크가 남지 않습니다.
    async fn replace_documents(
        &self,
        document_ids: &[String],
        entries: &[VectorEntry],
    ) -> Result<usize>;

    /// 최근접 `n_results` 개 조회 (거리 오름차순, 빈 컬렉션이면 빈 결과)
    async fn query(&self, query_embedding: &[f32], n_results: usize) -> Result<Vec<QueryHit>>;

    /// 엔트리 개수
    async fn count(&self) -> Result<usize>;
}

/// 저장소 핸들
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 컬렉션 열기 (없으면 생성, 멱등)
    async fn get_or_create_collection(&self, name: &str) -> Result<Arc<dyn Collection>>;

    /// 컬렉션 이름 목록
    async fn collection_names(&self) -> Result<Vec<String>>;

    /// 거리 함수
    fn metric(&self) -> DistanceMetric;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 엔트리들의 임베딩 차원이 모두 같은지 확인하고 그 차원을 반환
///
/// `expected`가 주어지면 그 값과도 비교합니다.
pub fn check_dimensions(entries: &[VectorEntry], expected: Option<usize>) -> Result<Option<usize>> {
    let mut dimension = expected;

    for entry in entries {
        let actual = entry.embedding.len();
        match dimension {
            Some(expected) if expected != actual => {
                return Err(RagError::DimensionMismatch { expected, actual });
            }
            Some(_) => {}
            None => dimension = Some(actual),
        }
    }

    Ok(dimension)
}

/// 청크 ID: `"{document_id}-{chunk_index}"`
pub fn chunk_id(document_id: &str, index: usize) -> String {
    format!("{}-{}", document_id, index)
}

/// 청크 ID에서 문서 ID 추출 (마지막 `-` 뒤가 숫자일 때만)
///
/// `"a-1-0"`은 문서 `"a-1"`의 청크이며 문서 `"a"`의 청크가 아닙니다.
pub fn document_of(chunk_id: &str) -> Option<&str> {
    let (document, index) = chunk_id.rsplit_once('-')?;
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(document)
}

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// 제곱 유클리드 거리
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

// ============================================================================
// Tests
// ============================================================================

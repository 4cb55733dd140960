//! Retriever - 임계값 필터 기반 검색
//!
//! 질문 임베딩 → 최근접 `n_results` 조회 → `distance < threshold`만 유지.
//! 저장소가 돌려준 순서(거리 오름차순)를 그대로 보존합니다.
//! 빈 컬렉션이거나 모두 걸러진 경우 빈 결과이며 에러가 아닙니다.

use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::embedding::{embed_question, EmbeddingProvider};
use crate::error::{RagError, Result};

use super::vector::{Collection, QueryHit};

/// 거리 포함 검색 결과
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedPassage {
    pub text: String,
    pub distance: f32,
}

/// 임계값 필터 (경계값 `distance == threshold`는 제외)
pub fn filter_by_threshold(hits: Vec<QueryHit>, threshold: f32) -> Vec<RetrievedPassage> {
    hits.into_iter()
        .filter(|hit| hit.distance < threshold)
        .map(|hit| RetrievedPassage {
            text: hit.text,
            distance: hit.distance,
        })
        .collect()
}

/// 검색기
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    collection: Arc<dyn Collection>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        collection: Arc<dyn Collection>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            collection,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn collection(&self) -> &Arc<dyn Collection> {
        &self.collection
    }

    /// 기본 설정으로 검색, 텍스트만 반환
    pub async fn retrieve(&self, question: &str) -> Result<Vec<String>> {
        self.retrieve_with(question, self.config.n_results, self.config.threshold)
            .await
    }

    /// 후보 수/임계값을 지정해 검색, 텍스트만 반환
    pub async fn retrieve_with(
        &self,
        question: &str,
        n_results: usize,
        threshold: f32,
    ) -> Result<Vec<String>> {
        Ok(self
            .retrieve_scored(question, n_results, threshold)
            .await?
            .into_iter()
            .map(|p| p.text)
            .collect())
    }

    /// 거리까지 포함한 검색 결과
    pub async fn retrieve_scored(
        &self,
        question: &str,
        n_results: usize,
        threshold: f32,
    ) -> Result<Vec<RetrievedPassage>> {
        if question.trim().is_empty() {
            return Err(RagError::InvalidInput("question must not be empty".into()));
        }

        let query_embedding = embed_question(self.embedder.as_ref(), question).await?;

        let hits = self.collection.query(&query_embedding, n_results).await?;
        let candidates = hits.len();
        let passages = filter_by_threshold(hits, threshold);

        tracing::debug!(
            "Retrieved {}/{} passages under threshold {} from {}",
            passages.len(),
            candidates,
            threshold,
            self.collection.name()
        );

        Ok(passages)
    }
}

// ============================================================================
// Tests
// ============================================================================

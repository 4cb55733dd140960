//! 문서 적재 파이프라인
//!
//! 문서 → 청킹 → 임베딩 → 컬렉션 upsert.
//! 청크 ID는 `"{document_id}-{chunk_index}"`로 고정되어 같은 문서를 다시 적재하면
//! 기존 엔트리를 교체하고, 새 버전에 없는 이전 청크는 삭제합니다.

use std::collections::HashSet;
use std::sync::Arc;

use crate::embedding::{embed_documents, EmbeddingProvider};
use crate::error::{RagError, Result};

use super::chunker::Chunker;
use super::document::Document;
use super::vector::{chunk_id, Collection, VectorEntry};

/// 적재 결과
#[derive(Debug, Default)]
pub struct IngestReport {
    /// 적재된 문서 수
    pub documents: usize,
    /// 저장된 청크 수
    pub chunks: usize,
    /// 건너뛴 문서
    pub failures: Vec<RagError>,
}

/// 적재기
pub struct Ingestor {
    chunker: Box<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
    collection: Arc<dyn Collection>,
}

impl Ingestor {
    pub fn new(
        chunker: Box<dyn Chunker>,
        embedder: Arc<dyn EmbeddingProvider>,
        collection: Arc<dyn Collection>,
    ) -> Self {
        Self {
            chunker,
            embedder,
            collection,
        }
    }

    /// 문서 목록 적재
    ///
    /// 본문이 빈 문서와 같은 배치 안에서 ID가 중복된 문서는 `failures`에 모으고
    /// 건너뜁니다. 임베딩/저장소 실패는 전체 실행을 중단합니다.
    pub async fn ingest(&self, documents: &[Document]) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        let mut document_ids: Vec<String> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut ids = Vec::new();
        let mut texts = Vec::new();

        for doc in documents {
            if !seen.insert(doc.id.as_str()) {
                tracing::warn!("Skipping duplicate document id: {}", doc.id);
                report
                    .failures
                    .push(RagError::ingestion(&doc.id, "duplicate document id"));
                continue;
            }

            if doc.text.trim().is_empty() {
                report
                    .failures
                    .push(RagError::ingestion(&doc.id, "document text is empty"));
                continue;
            }

            let chunks = self.chunker.chunk(&doc.combined_text());
            tracing::debug!("{}: {} chunks ({})", doc.id, chunks.len(), self.chunker.name());

            for (index, chunk) in chunks.into_iter().enumerate() {
                ids.push(chunk_id(&doc.id, index));
                texts.push(chunk);
            }
            document_ids.push(doc.id.clone());
            report.documents += 1;
        }

        if texts.is_empty() {
            tracing::info!("Nothing to ingest ({} failures)", report.failures.len());
            return Ok(report);
        }

        tracing::info!(
            "Embedding {} chunks from {} documents with {}",
            texts.len(),
            report.documents,
            self.embedder.name()
        );
        let embeddings = embed_documents(self.embedder.as_ref(), &texts).await?;

        let entries = VectorEntry::zip(&ids, &texts, &embeddings)?;
        report.chunks = self
            .collection
            .replace_documents(&document_ids, &entries)
            .await?;

        tracing::info!(
            "Ingested {} chunks into '{}'",
            report.chunks,
            self.collection.name()
        );
        Ok(report)
    }
}

// ============================================================================
// Tests
// ============================================================================

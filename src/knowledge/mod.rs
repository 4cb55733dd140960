//! Knowledge 모듈 - 검색 코어
//!
//! - Chunker: 재귀 문자 분할 (문단 → 줄 → 단어 → 문자)
//! - Vector: 컬렉션/저장소 트레이트와 거리 함수
//! - LanceDB: 영구 벡터 저장소
//! - InMemory: 테스트/일회성 저장소
//! - Retriever: 임계값 필터 검색
//! - Ingest: 문서 적재 파이프라인

mod chunker;
mod document;
pub(crate) mod in_memory;
mod ingest;
pub(crate) mod lance;
mod retriever;
pub(crate) mod vector;

// Re-exports
pub use chunker::{
    chunk, default_chunker, recursive_chunker, ChunkConfig, Chunker, RecursiveChunker,
};
pub use document::Document;
pub use in_memory::{InMemoryCollection, InMemoryVectorStore};
pub use ingest::{IngestReport, Ingestor};
pub use lance::{LanceCollection, LanceVectorStore};
pub use retriever::{filter_by_threshold, RetrievedPassage, Retriever};
pub use vector::{
    check_dimensions, chunk_id, cosine_similarity, document_of, squared_l2, Collection,
    DistanceMetric, QueryHit, VectorEntry, VectorStore,
};

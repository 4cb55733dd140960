//! rag-assistant - 세션 메모리 기반 RAG 질의응답 서비스
//!
//! 문서를 청킹/임베딩해 LanceDB에 적재하고, 질문마다 임계값 필터 검색 결과와
//! 세션 대화 기록(SQLite)을 묶어 답변을 생성합니다.

pub mod chat;
pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod knowledge;
pub mod memory;
pub mod server;

// Re-exports
pub use chat::{AnswerGenerator, ChatReply, ChatService, GeminiGenerator, Prompt, SessionHistory};
pub use config::{load_config, AppConfig};
pub use embedding::{embed_documents, get_api_key, has_api_key, EmbeddingProvider, GeminiEmbedding};
pub use error::{RagError, Result};
pub use knowledge::{
    chunk, ChunkConfig, Chunker, Collection, DistanceMetric, Document, IngestReport, Ingestor,
    InMemoryVectorStore, LanceVectorStore, QueryHit, RecursiveChunker, Retriever, VectorEntry,
    VectorStore,
};
pub use memory::{new_session_id, ConversationTurn, SessionMemory, SessionStore};

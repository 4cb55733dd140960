//! Chat 모듈 - 질의응답 오케스트레이터
//!
//! 한 턴의 흐름:
//! 1. 세션 ID 결정 (없으면 질문으로 생성)
//! 2. 세션 메모리 준비 + 기록 로드
//! 3. 임계값 필터 검색
//! 4. 프롬프트 구성 → 답변 생성
//! 5. 턴 추가
//!
//! SQLite 작업은 `spawn_blocking`에서 실행합니다.

mod generator;
mod prompt;

pub use generator::{AnswerGenerator, GeminiGenerator, Prompt};
pub use prompt::build_prompt;

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use crate::config::{AppConfig, PromptConfig};
use crate::embedding::create_embedder;
use crate::error::{RagError, Result};
use crate::knowledge::{LanceVectorStore, Retriever, VectorStore};
use crate::memory::{new_session_id, render_transcript, ConversationTurn, SessionStore};

// ============================================================================
// Types
// ============================================================================

/// 한 턴의 응답
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub session_id: String,
    pub answer: String,
    /// 프롬프트에 들어간 문서 조각
    pub sources: Vec<String>,
}

/// 세션 기록
#[derive(Debug, Clone, Serialize)]
pub struct SessionHistory {
    pub session_id: String,
    /// `Human:` / `AI:` 줄로 렌더링한 기록
    pub history: String,
    pub turns: Vec<ConversationTurn>,
}

// ============================================================================
// ChatService
// ============================================================================

/// 질의응답 서비스
pub struct ChatService {
    retriever: Retriever,
    sessions: SessionStore,
    generator: Arc<dyn AnswerGenerator>,
    prompt: PromptConfig,
}

impl ChatService {
    pub fn new(
        retriever: Retriever,
        sessions: SessionStore,
        generator: Arc<dyn AnswerGenerator>,
        prompt: PromptConfig,
    ) -> Self {
        Self {
            retriever,
            sessions,
            generator,
            prompt,
        }
    }

    /// 설정으로 전체 구성 (LanceDB + SQLite + Gemini)
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let retriever = open_retriever(config).await?;

        let session_path = config.sessions.path.clone();
        let sessions = run_blocking(move || SessionStore::open(&session_path)).await?;

        let generator = GeminiGenerator::from_env(&config.generation)?;
        tracing::info!("Using Gemini generation model: {}", generator.name());

        Ok(Self::new(
            retriever,
            sessions,
            Arc::new(generator),
            config.prompt.clone(),
        ))
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn session_store(&self) -> &SessionStore {
        &self.sessions
    }

    /// 질문 한 턴 처리
    ///
    /// `session_id`가 없거나 비어 있으면 질문으로 새 ID를 만듭니다.
    /// 생성이 실패하면 턴은 기록되지 않습니다.
    pub async fn chat(&self, session_id: Option<&str>, question: &str) -> Result<ChatReply> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidInput("question must not be empty".into()));
        }

        let session_id = match session_id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => id.to_string(),
            None => new_session_id(question),
        };

        let sessions = self.sessions.clone();
        let id = session_id.clone();
        let (memory, turns) = run_blocking(move || {
            let memory = sessions.make_memory(&id)?;
            let turns = memory.load()?;
            Ok((memory, turns))
        })
        .await?;

        let context = self.retriever.retrieve(question).await?;
        let prompt = build_prompt(&self.prompt, question, &context, &render_transcript(&turns));

        tracing::debug!(
            "Session {}: {} prior turns, {} passages",
            session_id,
            turns.len(),
            context.len()
        );

        let answer = self.generator.generate(&prompt).await?;

        let q = question.to_string();
        let a = answer.clone();
        run_blocking(move || memory.append(&q, &a)).await?;

        tracing::info!("Session {}: answered turn {}", session_id, turns.len() + 1);

        Ok(ChatReply {
            session_id,
            answer,
            sources: context,
        })
    }

    /// 세션 기록 조회 (없는 세션은 빈 기록으로 생성)
    pub async fn history(&self, session_id: &str) -> Result<SessionHistory> {
        let sessions = self.sessions.clone();
        let id = session_id.to_string();
        let turns = run_blocking(move || sessions.make_memory(&id)?.load()).await?;

        Ok(SessionHistory {
            session_id: session_id.to_string(),
            history: render_transcript(&turns),
            turns,
        })
    }

    /// 모든 세션 ID
    pub async fn sessions(&self) -> Result<BTreeSet<String>> {
        let sessions = self.sessions.clone();
        run_blocking(move || sessions.list_sessions()).await
    }
}

/// 설정의 임베딩 모델과 컬렉션으로 검색기 구성
pub async fn open_retriever(config: &AppConfig) -> Result<Retriever> {
    let embedder = create_embedder(&config.embedding)?;

    let store = LanceVectorStore::initialize(
        &config.store.path,
        embedder.dimension(),
        config.store.distance,
        false,
    )
    .await?;
    let collection = store.get_or_create_collection(&config.store.collection).await?;

    Ok(Retriever::new(embedder, collection, config.retrieval.clone()))
}

/// 블로킹 저장소 작업을 워커 스레드에서 실행
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RagError::store("Session task failed", e))?
}

// ============================================================================
// Tests
// ============================================================================

//! Session Store - rusqlite 기반 대화 기록 저장소
//!
//! 세션마다 (질문, 답변) 턴을 도착 순서대로 보관합니다.
//! 저장 위치: `<data_dir>/sessions.db`
//!
//! - `make_memory`가 세션 행을 먼저 기록하므로 턴이 없는 세션도 목록에 나옵니다.
//! - `append`는 트랜잭션 커밋 후 반환합니다 (`synchronous = FULL`).
//! - 같은 세션에 대한 동시 요청은 직렬화하지 않습니다. 커밋 순서가 곧 턴 순서입니다.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

// ============================================================================
// Types
// ============================================================================

/// 대화 턴
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
}

/// 세션 요약 (목록 표시용)
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub turns: usize,
}

// ============================================================================
// SessionStore
// ============================================================================

/// 세션 저장소 (복제해도 같은 연결을 공유)
#[derive(Clone)]
pub struct SessionStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl SessionStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| RagError::store("Failed to create session directory", e))?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| RagError::store("Failed to open session database", e))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        Ok(store)
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| RagError::store("Lock error", e))
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            "PRAGMA synchronous = FULL;
             PRAGMA foreign_keys = ON;

             CREATE TABLE IF NOT EXISTS sessions (
                 id TEXT PRIMARY KEY,
                 created_at TEXT NOT NULL
             );

             CREATE TABLE IF NOT EXISTS turns (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 session_id TEXT NOT NULL REFERENCES sessions(id),
                 question TEXT NOT NULL,
                 answer TEXT NOT NULL,
                 created_at TEXT NOT NULL
             );

             CREATE INDEX IF NOT EXISTS idx_turns_session ON turns(session_id, id);",
        )
        .map_err(|e| RagError::store("Failed to initialize session schema", e))?;

        tracing::debug!("Session store initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 세션 메모리 핸들 (처음이면 빈 세션 생성)
    ///
    /// 같은 ID로 여러 번 호출해도 에러가 아니며 같은 기록을 가리킵니다.
    pub fn make_memory(&self, session_id: &str) -> Result<SessionMemory> {
        if session_id.trim().is_empty() {
            return Err(RagError::InvalidInput("session id must not be empty".into()));
        }

        let conn = self.lock()?;
        let created = conn.execute(
            "INSERT OR IGNORE INTO sessions (id, created_at) VALUES (?1, ?2)",
            params![session_id, Utc::now().to_rfc3339()],
        )?;
        if created > 0 {
            tracing::info!("Created session: {}", session_id);
        }

        Ok(SessionMemory {
            store: self.clone(),
            session_id: session_id.to_string(),
        })
    }

    /// 모든 세션 ID
    pub fn list_sessions(&self) -> Result<BTreeSet<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id FROM sessions")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<BTreeSet<_>, _>>()?;
        Ok(ids)
    }

    /// 세션 요약 목록 (생성 시각 순)
    pub fn session_infos(&self) -> Result<Vec<SessionInfo>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT s.id, s.created_at, COUNT(t.id)
             FROM sessions s
             LEFT JOIN turns t ON t.session_id = s.id
             GROUP BY s.id
             ORDER BY s.created_at, s.id",
        )?;

        let infos = stmt
            .query_map([], |row| {
                Ok(SessionInfo {
                    id: row.get(0)?,
                    created_at: parse_datetime(row.get::<_, String>(1)?),
                    turns: row.get::<_, i64>(2)? as usize,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(infos)
    }

    fn load(&self, session_id: &str) -> Result<Vec<ConversationTurn>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT question, answer FROM turns WHERE session_id = ?1 ORDER BY id",
        )?;

        let turns = stmt
            .query_map(params![session_id], |row| {
                Ok(ConversationTurn {
                    question: row.get(0)?,
                    answer: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(turns)
    }

    fn append(&self, session_id: &str, question: &str, answer: &str) -> Result<()> {
        let mut conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO sessions (id, created_at) VALUES (?1, ?2)",
            params![session_id, now],
        )?;
        tx.execute(
            "INSERT INTO turns (session_id, question, answer, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![session_id, question, answer, now],
        )?;
        tx.commit()?;

        tracing::debug!("Appended turn to session {}", session_id);
        Ok(())
    }
}

// ============================================================================
// SessionMemory
// ============================================================================

/// 한 세션의 대화 기록 핸들
#[derive(Clone)]
pub struct SessionMemory {
    store: SessionStore,
    session_id: String,
}

impl SessionMemory {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// 전체 기록 (도착 순서)
    pub fn load(&self) -> Result<Vec<ConversationTurn>> {
        self.store.load(&self.session_id)
    }

    /// 턴 추가 (커밋 후 반환)
    pub fn append(&self, question: &str, answer: &str) -> Result<()> {
        self.store.append(&self.session_id, question, answer)
    }

    /// `Human:` / `AI:` 줄로 렌더링한 기록
    pub fn transcript(&self) -> Result<String> {
        Ok(render_transcript(&self.load()?))
    }
}

/// 대화 기록을 프롬프트용 텍스트로
pub fn render_transcript(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .map(|t| format!("Human: {}\nAI: {}", t.question, t.answer))
        .collect::<Vec<_>>()
        .join("\n")
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, SessionStore) {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::open(&dir.path().join("sessions.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_list_sessions_includes_empty_sessions() {
        let (_dir, store) = create_test_store();

        let a = store.make_memory("a").unwrap();
        let b = store.make_memory("b").unwrap();
        a.append("q1", "a1").unwrap();

        let sessions = store.list_sessions().unwrap();
        assert_eq!(sessions, BTreeSet::from(["a".to_string(), "b".to_string()]));
        assert!(b.load().unwrap().is_empty());
        assert_eq!(
            a.load().unwrap(),
            vec![ConversationTurn {
                question: "q1".to_string(),
                answer: "a1".to_string()
            }]
        );
    }

    #[test]
    fn test_make_memory_is_idempotent() {
        let (_dir, store) = create_test_store();

        let first = store.make_memory("s").unwrap();
        let second = store.make_memory("s").unwrap();
        assert_eq!(first.load().unwrap(), second.load().unwrap());
        assert_eq!(store.list_sessions().unwrap().len(), 1);
    }

    #[test]
    fn test_append_preserves_order() {
        let (_dir, store) = create_test_store();
        let memory = store.make_memory("ordered").unwrap();

        for i in 0..12 {
            memory
                .append(&format!("question {}", i), &format!("answer {}", i))
                .unwrap();
        }

        let turns = memory.load().unwrap();
        assert_eq!(turns.len(), 12);
        for (i, turn) in turns.iter().enumerate() {
            assert_eq!(turn.question, format!("question {}", i));
            assert_eq!(turn.answer, format!("answer {}", i));
        }
    }

    #[test]
    fn test_handles_share_history() {
        let (_dir, store) = create_test_store();
        let writer = store.make_memory("shared").unwrap();
        let reader = store.make_memory("shared").unwrap();

        writer.append("q", "a").unwrap();
        assert_eq!(reader.load().unwrap().len(), 1);
    }

    #[test]
    fn test_history_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("sessions.db");

        {
            let store = SessionStore::open(&path).unwrap();
            let memory = store.make_memory("durable").unwrap();
            memory.append("What is Rust?", "A language.").unwrap();
            store.make_memory("empty").unwrap();
        }

        let store = SessionStore::open(&path).unwrap();
        let memory = store.make_memory("durable").unwrap();
        assert_eq!(memory.load().unwrap().len(), 1);
        assert!(store.list_sessions().unwrap().contains("empty"));
    }

    #[test]
    fn test_blank_session_id_rejected() {
        let (_dir, store) = create_test_store();
        let err = store.make_memory("  ").err().unwrap();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[test]
    fn test_transcript_format() {
        let (_dir, store) = create_test_store();
        let memory = store.make_memory("t").unwrap();
        assert_eq!(memory.transcript().unwrap(), "");

        memory.append("Hi", "Hello!").unwrap();
        memory.append("Capital of France?", "Paris.").unwrap();
        assert_eq!(
            memory.transcript().unwrap(),
            "Human: Hi\nAI: Hello!\nHuman: Capital of France?\nAI: Paris."
        );
    }

    #[test]
    fn test_session_infos_count_turns() {
        let (_dir, store) = create_test_store();
        let a = store.make_memory("a").unwrap();
        store.make_memory("b").unwrap();
        a.append("q1", "a1").unwrap();
        a.append("q2", "a2").unwrap();

        let infos = store.session_infos().unwrap();
        let a_info = infos.iter().find(|i| i.id == "a").unwrap();
        let b_info = infos.iter().find(|i| i.id == "b").unwrap();
        assert_eq!(a_info.turns, 2);
        assert_eq!(b_info.turns, 0);
    }
}

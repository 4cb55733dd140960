//! CLI 모듈
//!
//! rag-assistant CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::chat::{open_retriever, ChatService};
use crate::collector::{CollectorConfig, FileCollector};
use crate::config::{default_config_path, get_data_dir, load_config, AppConfig};
use crate::embedding::{create_embedder, has_api_key};
use crate::extractor::{load_documents, load_files, LoadReport};
use crate::knowledge::{recursive_chunker, Ingestor, LanceVectorStore, VectorStore};
use crate::memory::SessionStore;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "rag-assistant")]
#[command(version, about = "세션 메모리 기반 RAG 질의응답", long_about = None)]
pub struct Cli {
    /// 설정 파일 경로 (기본: ~/.rag-assistant/config.toml)
    #[arg(long, global = true, env = "RAG_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 문서 폴더 또는 파일을 벡터 저장소에 적재
    Ingest {
        /// 문서 폴더 (기본: 설정의 ingest.data_dir)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// 단일 파일
        #[arg(long, conflicts_with = "dir")]
        file: Option<PathBuf>,

        /// 기존 벡터 저장소를 지우고 새로 만들기
        #[arg(long)]
        reset: bool,

        /// PDF 파일 포함
        #[arg(long)]
        include_pdfs: bool,
    },

    /// 임계값 필터 검색 (거리 포함 출력)
    Query {
        /// 질문
        question: String,

        /// 후보 수
        #[arg(short, long)]
        n: Option<usize>,

        /// 거리 임계값 (미만만 통과)
        #[arg(short, long)]
        threshold: Option<f32>,
    },

    /// 질문 한 턴 (세션 기록 사용)
    Chat {
        /// 질문
        question: String,

        /// 세션 ID (없으면 새로 생성)
        #[arg(short, long)]
        session: Option<String>,
    },

    /// 세션 목록
    Sessions,

    /// 세션 대화 기록
    History {
        /// 세션 ID
        session: String,
    },

    /// HTTP 서버 실행
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = load_config(&config_path)?;

    match cli.command {
        Commands::Ingest {
            dir,
            file,
            reset,
            include_pdfs,
        } => cmd_ingest(&config, dir, file, reset, include_pdfs).await,
        Commands::Query {
            question,
            n,
            threshold,
        } => cmd_query(&config, &question, n, threshold).await,
        Commands::Chat { question, session } => {
            cmd_chat(&config, &question, session.as_deref()).await
        }
        Commands::Sessions => cmd_sessions(&config),
        Commands::History { session } => cmd_history(&config, &session),
        Commands::Serve { host, port } => cmd_serve(config, host, port).await,
        Commands::Status => cmd_status(&config, &config_path).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

fn require_api_key() -> Result<()> {
    if !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             또는\n  \
             export GOOGLE_AI_API_KEY=your-api-key\n\n\
             API 키 발급: https://aistudio.google.com/app/apikey"
        );
    }
    Ok(())
}

/// 적재 명령어 (ingest)
///
/// 문서를 읽어 청킹 → 임베딩 → 컬렉션 upsert 합니다.
/// 읽지 못한 문서는 건너뛰고 마지막에 목록으로 보여줍니다.
async fn cmd_ingest(
    config: &AppConfig,
    dir: Option<PathBuf>,
    file: Option<PathBuf>,
    reset: bool,
    include_pdfs: bool,
) -> Result<()> {
    require_api_key()?;
    let include_pdfs = include_pdfs || config.ingest.include_pdfs;

    // 문서 로딩
    let loaded = if let Some(ref file_path) = file {
        let collector = FileCollector::new(CollectorConfig {
            include_pdfs,
            ..Default::default()
        });
        match collector.collect_file(file_path)? {
            Some(f) => load_files(&[f]).await,
            None => {
                println!("[!] 지원하지 않는 파일 형식: {:?}", file_path);
                return Ok(());
            }
        }
    } else {
        let dir_path = dir.unwrap_or_else(|| config.ingest.data_dir.clone());
        println!("[*] 문서 로딩 중: {}", dir_path.display());
        load_documents(&dir_path, include_pdfs).await?
    };

    let LoadReport {
        documents,
        failures: load_failures,
    } = loaded;

    if documents.is_empty() && load_failures.is_empty() {
        println!("[!] 적재할 문서가 없습니다.");
        return Ok(());
    }

    // 저장소 준비
    let embedder = create_embedder(&config.embedding)?;
    let store = LanceVectorStore::initialize(
        &config.store.path,
        embedder.dimension(),
        config.store.distance,
        reset,
    )
    .await
    .context("벡터 저장소 초기화 실패")?;
    if reset {
        println!("[*] 벡터 저장소 초기화됨: {}", store.path().display());
    }
    let collection = store
        .get_or_create_collection(&config.store.collection)
        .await?;

    let chunker = recursive_chunker(config.chunking.clone())?;
    let ingestor = Ingestor::new(chunker, embedder, collection.clone());

    println!(
        "[*] {} 문서 임베딩 및 저장 중 (chunk_size={}, overlap={})...",
        documents.len(),
        config.chunking.chunk_size,
        config.chunking.chunk_overlap
    );
    let report = ingestor.ingest(&documents).await.context("적재 실패")?;

    println!();
    println!(
        "[OK] 완료: 문서 {}, 청크 {} (컬렉션 '{}' 총 {} 건)",
        report.documents,
        report.chunks,
        collection.name(),
        collection.count().await?
    );

    let failures: Vec<_> = load_failures.iter().chain(report.failures.iter()).collect();
    if !failures.is_empty() {
        println!("[!] 건너뛴 문서 {} 건:", failures.len());
        for failure in failures {
            println!("    - {}", failure);
        }
    }

    Ok(())
}

/// 검색 명령어 (query)
async fn cmd_query(
    config: &AppConfig,
    question: &str,
    n: Option<usize>,
    threshold: Option<f32>,
) -> Result<()> {
    require_api_key()?;

    let n_results = n.unwrap_or(config.retrieval.n_results);
    let threshold = threshold.unwrap_or(config.retrieval.threshold);
    println!(
        "[*] 검색 중: \"{}\" (n={}, threshold={})",
        question, n_results, threshold
    );

    let retriever = open_retriever(config).await.context("검색기 초기화 실패")?;
    let passages = retriever
        .retrieve_scored(question, n_results, threshold)
        .await
        .context("검색 실패")?;

    if passages.is_empty() {
        println!("\n[!] 임계값 미만의 문서가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", passages.len());
    for (i, passage) in passages.iter().enumerate() {
        println!("{}. [거리: {:.4}]", i + 1, passage.distance);
        println!("   {}", truncate_text(&passage.text, 200));
        println!();
    }

    Ok(())
}

/// 대화 명령어 (chat)
async fn cmd_chat(config: &AppConfig, question: &str, session: Option<&str>) -> Result<()> {
    require_api_key()?;

    let service = ChatService::from_config(config)
        .await
        .context("채팅 서비스 초기화 실패")?;
    let reply = service.chat(session, question).await?;

    println!("{}", reply.answer);
    println!();
    println!(
        "[*] 세션: {} (참고 문서 {} 건)",
        reply.session_id,
        reply.sources.len()
    );

    Ok(())
}

/// 세션 목록 명령어 (sessions)
fn cmd_sessions(config: &AppConfig) -> Result<()> {
    let store = SessionStore::open(&config.sessions.path).context("세션 저장소 열기 실패")?;
    let infos = store.session_infos()?;

    if infos.is_empty() {
        println!("[!] 저장된 세션이 없습니다.");
        return Ok(());
    }

    println!("[OK] 세션 ({} 건):\n", infos.len());
    for info in infos {
        println!(
            "  {:<40} {} | {} turns",
            info.id,
            info.created_at.format("%Y-%m-%d %H:%M"),
            info.turns
        );
    }

    Ok(())
}

/// 세션 기록 명령어 (history)
fn cmd_history(config: &AppConfig, session: &str) -> Result<()> {
    let store = SessionStore::open(&config.sessions.path).context("세션 저장소 열기 실패")?;
    let memory = store.make_memory(session)?;
    let turns = memory.load()?;

    if turns.is_empty() {
        println!("[!] 세션 '{}'에 기록이 없습니다.", session);
        return Ok(());
    }

    println!("[OK] 세션 '{}' ({} turns):\n", session, turns.len());
    for turn in turns {
        println!("Human: {}", turn.question);
        println!("AI: {}", turn.answer);
        println!();
    }

    Ok(())
}

/// 서버 명령어 (serve)
async fn cmd_serve(mut config: AppConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    require_api_key()?;

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    crate::server::serve(&config).await
}

/// 상태 명령어 (status)
async fn cmd_status(config: &AppConfig, config_path: &Path) -> Result<()> {
    println!("rag-assistant v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", get_data_dir().display());
    if config_path.exists() {
        println!("[*] 설정 파일: {}", config_path.display());
    } else {
        println!("[*] 설정 파일: {} (없음, 기본값 사용)", config_path.display());
    }

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    println!("{}", session_status(config));
    println!("{}", store_status(config).await);

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 세션 저장소 상태 한 줄 (파일이 없으면 만들지 않음)
fn session_status(config: &AppConfig) -> String {
    let path = &config.sessions.path;
    if !path.exists() {
        return format!("[*] 세션: 아직 없음 ({})", path.display());
    }

    match SessionStore::open(path).and_then(|store| Ok((store.list_sessions()?, store))) {
        Ok((sessions, store)) => {
            let size = std::fs::metadata(store.db_path())
                .map(|m| m.len() as usize)
                .unwrap_or(0);
            format!(
                "[OK] 세션: {} 건 ({}, {})",
                sessions.len(),
                format_bytes(size),
                store.db_path().display()
            )
        }
        Err(e) => format!("[!] 세션 저장소 열기 실패: {}", e),
    }
}

/// 벡터 저장소 상태 한 줄 (디렉토리가 없으면 만들지 않음)
async fn store_status(config: &AppConfig) -> String {
    let path = &config.store.path;
    if !path.exists() {
        return format!(
            "[!] 벡터 저장소가 아직 없습니다 ({}). `rag-assistant ingest`로 적재하세요.",
            path.display()
        );
    }

    let store = match LanceVectorStore::initialize(
        path,
        config.embedding.dimension,
        config.store.distance,
        false,
    )
    .await
    {
        Ok(store) => store,
        Err(e) => return format!("[!] 벡터 저장소 열기 실패: {}", e),
    };

    let names = store.collection_names().await.unwrap_or_default();
    if !names.iter().any(|n| n == &config.store.collection) {
        return format!(
            "[!] 컬렉션 '{}'이 아직 없습니다. `rag-assistant ingest`로 적재하세요.",
            config.store.collection
        );
    }

    let counted = async {
        let collection = store
            .get_or_create_collection(&config.store.collection)
            .await?;
        collection.count().await
    };
    match counted.await {
        Ok(count) => format!(
            "[OK] 컬렉션 '{}': {} 청크 ({})",
            config.store.collection,
            count,
            store.metric().as_str()
        ),
        Err(e) => format!("[!] 컬렉션 조회 실패: {}", e),
    }
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("title: T,\nurl: U", 8), "title: T...");
        assert_eq!(truncate_text("서울은 한국의 수도", 3), "서울은...");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_parse_commands() {
        let cli = Cli::try_parse_from([
            "rag-assistant",
            "query",
            "What is the capital of France?",
            "-n",
            "3",
            "--threshold",
            "0.5",
        ])
        .unwrap();
        match cli.command {
            Commands::Query {
                question,
                n,
                threshold,
            } => {
                assert_eq!(question, "What is the capital of France?");
                assert_eq!(n, Some(3));
                assert_eq!(threshold, Some(0.5));
            }
            _ => panic!("expected query"),
        }

        let cli = Cli::try_parse_from([
            "rag-assistant",
            "--config",
            "/tmp/rag.toml",
            "chat",
            "hello",
            "--session",
            "s1",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/rag.toml")));
        assert!(matches!(
            cli.command,
            Commands::Chat { ref session, .. } if session.as_deref() == Some("s1")
        ));
    }

    #[test]
    fn test_ingest_dir_and_file_conflict() {
        let result = Cli::try_parse_from([
            "rag-assistant",
            "ingest",
            "--dir",
            "data",
            "--file",
            "data/a.json",
        ]);
        assert!(result.is_err());
    }

    fn temp_config(dir: &tempfile::TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.sessions.path = dir.path().join("sessions.db");
        config.store.path = dir.path().join("vector_db");
        config
    }

    #[tokio::test]
    async fn test_status_does_not_create_stores() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = temp_config(&dir);

        assert!(session_status(&config).contains("아직 없음"));
        assert!(store_status(&config).await.starts_with("[!]"));

        assert!(!config.sessions.path.exists());
        assert!(!config.store.path.exists());
    }

    #[tokio::test]
    async fn test_status_reports_existing_sessions() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = temp_config(&dir);

        let store = SessionStore::open(&config.sessions.path).unwrap();
        store.make_memory("a").unwrap();
        drop(store);

        let line = session_status(&config);
        assert!(line.starts_with("[OK] 세션: 1 건"), "{}", line);
    }
}

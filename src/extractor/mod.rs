//! 문서 추출 모듈
//!
//! 수집된 파일을 [`Document`]로 변환합니다.
//! - JSON 파일: 레코드 하나(`text`, `title`, `url`, 선택적 `id`)
//! - PDF 파일: pdf-extract로 본문 추출, 제목은 파일 이름
//!
//! 파일 하나의 실패는 해당 문서의 `Ingestion` 에러로 모이고 나머지는 계속 읽습니다.

pub mod pdf;

use std::path::Path;

use crate::collector::{CollectedFile, CollectorConfig, FileCollector, FileType};
use crate::error::{RagError, Result};
use crate::knowledge::Document;

// ============================================================================
// Load Report
// ============================================================================

/// 디렉토리 로딩 결과
#[derive(Debug, Default)]
pub struct LoadReport {
    /// 읽은 문서 (경로 순)
    pub documents: Vec<Document>,
    /// 읽지 못한 파일
    pub failures: Vec<RagError>,
}

// ============================================================================
// Document Extractor
// ============================================================================

/// 파일에서 문서 추출
pub async fn extract_document(file: &CollectedFile) -> Result<Document> {
    match file.file_type {
        FileType::Json => extract_json(file).await,
        FileType::Pdf => extract_pdf(file).await,
    }
}

async fn extract_json(file: &CollectedFile) -> Result<Document> {
    let stem = file.stem();
    let raw = tokio::fs::read_to_string(&file.path)
        .await
        .map_err(|e| RagError::ingestion(&stem, e.to_string()))?;

    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| RagError::ingestion(&stem, format!("invalid JSON: {}", e)))?;

    Document::from_json(&value, &stem)
}

async fn extract_pdf(file: &CollectedFile) -> Result<Document> {
    // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
    let stem = file.stem();
    let path = file.path.clone();
    let text = tokio::task::spawn_blocking(move || pdf::extract_text_from_pdf(&path))
        .await
        .map_err(|e| RagError::ingestion(&stem, format!("PDF extraction task failed: {}", e)))??;

    Ok(Document {
        id: stem.clone(),
        title: stem,
        url: file.path.display().to_string(),
        text,
    })
}

/// 디렉토리의 모든 문서 로딩
pub async fn load_documents(dir: &Path, include_pdfs: bool) -> Result<LoadReport> {
    let collector = FileCollector::new(CollectorConfig {
        include_pdfs,
        ..Default::default()
    });
    let files = collector.collect_directory(dir)?;
    Ok(load_files(&files).await)
}

/// 수집된 파일 목록 로딩
pub async fn load_files(files: &[CollectedFile]) -> LoadReport {
    let mut report = LoadReport::default();

    for file in files {
        match extract_document(file).await {
            Ok(doc) => report.documents.push(doc),
            Err(e) => {
                tracing::warn!("Skipping {:?}: {}", file.path, e);
                report.failures.push(e);
            }
        }
    }

    report
}

// ============================================================================
// Tests
// ============================================================================

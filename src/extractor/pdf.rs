//! PDF 텍스트 추출
//!
//! pdf-extract로 본문을 뽑고 페이지 경계를 문단 구분(`\n\n`)으로 바꿔
//! 청커가 페이지 단위로 먼저 자르도록 합니다.

use std::path::Path;

use crate::error::{RagError, Result};

/// PDF에서 전체 텍스트 추출 (CPU 바운드, 블로킹)
pub fn extract_text_from_pdf(path: &Path) -> Result<String> {
    let name = path.display().to_string();

    let bytes = std::fs::read(path).map_err(|e| RagError::ingestion(&name, e.to_string()))?;

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| RagError::ingestion(&name, format!("failed to extract PDF text: {}", e)))?;

    if text.trim().is_empty() {
        return Err(RagError::ingestion(
            name,
            "no text extracted from PDF (it might be a scanned document)",
        ));
    }

    Ok(join_pages(&text))
}

/// 폼피드로 나뉜 페이지를 문단 단위로 재결합
fn join_pages(text: &str) -> String {
    text.split('\x0c')
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_pages_with_formfeed() {
        let text = "Page 1 content\x0c  Page 2 content \x0c\x0cPage 3 content";
        assert_eq!(
            join_pages(text),
            "Page 1 content\n\nPage 2 content\n\nPage 3 content"
        );
    }

    #[test]
    fn test_join_pages_no_separator() {
        assert_eq!(join_pages("  single page  "), "single page");
    }

    #[test]
    fn test_unreadable_pdf_is_ingestion_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf at all").unwrap();

        let err = extract_text_from_pdf(&path).unwrap_err();
        assert_eq!(err.kind(), "ingestion");
    }
}

//! Text Chunking Module
//!
//! 문서 텍스트를 임베딩/검색 단위인 겹치는 고정 크기 청크로 나눕니다.
//! 문단 → 줄 → 단어 → 문자 순서로 자연스러운 경계를 먼저 시도하고,
//! 그래도 크면 문자 단위로 자릅니다. 길이는 바이트가 아닌 문자 수 기준입니다.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 인접 청크 간 최대 공유 문자 수
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        let config = Self {
            chunk_size,
            chunk_overlap,
        };
        config.validate()?;
        Ok(config)
    }

    /// 빠른 인덱싱용 설정 (오버랩 없음)
    pub fn for_fast() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 0,
        }
    }

    /// `chunk_overlap < chunk_size`, `chunk_size > 0`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::InvalidInput("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::InvalidInput(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// RecursiveChunker
// ============================================================================

/// 기본 구분자 (우선순위 순)
const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// 재귀 문자 청커
///
/// 가장 큰 구분자부터 시도해서 조각을 만들고, `chunk_size` 이하로 모읍니다.
/// 구분자는 다음 조각의 앞에 붙어 남으므로 청크를 이어 붙이면 (공백 정리와
/// 오버랩을 제외하고) 원문이 복원됩니다.
pub struct RecursiveChunker {
    config: ChunkConfig,
    separators: Vec<String>,
}

impl RecursiveChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// 기본 설정(1000/200)으로 생성
    pub fn with_defaults() -> Self {
        Self {
            config: ChunkConfig::default(),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut final_chunks = Vec::new();

        // 텍스트에 존재하는 첫 구분자 선택 ("" 는 항상 매치)
        let mut separator = "";
        let mut rest: &[String] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = "";
                rest = &[];
                break;
            }
            if text.contains(sep.as_str()) {
                separator = sep;
                rest = &separators[i + 1..];
                break;
            }
        }

        let splits = split_keep_separator(text, separator);

        let mut good_splits: Vec<String> = Vec::new();
        for split in splits {
            if char_len(&split) < self.config.chunk_size {
                good_splits.push(split);
                continue;
            }

            if !good_splits.is_empty() {
                final_chunks.extend(self.merge_splits(&good_splits));
                good_splits.clear();
            }

            if rest.is_empty() {
                let trimmed = split.trim();
                if !trimmed.is_empty() {
                    final_chunks.push(trimmed.to_string());
                }
            } else {
                final_chunks.extend(self.split_recursive(&split, rest));
            }
        }

        if !good_splits.is_empty() {
            final_chunks.extend(self.merge_splits(&good_splits));
        }

        final_chunks
    }

    /// 작은 조각들을 `chunk_size` 이하 청크로 병합, 꼬리를 `chunk_overlap` 이하로 이월
    fn merge_splits(&self, splits: &[String]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: std::collections::VecDeque<&str> = std::collections::VecDeque::new();
        let mut total = 0usize;

        for split in splits {
            let len = char_len(split);

            if total + len > self.config.chunk_size && !current.is_empty() {
                push_trimmed(&mut chunks, &current);

                // 오버랩 한도와 새 조각이 들어갈 공간이 생길 때까지 앞에서 제거
                while total > self.config.chunk_overlap
                    || (total + len > self.config.chunk_size && total > 0)
                {
                    match current.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }

            current.push_back(split);
            total += len;
        }

        push_trimmed(&mut chunks, &current);
        chunks
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        self.split_recursive(text, &self.separators)
    }

    fn name(&self) -> &'static str {
        "RecursiveChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn push_trimmed(chunks: &mut Vec<String>, parts: &std::collections::VecDeque<&str>) {
    let joined: String = parts.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// 구분자로 분할하되 구분자를 다음 조각의 앞에 유지
///
/// 빈 구분자는 문자 단위 분할입니다.
fn split_keep_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(|c| c.to_string()).collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(text[start..idx].to_string());
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(text[start..].to_string());
    }

    pieces.retain(|p| !p.is_empty());
    pieces
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(RecursiveChunker::with_defaults())
}

/// 설정을 지정한 청커 생성
pub fn recursive_chunker(config: ChunkConfig) -> Result<Box<dyn Chunker>> {
    Ok(Box::new(RecursiveChunker::new(config)?))
}

/// 단발성 청킹 (`chunk_overlap < chunk_size` 필수)
pub fn chunk(text: &str, chunk_size: usize, chunk_overlap: usize) -> Result<Vec<String>> {
    let chunker = RecursiveChunker::new(ChunkConfig::new(chunk_size, chunk_overlap)?)?;
    Ok(chunker.chunk(text))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// a 끝과 b 시작이 겹치는 최대 문자 수
    fn shared_boundary(a: &str, b: &str) -> usize {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        let max = a.len().min(b.len());
        (1..=max)
            .rev()
            .find(|&n| a[a.len() - n..] == b[..n])
            .unwrap_or(0)
    }

    /// 고정 폭 토큰 (w000 w001 ...) 으로 우연한 경계 일치를 배제
    fn sample_text() -> String {
        let mut text = String::new();
        for p in 0..25 {
            for t in 0..20 {
                text.push_str(&format!("w{:03} ", p * 20 + t));
            }
            text.push_str("\n\n");
        }
        text
    }

    #[test]
    fn test_chunker_empty() {
        let chunker = RecursiveChunker::with_defaults();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("  \n\n ").is_empty());
    }

    #[test]
    fn test_single_short_document_is_one_chunk() {
        let text = "title: T, url: U, text: Paris is the capital of France.";
        let chunks = chunk(text, 1000, 200).unwrap();
        assert_eq!(chunks, vec![text.to_string()]);
    }

    #[test]
    fn test_chunks_respect_size_and_overlap() {
        let text = sample_text();
        for (size, overlap) in [(1000, 200), (300, 50), (120, 0), (64, 63), (10, 3)] {
            let chunks = chunk(&text, size, overlap).unwrap();
            assert!(chunks.len() > 1, "size {} should split", size);

            for c in &chunks {
                assert!(c.chars().count() <= size, "chunk exceeds {}: {:?}", size, c);
            }
            for pair in chunks.windows(2) {
                assert!(shared_boundary(&pair[0], &pair[1]) <= overlap);
            }
        }
    }

    #[test]
    fn test_no_content_lost() {
        let text = sample_text();
        let chunks = chunk(&text, 200, 0).unwrap();

        let rebuilt: String = chunks.join(" ");
        let words = |s: &str| s.split_whitespace().map(str::to_string).collect::<Vec<_>>();
        assert_eq!(words(&rebuilt), words(&text));
    }

    #[test]
    fn test_overlap_carries_tail() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let chunks = chunk(text, 20, 10).unwrap();
        assert!(chunks.len() > 2);
        // 두 번째 청크는 첫 청크의 마지막 단어로 시작
        let last_word = chunks[0].split_whitespace().last().unwrap();
        assert!(chunks[1].starts_with(last_word));
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let text = format!("{}\n\n{}", "a".repeat(40), "b".repeat(40));
        let chunks = chunk(&text, 50, 0).unwrap();
        assert_eq!(chunks, vec!["a".repeat(40), "b".repeat(40)]);
    }

    #[test]
    fn test_hard_cut_without_separators() {
        let text = "x".repeat(25);
        let chunks = chunk(&text, 10, 0).unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_multibyte_counts_characters() {
        let text = "안녕하세요 세계 ".repeat(30);
        let chunks = chunk(&text, 20, 5).unwrap();
        for c in &chunks {
            assert!(c.chars().count() <= 20);
        }
    }

    #[test]
    fn test_invalid_config() {
        assert!(ChunkConfig::new(100, 100).is_err());
        assert!(ChunkConfig::new(0, 0).is_err());
        assert!(chunk("text", 10, 20).is_err());
        assert!(ChunkConfig::new(2, 1).is_ok());
    }

    #[test]
    fn test_split_keep_separator() {
        let pieces = split_keep_separator("a\n\nb\n\nc", "\n\n");
        assert_eq!(pieces, vec!["a", "\n\nb", "\n\nc"]);

        let chars = split_keep_separator("ab", "");
        assert_eq!(chars, vec!["a", "b"]);
    }

    #[test]
    fn test_config_presets() {
        let default = ChunkConfig::default();
        assert_eq!(default.chunk_size, 1000);
        assert_eq!(default.chunk_overlap, 200);

        let fast = ChunkConfig::for_fast();
        assert_eq!(fast.chunk_overlap, 0);
    }
}

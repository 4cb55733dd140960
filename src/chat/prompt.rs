//! 프롬프트 구성
//!
//! 시스템 지시는 `[prompt]` 설정에서, 사용자 메시지는 대화 기록 + 검색 문서 + 질문으로 만듭니다.

use crate::config::PromptConfig;

use super::generator::Prompt;

/// 프롬프트 생성
///
/// # Arguments
/// * `config` - 역할/규칙/빈 문맥 안내
/// * `question` - 현재 질문
/// * `context` - 임계값을 통과한 문서 조각 (비어 있을 수 있음)
/// * `transcript` - 이전 대화 (`Human:` / `AI:` 줄)
pub fn build_prompt(
    config: &PromptConfig,
    question: &str,
    context: &[String],
    transcript: &str,
) -> Prompt {
    let mut system = config.role.trim().to_string();
    if !config.instructions.is_empty() {
        system.push_str("\n\nFollow these rules:\n");
        let rules: Vec<String> = config
            .instructions
            .iter()
            .map(|rule| format!("- {}", rule))
            .collect();
        system.push_str(&rules.join("\n"));
    }

    let mut sections = Vec::new();

    if !transcript.trim().is_empty() {
        sections.push(format!("Conversation so far:\n{}", transcript));
    }

    if context.is_empty() {
        sections.push(format!("Relevant documents:\n{}", config.no_context_note));
    } else {
        let documents: Vec<String> = context
            .iter()
            .enumerate()
            .map(|(i, passage)| format!("[{}] {}", i + 1, passage))
            .collect();
        sections.push(format!("Relevant documents:\n{}", documents.join("\n\n")));
    }

    sections.push(format!("Question: {}", question));

    Prompt {
        system,
        user: sections.join("\n\n"),
    }
}

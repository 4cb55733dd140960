//! 세션 ID 생성
//!
//! 첫 질문 앞 20자의 슬러그 + 임의 접미사 8자리.
//! 비슷한 질문으로 시작한 세션도 서로 다른 ID를 갖습니다.
//! 한글 등 비ASCII 문자는 음역하지 않고 그대로 남깁니다 (`서울은-어디`).

use std::sync::OnceLock;

use regex::Regex;

/// 슬러그에 쓰는 질문 앞부분 길이 (문자 수)
const SLUG_CHARS: usize = 20;

fn non_alphanumeric() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^\p{Alphabetic}\p{Nd}]+").expect("Invalid regex"))
}

/// 질문 앞부분 슬러그 (`what-is-the-capital`)
///
/// 문자/숫자 외에는 모두 `-` 하나로 합칩니다.
pub fn slugify(question: &str) -> String {
    let head: String = question.chars().take(SLUG_CHARS).collect();
    let lowered = head.to_lowercase();
    let slug = non_alphanumeric().replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');

    if slug.is_empty() {
        "session".to_string()
    } else {
        slug.to_string()
    }
}

/// 새 세션 ID
pub fn new_session_id(question: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", slugify(question), &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("What is the capital of France?"), "what-is-the-capital");
        assert_eq!(slugify("  Hello, World!  "), "hello-world");
        assert_eq!(slugify("???"), "session");
        assert_eq!(slugify(""), "session");
    }

    #[test]
    fn test_slugify_keeps_non_ascii_letters() {
        assert_eq!(slugify("서울은 어디?"), "서울은-어디");
        assert_eq!(slugify("Café au lait?"), "café-au-lait");
        assert_eq!(slugify("¿¡ 🙂 !?"), "session");

        let id = new_session_id("서울은 어디?");
        assert!(id.starts_with("서울은-어디-"));
    }

    #[test]
    fn test_new_session_id_shape() {
        let id = new_session_id("What is the capital of France?");
        let (slug, suffix) = id.rsplit_once('-').unwrap();
        assert_eq!(slug, "what-is-the-capital");
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_same_question_gives_distinct_ids() {
        let a = new_session_id("Tell me about Paris");
        let b = new_session_id("Tell me about Paris");
        assert_ne!(a, b);
    }
}

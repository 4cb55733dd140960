//! 문서 레코드
//!
//! 적재 시 한 번 읽고 이후 변경하지 않습니다.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RagError, Result};

/// 원본 문서
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub url: String,
    pub text: String,
}

impl Document {
    /// JSON 레코드에서 문서 생성
    ///
    /// `text`는 문자열이어야 하고, `title`/`url`은 없으면 빈 문자열입니다.
    /// `id`는 문자열 `id` 필드, 없으면 `fallback_id`.
    pub fn from_json(value: &Value, fallback_id: &str) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            RagError::ingestion(fallback_id, "document record must be a JSON object")
        })?;

        let text = object
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| RagError::ingestion(fallback_id, "'text' field is missing or not a string"))?;

        let field = |name: &str| {
            object
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let id = object
            .get("id")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(fallback_id)
            .to_string();

        Ok(Self {
            id,
            title: field("title"),
            url: field("url"),
            text: text.to_string(),
        })
    }

    /// 임베딩 대상 문자열 (제목, URL, 본문을 하나로)
    pub fn combined_text(&self) -> String {
        format!("title: {}, url: {}, text: {}", self.title, self.url, self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_full_record() {
        let value = json!({
            "id": "pub-1",
            "title": "T",
            "url": "U",
            "text": "Paris is the capital of France."
        });
        let doc = Document::from_json(&value, "file-stem").unwrap();
        assert_eq!(doc.id, "pub-1");
        assert_eq!(
            doc.combined_text(),
            "title: T, url: U, text: Paris is the capital of France."
        );
    }

    #[test]
    fn test_from_json_defaults() {
        let doc = Document::from_json(&json!({"text": "body"}), "file-stem").unwrap();
        assert_eq!(doc.id, "file-stem");
        assert_eq!(doc.title, "");
        assert_eq!(doc.url, "");
    }

    #[test]
    fn test_from_json_missing_text() {
        let err = Document::from_json(&json!({"title": "T"}), "broken").unwrap_err();
        match err {
            RagError::Ingestion { document, reason } => {
                assert_eq!(document, "broken");
                assert!(reason.contains("'text'"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_from_json_non_string_text() {
        let err = Document::from_json(&json!({"text": 42}), "numeric").unwrap_err();
        assert_eq!(err.kind(), "ingestion");

        let err = Document::from_json(&json!(["not", "an", "object"]), "array").unwrap_err();
        assert_eq!(err.kind(), "ingestion");
    }
}

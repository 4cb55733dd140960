//! 답변 생성기
//!
//! 프롬프트(시스템 지시 + 사용자 메시지)를 받아 답변 문자열을 돌려주는 능력입니다.
//! 기본 구현은 Gemini `generateContent` API입니다.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::GenerationConfig;
use crate::embedding::get_api_key;
use crate::error::{RagError, Result};

/// 생성 요청 프롬프트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// 시스템 지시
    pub system: String,
    /// 사용자 메시지 (대화 기록, 문서, 질문)
    pub user: String,
}

/// 답변 생성 트레이트
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, prompt: &Prompt) -> Result<String>;

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Gemini Generator
// ============================================================================

/// Gemini generateContent 구현체
#[derive(Debug)]
pub struct GeminiGenerator {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
    temperature: f32,
    max_output_tokens: u32,
}

impl GeminiGenerator {
    pub fn new(api_key: String, config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| RagError::Generation(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }

    /// 환경변수에서 API 키를 읽어 생성
    pub fn from_env(config: &GenerationConfig) -> Result<Self> {
        let api_key = get_api_key().map_err(|e| RagError::Generation(e.to_string()))?;
        Self::new(api_key, config)
    }

    fn request_for(&self, prompt: &Prompt) -> GenerateRequest {
        GenerateRequest {
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part {
                    text: prompt.system.clone(),
                }],
            })
            .filter(|_| !prompt.system.trim().is_empty()),
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: prompt.user.clone(),
                }],
            }],
            generation_config: GenerationParams {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }
}

#[async_trait]
impl AnswerGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_for(prompt))
            .send()
            .await
            .map_err(|e| RagError::Generation(format!("Failed to send generation request: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RagError::Generation(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(RagError::Generation(format!(
                "Gemini API error ({}): {}",
                status, body
            )));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| RagError::Generation(format!("Failed to parse generation response: {}", e)))?;

        let answer = parsed.first_text();
        if answer.trim().is_empty() {
            return Err(RagError::Generation("model returned an empty answer".into()));
        }

        Ok(answer)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationParams,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationParams {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateResponse {
    /// 첫 후보의 텍스트 파트를 이어 붙임
    fn first_text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================

//! 챗 모듈 - GPT-4 질의응답
//!
//! 챗 트랜스크립트 관리, 검색 컨텍스트 증강, 챗 컴플리션 호출,
//! 그리고 CSV 챗 로그 내보내기를 담당합니다.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::embedding::get_api_key;

/// 챗 컴플리션 API 엔드포인트
const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// 챗 모델
pub const CHAT_MODEL: &str = "gpt-4";

/// 기본 시스템 프롬프트 (Q&A 프라이머)
pub const DEFAULT_PRIMER: &str = "You are Q&A bot. A highly intelligent system that answers \
user questions based on the information provided by the user above \
each question. If the information can not be found in the information \
provided by the user you truthfully say \"I don't know\".";

// ============================================================================
// Transcript
// ============================================================================

/// 챗 메시지 (role/content 쌍)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// 챗 트랜스크립트 (순서 보존)
///
/// 종료 시 CSV 로그(`role,content`)로 저장됩니다.
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// 메시지 추가
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// 전체 메시지 (API 호출용)
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// CSV 파일로 저장
    ///
    /// 헤더는 `role,content`이며, 쉼표/따옴표/줄바꿈이 있는 필드는
    /// 따옴표로 감쌉니다.
    pub fn save_csv(&self, path: &Path) -> Result<()> {
        let mut out = String::from("role,content\n");
        for message in &self.messages {
            out.push_str(&csv_field(&message.role));
            out.push(',');
            out.push_str(&csv_field(&message.content));
            out.push('\n');
        }

        std::fs::write(path, out)
            .with_context(|| format!("Failed to write chat log: {}", path.display()))?;
        Ok(())
    }
}

/// CSV 필드 이스케이프
fn csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

// ============================================================================
// Context Augmentation
// ============================================================================

/// 검색 컨텍스트로 질문 증강
///
/// 컨텍스트들을 `---` 구분선으로 연결하고 질문을 뒤에 붙입니다.
pub fn augment_with_contexts(contexts: &[String], question: &str) -> String {
    if contexts.is_empty() {
        return question.to_string();
    }

    format!("{}\n\n-----\n\n{}", contexts.join("\n\n---\n\n"), question)
}

// ============================================================================
// ChatClient
// ============================================================================

/// GPT-4 챗 컴플리션 클라이언트
pub struct ChatClient {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl ChatClient {
    /// 새 클라이언트 생성
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_model(api_key, CHAT_MODEL.to_string())
    }

    /// 모델을 지정하여 생성
    pub fn with_model(api_key: String, model: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            model,
            client,
        })
    }

    /// 환경변수(OPENAI_API_KEY)에서 API 키를 읽어 생성
    pub fn from_env() -> Result<Self> {
        Self::new(get_api_key()?)
    }

    /// 챗 컴플리션 호출
    ///
    /// 전체 트랜스크립트를 보내고 어시스턴트 응답 텍스트를 반환합니다.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
        };

        tracing::debug!("Chat completion request ({} messages)", messages.len());

        let response = self
            .client
            .post(OPENAI_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to call chat completions")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            anyhow::bail!("Chat API error ({}): {}", status, body);
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).context("Failed to parse chat response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("Chat response contained no choices"))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: String,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_augment_with_contexts() {
        let contexts = vec!["first context".to_string(), "second context".to_string()];
        let augmented = augment_with_contexts(&contexts, "what is this?");

        assert_eq!(
            augmented,
            "first context\n\n---\n\nsecond context\n\n-----\n\nwhat is this?"
        );
    }

    #[test]
    fn test_augment_without_contexts() {
        let augmented = augment_with_contexts(&[], "bare question");
        assert_eq!(augmented, "bare question");
    }

    #[test]
    fn test_csv_field_plain() {
        assert_eq!(csv_field("hello"), "hello");
    }

    #[test]
    fn test_csv_field_escaped() {
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("line1\nline2"), "\"line1\nline2\"");
    }

    #[test]
    fn test_transcript_push_order() {
        let mut transcript = Transcript::new();
        transcript.push(ChatMessage::system("primer"));
        transcript.push(ChatMessage::user("question"));
        transcript.push(ChatMessage::assistant("answer"));

        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript.messages()[0].role, "system");
        assert_eq!(transcript.messages()[2].content, "answer");
    }

    #[test]
    fn test_transcript_save_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chatlog.csv");

        let mut transcript = Transcript::new();
        transcript.push(ChatMessage::user("hello, world"));
        transcript.push(ChatMessage::assistant("hi"));
        transcript.save_csv(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "role,content");
        assert_eq!(lines[1], "user,\"hello, world\"");
        assert_eq!(lines[2], "assistant,hi");
    }

    #[test]
    fn test_chat_response_parsing() {
        let body = r#"{
            "choices": [
                {"message": {"role": "assistant", "content": "the answer"}}
            ]
        }"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content, "the answer");
    }

    #[test]
    fn test_chat_request_serialization() {
        let messages = vec![ChatMessage::system("primer"), ChatMessage::user("q")];
        let request = ChatRequest {
            model: CHAT_MODEL,
            messages: &messages,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "q");
    }
}

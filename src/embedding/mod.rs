//! 임베딩 모듈 - OpenAI API를 통한 텍스트 벡터화
//!
//! 텍스트를 벡터로 변환하는 OpenAI 임베딩 프로바이더입니다.
//! 시맨틱 검색을 위한 핵심 모듈입니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = OpenAiEmbedding::from_env()?;
//! let embedding = embedder.embed("Hello, world!").await?;
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// OpenAI Embedding
// ============================================================================

/// OpenAI 임베딩 API 엔드포인트
/// source: https://platform.openai.com/docs/api-reference/embeddings
const OPENAI_EMBED_URL: &str = "https://api.openai.com/v1/embeddings";

/// 임베딩 모델
pub const EMBED_MODEL: &str = "text-embedding-ada-002";

/// text-embedding-ada-002 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 1536;

/// 호출 간 최소 딜레이 (버스트 방지)
const MIN_DELAY_MS: u64 = 200;
/// Rate limit (429) 시 재시도 딜레이
const RATE_LIMIT_DELAY_SECS: u64 = 5;

/// OpenAI 임베딩 구현체
///
/// 429/5xx/전송 에러는 성공할 때까지 재시도합니다 (인제스트 배치 루프 보장).
/// 그 외 4xx는 즉시 실패합니다.
#[derive(Debug)]
pub struct OpenAiEmbedding {
    api_key: String,
    client: reqwest::Client,
    last_request: Arc<Mutex<Option<Instant>>>,
}

impl OpenAiEmbedding {
    /// 새 OpenAI 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `api_key` - OpenAI API 키
    pub fn new(api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            client,
            last_request: Arc::new(Mutex::new(None)),
        })
    }

    /// 환경변수(OPENAI_API_KEY)에서 API 키를 읽어 생성
    pub fn from_env() -> Result<Self> {
        let api_key = get_api_key()?;
        Self::new(api_key)
    }

    /// 호출 간 최소 딜레이 적용
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            let min_delay = Duration::from_millis(MIN_DELAY_MS);
            if elapsed < min_delay {
                tokio::time::sleep(min_delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// 배치 요청 1회 시도
    ///
    /// Ok(Some(..)): 성공, Ok(None): 재시도 가능한 실패, Err: 즉시 실패
    async fn try_embed_batch(&self, texts: &[String]) -> Result<Option<Vec<Vec<f32>>>> {
        let request = EmbedRequest {
            model: EMBED_MODEL,
            input: texts,
        };

        let response = match self
            .client
            .post(OPENAI_EMBED_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!("Embedding request failed to send: {}", e);
                return Ok(None);
            }
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        match classify_status(status) {
            StatusClass::Success => {
                let mut parsed: EmbedResponse =
                    serde_json::from_str(&body).context("Failed to parse embedding response")?;
                // 응답 순서는 보장되지 않으므로 index로 정렬
                parsed.data.sort_by_key(|d| d.index);
                anyhow::ensure!(
                    parsed.data.len() == texts.len(),
                    "OpenAI returned {} embeddings for {} inputs",
                    parsed.data.len(),
                    texts.len()
                );
                Ok(Some(parsed.data.into_iter().map(|d| d.embedding).collect()))
            }
            StatusClass::Retryable => {
                tracing::warn!("Embedding API returned {}, will retry", status);
                Ok(None)
            }
            StatusClass::Fatal => {
                if let Ok(error) = serde_json::from_str::<OpenAiError>(&body) {
                    anyhow::bail!("OpenAI API error ({}): {}", status, error.error.message);
                }
                anyhow::bail!("OpenAI API error ({}): {}", status, body)
            }
        }
    }
}

/// 응답 상태 분류 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusClass {
    /// 2xx - 본문 파싱 진행
    Success,
    /// 429 또는 5xx - 딜레이 후 재시도
    Retryable,
    /// 그 외 (나머지 4xx 등) - 즉시 실패
    Fatal,
}

/// HTTP 상태를 재시도 가능 여부로 분류
fn classify_status(status: reqwest::StatusCode) -> StatusClass {
    if status.is_success() {
        StatusClass::Success
    } else if status.as_u16() == 429 || status.is_server_error() {
        StatusClass::Retryable
    } else {
        StatusClass::Fatal
    }
}

/// OpenAI 임베딩 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

/// OpenAI 임베딩 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI API 에러 응답
#[derive(Debug, Deserialize)]
struct OpenAiError {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // 빈 텍스트 처리
        if text.trim().is_empty() {
            return Ok(vec![0.0; DEFAULT_DIMENSION]);
        }

        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut attempt: u32 = 0;
        loop {
            self.throttle().await;

            match self.try_embed_batch(texts).await? {
                Some(embeddings) => return Ok(embeddings),
                None => {
                    attempt += 1;
                    tracing::warn!(
                        "Embedding batch failed, retrying in {}s (attempt {})",
                        RATE_LIMIT_DELAY_SECS,
                        attempt
                    );
                    tokio::time::sleep(Duration::from_secs(RATE_LIMIT_DELAY_SECS)).await;
                }
            }
        }
    }

    fn dimension(&self) -> usize {
        DEFAULT_DIMENSION
    }

    fn name(&self) -> &str {
        EMBED_MODEL
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (OPENAI_API_KEY 환경변수)
pub fn get_api_key() -> Result<String> {
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        if !key.is_empty() {
            return Ok(key);
        }
    }

    anyhow::bail!(
        "API key not found. Set OPENAI_API_KEY environment variable.\n\
         Get your API key at: https://platform.openai.com/api-keys"
    )
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    std::env::var("OPENAI_API_KEY")
        .map(|k| !k.is_empty())
        .unwrap_or(false)
}

// ============================================================================
// Tests
// ============================================================================

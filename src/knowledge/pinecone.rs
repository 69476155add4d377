//! Pinecone Vector Index - 호스팅 벡터 인덱스 클라이언트
//!
//! Pinecone REST API를 통한 업서트/검색/통계 조회를 제공합니다.
//! ref: https://docs.pinecone.io/reference
//!
//! 컨트롤 플레인(인덱스 생성/목록)과 데이터 플레인(업서트/쿼리)을 분리해서
//! 사용합니다. 데이터 플레인 호스트는 PINECONE_HOST로 직접 지정할 수 있습니다.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::vector::{ChunkMetadata, ChunkRecord, IndexStats, VectorIndex, VectorMatch};

/// 인덱스 메트릭 (임베딩이 정규화되어 있어 내적 = 코사인)
const INDEX_METRIC: &str = "dotproduct";

// ============================================================================
// Configuration
// ============================================================================

/// Pinecone 연결 설정
#[derive(Debug, Clone)]
pub struct PineconeConfig {
    /// API 키
    pub api_key: String,
    /// 환경 (예: us-east1-gcp)
    pub environment: String,
    /// 인덱스 이름
    pub index: String,
    /// 프로젝트 ID (레거시 데이터 플레인 호스트에 필요)
    pub project_id: Option<String>,
    /// 데이터 플레인 호스트 직접 지정 (설정 시 다른 값 무시)
    pub host: Option<String>,
}

impl PineconeConfig {
    /// 환경변수에서 설정 로드
    ///
    /// 필수: PINECONE_API_KEY, PINECONE_ENVIRONMENT, PINECONE_INDEX
    /// 선택: PINECONE_PROJECT_ID, PINECONE_HOST
    pub fn from_env() -> Result<Self> {
        let api_key = require_env("PINECONE_API_KEY")?;
        let environment = require_env("PINECONE_ENVIRONMENT")?;
        let index = require_env("PINECONE_INDEX")?;

        Ok(Self {
            api_key,
            environment,
            index,
            project_id: optional_env("PINECONE_PROJECT_ID"),
            host: optional_env("PINECONE_HOST"),
        })
    }

    /// 데이터 플레인 호스트 URL
    pub fn data_host(&self) -> String {
        if let Some(ref host) = self.host {
            let host = host.trim_end_matches('/');
            if host.starts_with("http") {
                return host.to_string();
            }
            return format!("https://{}", host);
        }

        match self.project_id {
            Some(ref project) => format!(
                "https://{}-{}.svc.{}.pinecone.io",
                self.index, project, self.environment
            ),
            None => format!("https://{}.svc.{}.pinecone.io", self.index, self.environment),
        }
    }

    /// 컨트롤 플레인 호스트 URL
    pub fn controller_host(&self) -> String {
        format!("https://controller.{}.pinecone.io", self.environment)
    }
}

fn require_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => anyhow::bail!("{} environment variable is not set", name),
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// 필수 환경변수 설정 여부 확인
pub fn has_index_config() -> bool {
    ["PINECONE_API_KEY", "PINECONE_ENVIRONMENT", "PINECONE_INDEX"]
        .iter()
        .all(|name| optional_env(name).is_some())
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector<'a>>,
}

#[derive(Debug, Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a ChunkMetadata,
}

#[derive(Debug, Deserialize)]
struct UpsertResponse {
    #[serde(rename = "upsertedCount", default)]
    upserted_count: usize,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    vector: &'a [f32],
    #[serde(rename = "topK")]
    top_k: usize,
    #[serde(rename = "includeMetadata")]
    include_metadata: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    metadata: Option<ChunkMetadata>,
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    #[serde(rename = "totalVectorCount", default)]
    total_vector_count: usize,
    #[serde(default)]
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'a str,
}

// ============================================================================
// PineconeIndex
// ============================================================================

/// Pinecone 벡터 인덱스 클라이언트
pub struct PineconeIndex {
    config: PineconeConfig,
    client: reqwest::Client,
}

impl PineconeIndex {
    /// 설정으로 생성
    pub fn new(config: PineconeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { config, client })
    }

    /// 환경변수에서 설정을 읽어 생성
    pub fn from_env() -> Result<Self> {
        Self::new(PineconeConfig::from_env()?)
    }

    /// 인덱스 이름 반환
    pub fn index_name(&self) -> &str {
        &self.config.index
    }

    /// 인덱스 목록 조회 (컨트롤 플레인)
    pub async fn list_indexes(&self) -> Result<Vec<String>> {
        let url = format!("{}/databases", self.config.controller_host());
        let response = self
            .client
            .get(&url)
            .header("Api-Key", &self.config.api_key)
            .send()
            .await
            .context("Failed to list indexes")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Pinecone list indexes failed ({}): {}", status, body);
        }

        response
            .json::<Vec<String>>()
            .await
            .context("Failed to parse index list")
    }

    /// 인덱스가 없으면 생성 (metric: dotproduct)
    ///
    /// # Returns
    /// 새로 생성했으면 true
    pub async fn ensure_index(&self, dimension: usize) -> Result<bool> {
        let existing = self.list_indexes().await?;
        if existing.contains(&self.config.index) {
            tracing::debug!("Index {} already exists", self.config.index);
            return Ok(false);
        }

        tracing::info!(
            "Creating index {} (dimension: {}, metric: {})",
            self.config.index,
            dimension,
            INDEX_METRIC
        );

        let url = format!("{}/databases", self.config.controller_host());
        let request = CreateIndexRequest {
            name: &self.config.index,
            dimension,
            metric: INDEX_METRIC,
        };

        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.config.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to create index")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Pinecone create index failed ({}): {}", status, body);
        }

        Ok(true)
    }

    /// 데이터 플레인 POST 공통 처리
    async fn data_post<B: Serialize>(&self, path: &str, body: &B) -> Result<String> {
        let url = format!("{}{}", self.config.data_host(), path);
        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.config.api_key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to call {}", path))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            anyhow::bail!("Pinecone {} failed ({}): {}", path, status, text);
        }

        Ok(text)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert_batch(&self, records: &[ChunkRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let request = UpsertRequest {
            vectors: records
                .iter()
                .map(|r| UpsertVector {
                    id: &r.id,
                    values: &r.embedding,
                    metadata: &r.metadata,
                })
                .collect(),
        };

        let body = self.data_post("/vectors/upsert", &request).await?;
        let parsed: UpsertResponse =
            serde_json::from_str(&body).context("Failed to parse upsert response")?;

        // 일부 응답은 카운트를 생략하므로 요청 개수로 폴백
        if parsed.upserted_count == 0 {
            return Ok(records.len());
        }
        Ok(parsed.upserted_count)
    }

    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<VectorMatch>> {
        let request = QueryRequest {
            vector: embedding,
            top_k,
            include_metadata: true,
        };

        let body = self.data_post("/query", &request).await?;
        let parsed: QueryResponse =
            serde_json::from_str(&body).context("Failed to parse query response")?;

        Ok(parsed
            .matches
            .into_iter()
            .map(|m| VectorMatch {
                id: m.id,
                score: m.score,
                metadata: m.metadata,
            })
            .collect())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let body = self
            .data_post("/describe_index_stats", &serde_json::json!({}))
            .await?;
        let parsed: StatsResponse =
            serde_json::from_str(&body).context("Failed to parse index stats")?;

        Ok(IndexStats {
            vector_count: parsed.total_vector_count,
            dimension: parsed.dimension,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

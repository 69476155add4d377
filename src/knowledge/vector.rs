//! Vector Index - 벡터 인덱스 트레이트 및 유틸리티
//!
//! 호스팅 벡터 인덱스(Pinecone)의 공통 인터페이스입니다.
//! 인덱스 메트릭은 dotproduct를 사용합니다.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedding::DEFAULT_DIMENSION;

/// 벡터 임베딩 차원 (text-embedding-ada-002 기본값)
pub const EMBEDDING_DIMENSION: usize = DEFAULT_DIMENSION;

// ============================================================================
// Types
// ============================================================================

/// 청크 메타데이터 (인덱스에 저장되는 부분)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    /// 청크 텍스트
    pub text: String,
    /// 청크 인덱스 (0-based, 문서 내 순서)
    pub chunk: usize,
    /// 원본 문서 URL
    pub url: String,
}

/// 청크 레코드 (업서트용)
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    /// 청크 ID (uuid v4)
    pub id: String,
    /// 메타데이터 (text, chunk, url)
    pub metadata: ChunkMetadata,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

impl ChunkRecord {
    /// 새 레코드 생성 (ID 자동 발급)
    pub fn new(text: String, chunk: usize, url: String, embedding: Vec<f32>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: ChunkMetadata { text, chunk, url },
            embedding,
        }
    }
}

/// 검색 매치 결과
#[derive(Debug, Clone)]
pub struct VectorMatch {
    /// 청크 ID
    pub id: String,
    /// 유사도 스코어 (dotproduct, 높을수록 유사)
    pub score: f32,
    /// 메타데이터 (include_metadata=true일 때)
    pub metadata: Option<ChunkMetadata>,
}

/// 인덱스 통계
#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    /// 저장된 벡터 개수
    pub vector_count: usize,
    /// 인덱스 차원
    pub dimension: usize,
}

// ============================================================================
// VectorIndex Trait
// ============================================================================

/// VectorIndex 트레이트 (async)
///
/// 호스팅 벡터 인덱스의 공통 인터페이스입니다.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// 벡터 배치 업서트
    async fn upsert_batch(&self, records: &[ChunkRecord]) -> Result<usize>;

    /// 벡터 검색 (top_k, 메타데이터 포함)
    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<VectorMatch>>;

    /// 인덱스 통계 조회
    async fn stats(&self) -> Result<IndexStats>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 내적 계산
///
/// 인덱스 메트릭(dotproduct)과 동일한 스코어를 로컬에서 계산합니다.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_product() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![4.0, 5.0, 6.0];
        assert!((dot_product(&a, &b) - 32.0).abs() < 0.0001);
    }

    #[test]
    fn test_dot_product_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert_eq!(dot_product(&a, &b), 0.0);
    }

    #[test]
    fn test_dot_product_mismatched() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0];
        assert_eq!(dot_product(&a, &b), 0.0);
    }

    #[test]
    fn test_dot_product_empty() {
        let a: Vec<f32> = vec![];
        assert_eq!(dot_product(&a, &a), 0.0);
    }

    #[test]
    fn test_chunk_record_new() {
        let record = ChunkRecord::new(
            "some text".to_string(),
            3,
            "https://example.com/docs".to_string(),
            vec![0.1, 0.2],
        );

        // uuid v4 형식 확인
        assert_eq!(record.id.len(), 36);
        assert_eq!(record.metadata.chunk, 3);
        assert_eq!(record.metadata.url, "https://example.com/docs");

        let other = ChunkRecord::new(
            "other".to_string(),
            0,
            "https://example.com".to_string(),
            vec![],
        );
        assert_ne!(record.id, other.id);
    }

    #[test]
    fn test_metadata_roundtrip() {
        let meta = ChunkMetadata {
            text: "chunk body".to_string(),
            chunk: 7,
            url: "https://example.com/page".to_string(),
        };
        let json = serde_json::to_string(&meta).unwrap();
        let back: ChunkMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(meta, back);
    }
}

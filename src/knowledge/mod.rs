//! Knowledge 모듈 - 호스팅 벡터 인덱스 기반 지식 저장소
//!
//! - Pinecone: 임베딩 저장 + 유사도 검색 (호스팅 서비스)
//! - Chunker: 토큰 길이 기반 재귀 텍스트 분할

mod chunker;
mod pinecone;
mod vector;

// Re-exports
pub use chunker::{default_chunker, token_splitter, ChunkConfig, Chunker, TokenSplitter};
pub use pinecone::{has_index_config, PineconeConfig, PineconeIndex};
pub use vector::{
    dot_product, ChunkMetadata, ChunkRecord, IndexStats, VectorIndex, VectorMatch,
    EMBEDDING_DIMENSION,
};

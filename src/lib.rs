//! docs-rag - 문서 RAG 챗 시스템
//!
//! OpenAI 임베딩 + Pinecone 벡터 인덱스로 문서 덤프를 검색 가능하게
//! 만들고, GPT-4에 검색 컨텍스트를 붙여 질의응답하는 CLI입니다.
//! URL 다운로드 → 처리 → 정리 파이프라인 워크플로도 포함합니다.

pub mod chat;
pub mod cli;
pub mod embedding;
pub mod knowledge;
pub mod loader;
pub mod pipeline;

// Re-exports
pub use chat::{augment_with_contexts, ChatClient, ChatMessage, Transcript, DEFAULT_PRIMER};
pub use embedding::{get_api_key, has_api_key, EmbeddingProvider, OpenAiEmbedding};
pub use knowledge::{
    default_chunker, dot_product, has_index_config, ChunkConfig, ChunkMetadata, ChunkRecord,
    Chunker, IndexStats, PineconeConfig, PineconeIndex, TokenSplitter, VectorIndex, VectorMatch,
    EMBEDDING_DIMENSION,
};
pub use loader::{DocsLoader, LoaderConfig, PageDocument};
pub use pipeline::{
    run_starter, Activities, ActivityError, ActivityOptions, DownloadTask, FileProcessing,
    RetryPolicy, WorkerPool, FAILED_CHECKSUM,
};

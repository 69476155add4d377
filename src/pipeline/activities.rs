//! 파이프라인 액티비티 구현
//!
//! 다운로드 / 처리 / 정리 세 액티비티의 본문입니다. 실행 정책(타임아웃,
//! 재시도)은 workflow 러너가 적용하므로 여기서는 작업 자체만 수행합니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::embedding::EmbeddingProvider;
use crate::knowledge::{ChunkRecord, Chunker, VectorIndex};
use crate::loader::extract_html_text;

use super::{ActivityError, ActivityResult, DownloadTask};

/// 처리 액티비티의 고정 작업 딜레이
const WORK_DELAY_SECS: u64 = 3;

// ============================================================================
// Worker Filesystem
// ============================================================================

/// 워커 파일시스템 루트 (~/.docs-rag/demo_fs)
pub fn demo_fs_root() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".docs-rag")
        .join("demo_fs")
}

/// 워커 디렉토리 생성 및 파일 경로 조립
pub fn create_filepath(worker_id: &str, run_id: &str) -> Result<PathBuf> {
    create_filepath_in(&demo_fs_root(), worker_id, run_id)
}

/// 지정된 루트 아래에 워커 파일 경로 조립
pub fn create_filepath_in(root: &Path, worker_id: &str, run_id: &str) -> Result<PathBuf> {
    let directory = root.join(worker_id);
    std::fs::create_dir_all(&directory)
        .with_context(|| format!("Failed to create worker directory: {}", directory.display()))?;
    Ok(directory.join(run_id))
}

// ============================================================================
// Activities
// ============================================================================

/// 파이프라인 액티비티 묶음
///
/// 처리 액티비티가 임베딩/인덱스에 의존하므로 트레이트 오브젝트로
/// 주입받습니다.
pub struct Activities {
    client: reqwest::Client,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    chunker: Box<dyn Chunker>,
    fs_root: PathBuf,
    work_delay: Duration,
}

impl Activities {
    /// 새 액티비티 묶음 생성
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        chunker: Box<dyn Chunker>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            embedder,
            index,
            chunker,
            fs_root: demo_fs_root(),
            work_delay: Duration::from_secs(WORK_DELAY_SECS),
        })
    }

    /// 테스트용: 파일시스템 루트와 딜레이 조정
    #[cfg(test)]
    fn with_overrides(mut self, fs_root: PathBuf, work_delay: Duration) -> Self {
        self.fs_root = fs_root;
        self.work_delay = work_delay;
        self
    }

    /// 액티비티: URL을 워커 파일시스템으로 다운로드
    ///
    /// 4xx 응답은 재시도하지 않습니다. 그 외 실패는 재시도 대상입니다.
    pub async fn download_file(&self, task: &DownloadTask) -> ActivityResult<PathBuf> {
        // URL 검증 (잘못된 입력은 재시도 무의미)
        url::Url::parse(&task.url)
            .map_err(|e| ActivityError::NonRetryable(format!("invalid url {}: {}", task.url, e)))?;

        let path = create_filepath_in(&self.fs_root, &task.worker_id, &task.run_id)?;
        tracing::info!("Downloading {} and saving to {}", task.url, path.display());

        let response = self
            .client
            .get(&task.url)
            .send()
            .await
            .with_context(|| format!("Failed to request {}", task.url))?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(ActivityError::NonRetryable(format!(
                "status {}: {}",
                status, body
            )));
        }
        if !status.is_success() {
            return Err(anyhow::anyhow!("bad status {}", status).into());
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read response body")?;

        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Failed to write download: {}", path.display()))?;

        Ok(path)
    }

    /// 액티비티: 다운로드된 파일 처리
    ///
    /// HTML에서 텍스트를 추출하고 청킹/임베딩 후 인덱스에 업서트합니다.
    /// 추출 텍스트의 sha256 체크섬을 반환합니다.
    pub async fn process_file(&self, path: &Path, source_url: &str) -> ActivityResult<String> {
        let html = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read file: {}", path.display()))?;

        let text = extract_html_text(&html);
        if text.trim().is_empty() {
            return Err(ActivityError::NonRetryable(format!(
                "no text content in {}",
                path.display()
            )));
        }

        // 청킹 및 임베딩
        let chunks = self.chunker.chunk(&text);
        let embeddings = self.embedder.embed_batch(&chunks).await?;

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (chunk_text, embedding))| {
                ChunkRecord::new(chunk_text, i, source_url.to_string(), embedding)
            })
            .collect();

        let upserted = self.index.upsert_batch(&records).await?;

        let checksum = format!("{:x}", Sha256::digest(text.as_bytes()));

        tokio::time::sleep(self.work_delay).await;
        tracing::info!(
            "Did some work on {} ({} chunks upserted), checksum {}",
            path.display(),
            upserted,
            checksum
        );

        Ok(checksum)
    }

    /// 액티비티: 워커 파일시스템에서 파일 삭제
    ///
    /// 첫 액티비티가 만든 파일만 지우고 워커 폴더는 남깁니다.
    pub async fn cleanup_file(&self, path: &Path) -> ActivityResult<()> {
        tokio::time::sleep(self.work_delay).await;
        tracing::info!("Removing {}", path.display());

        tokio::fs::remove_file(path)
            .await
            .with_context(|| format!("Failed to remove file: {}", path.display()))?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::knowledge::{ChunkConfig, IndexStats, TokenSplitter, VectorMatch};

    struct MockEmbedder;

    #[async_trait]
    impl EmbeddingProvider for MockEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.1; 4])
        }

        fn dimension(&self) -> usize {
            4
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    #[derive(Default)]
    struct MockIndex {
        upserted: Mutex<Vec<ChunkRecord>>,
    }

    #[async_trait]
    impl VectorIndex for MockIndex {
        async fn upsert_batch(&self, records: &[ChunkRecord]) -> Result<usize> {
            let mut guard = self.upserted.lock().unwrap();
            guard.extend_from_slice(records);
            Ok(records.len())
        }

        async fn query(&self, _embedding: &[f32], _top_k: usize) -> Result<Vec<VectorMatch>> {
            Ok(vec![])
        }

        async fn stats(&self) -> Result<IndexStats> {
            Ok(IndexStats::default())
        }
    }

    fn test_activities(index: Arc<MockIndex>, root: PathBuf) -> Activities {
        let chunker = TokenSplitter::new(ChunkConfig {
            chunk_tokens: 50,
            overlap_tokens: 0,
        })
        .unwrap();

        Activities::new(Arc::new(MockEmbedder), index, Box::new(chunker))
            .unwrap()
            .with_overrides(root, Duration::from_millis(0))
    }

    #[test]
    fn test_create_filepath_in() {
        let dir = tempfile::tempdir().unwrap();
        let path = create_filepath_in(dir.path(), "worker-1", "run-abc").unwrap();

        assert!(dir.path().join("worker-1").is_dir());
        assert_eq!(path.file_name().unwrap(), "run-abc");
    }

    #[tokio::test]
    async fn test_process_file() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(MockIndex::default());
        let activities = test_activities(index.clone(), dir.path().to_path_buf());

        let file = dir.path().join("page.html");
        std::fs::write(
            &file,
            "<html><body><main>Documentation page with enough words to survive \
             extraction and produce at least one chunk of text for the index.</main></body></html>",
        )
        .unwrap();

        let checksum = activities
            .process_file(&file, "https://www.gitpod.io/docs/intro")
            .await
            .unwrap();

        // sha256 hex
        assert_eq!(checksum.len(), 64);
        assert!(checksum.chars().all(|c| c.is_ascii_hexdigit()));

        let upserted = index.upserted.lock().unwrap();
        assert!(!upserted.is_empty());
        assert_eq!(upserted[0].metadata.url, "https://www.gitpod.io/docs/intro");
        assert_eq!(upserted[0].metadata.chunk, 0);
    }

    #[tokio::test]
    async fn test_process_file_empty_is_non_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(MockIndex::default());
        let activities = test_activities(index, dir.path().to_path_buf());

        let file = dir.path().join("empty.html");
        std::fs::write(&file, "<html><body></body></html>").unwrap();

        let err = activities
            .process_file(&file, "https://example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, ActivityError::NonRetryable(_)));
    }

    #[tokio::test]
    async fn test_cleanup_file() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(MockIndex::default());
        let activities = test_activities(index, dir.path().to_path_buf());

        let worker_dir = dir.path().join("worker-1");
        std::fs::create_dir_all(&worker_dir).unwrap();
        let file = worker_dir.join("run-1");
        std::fs::write(&file, "payload").unwrap();

        activities.cleanup_file(&file).await.unwrap();

        // 파일은 삭제, 폴더는 유지
        assert!(!file.exists());
        assert!(worker_dir.is_dir());
    }

    #[tokio::test]
    async fn test_download_invalid_url_non_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(MockIndex::default());
        let activities = test_activities(index, dir.path().to_path_buf());

        let task = DownloadTask {
            url: "not a url".to_string(),
            worker_id: "worker-1".to_string(),
            run_id: "run-1".to_string(),
        };

        let err = activities.download_file(&task).await.unwrap_err();
        assert!(matches!(err, ActivityError::NonRetryable(_)));
    }
}

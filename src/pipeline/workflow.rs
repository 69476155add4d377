//! 워크플로 정의 및 액티비티 러너
//!
//! FileProcessing 워크플로와, 선언된 타임아웃/재시도 정책을 적용해
//! 액티비티를 실행하는 러너입니다. 스케줄링 자체는 tokio가 담당합니다.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use uuid::Uuid;

use super::activities::Activities;
use super::{ActivityError, ActivityOptions, ActivityResult, DownloadTask, RetryPolicy};

/// 처리 실패 시 반환되는 센티널 체크섬
pub const FAILED_CHECKSUM: &str = "failed execution";

/// 워크플로 시작 간 간격 (스태거)
const START_STAGGER_MS: u64 = 100;

// ============================================================================
// Activity Runner
// ============================================================================

/// 액티비티 실행 (start-to-close 타임아웃 + 재시도 정책)
///
/// 타임아웃은 시도마다 적용됩니다. NonRetryable 에러는 즉시 반환하고,
/// 그 외에는 정책에 따라 백오프 후 재시도합니다.
pub async fn execute_activity<T, F, Fut>(
    name: &str,
    options: &ActivityOptions,
    mut activity: F,
) -> ActivityResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ActivityResult<T>>,
{
    let mut attempt: u32 = 1;
    let mut interval = options.retry.initial_interval;

    loop {
        let error = match tokio::time::timeout(options.start_to_close, activity()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e @ ActivityError::NonRetryable(_))) => {
                tracing::warn!("Activity {} failed permanently: {}", name, e);
                return Err(e);
            }
            Ok(Err(e)) => e,
            Err(_) => ActivityError::TimedOut(options.start_to_close),
        };

        let max = options.retry.maximum_attempts;
        if max != 0 && attempt >= max {
            tracing::warn!(
                "Activity {} exhausted {} attempts: {}",
                name,
                attempt,
                error
            );
            return Err(error);
        }

        tracing::warn!(
            "Activity {} attempt {} failed ({}), retrying in {:?}",
            name,
            attempt,
            error,
            interval
        );
        tokio::time::sleep(interval).await;

        interval = interval
            .mul_f64(options.retry.backoff_coefficient)
            .min(options.retry.maximum_interval);
        attempt += 1;
    }
}

// ============================================================================
// Worker Pool
// ============================================================================

/// 스티키 워커 풀
///
/// 워커마다 고유 ID(= 전용 태스크 큐 이름)를 가지며, 워크플로는
/// 랜덤으로 하나를 골라 모든 액티비티를 그 워커에 고정합니다.
#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<String>,
}

impl WorkerPool {
    /// 지정된 크기의 풀 생성
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let workers = (0..size)
            .map(|_| format!("worker-{}", Uuid::new_v4()))
            .collect();
        Self { workers }
    }

    /// 랜덤 워커 선택
    pub fn pick(&self) -> &str {
        self.workers
            .choose(&mut rand::thread_rng())
            .expect("worker pool is never empty")
    }

    /// 워커 ID 목록
    pub fn workers(&self) -> &[String] {
        &self.workers
    }
}

// ============================================================================
// FileProcessing Workflow
// ============================================================================

/// 파일 처리 워크플로
///
/// 1. 가용 워커(스티키 큐) 선택
/// 2. 해당 워커 파일시스템으로 다운로드
/// 3. 처리 (재시도 없음) - 실패해도 정리는 항상 실행
/// 4. 체크섬 반환 (처리 실패 시 센티널)
pub struct FileProcessing {
    activities: Arc<Activities>,
    pool: Arc<WorkerPool>,
}

impl FileProcessing {
    pub fn new(activities: Arc<Activities>, pool: Arc<WorkerPool>) -> Self {
        Self { activities, pool }
    }

    /// 워크플로 실행
    pub async fn run(&self, url: &str) -> ActivityResult<String> {
        let options = ActivityOptions::default();

        tracing::info!("Searching for available worker");
        let worker_id = execute_activity("get_available_task_queue", &options, || {
            let pool = self.pool.clone();
            async move { Ok(pool.pick().to_string()) }
        })
        .await?;
        tracing::info!("Matching workflow to worker {}", worker_id);

        let task = DownloadTask {
            url: url.to_string(),
            worker_id,
            run_id: Uuid::new_v4().to_string(),
        };

        let path = execute_activity("download_file_to_worker_filesystem", &options, || {
            self.activities.download_file(&task)
        })
        .await?;

        // 처리 액티비티는 재시도하지 않음
        let process_options = ActivityOptions {
            start_to_close: Duration::from_secs(10),
            retry: RetryPolicy::no_retry(),
        };
        let processed = execute_activity("work_on_file_in_worker_filesystem", &process_options, || {
            self.activities.process_file(&path, url)
        })
        .await;

        // 정리는 처리 결과와 무관하게 항상 실행
        if let Err(e) = execute_activity("clean_up_file_from_worker_filesystem", &options, || {
            self.activities.cleanup_file(&path)
        })
        .await
        {
            tracing::warn!("Cleanup failed for {}: {}", path.display(), e);
        }

        match processed {
            Ok(checksum) => Ok(checksum),
            Err(e) => {
                tracing::error!("Processing failed for {}: {}", url, e);
                Ok(FAILED_CHECKSUM.to_string())
            }
        }
    }
}

// ============================================================================
// Starter
// ============================================================================

/// 전체 URL에 대해 워크플로를 동시 실행
///
/// 워크플로들은 짧은 간격을 두고 시작되며, 입력 순서대로 체크섬을
/// 반환합니다. 개별 워크플로 실패는 센티널로 기록됩니다.
pub async fn run_starter(
    urls: &[String],
    workers: usize,
    activities: Arc<Activities>,
) -> Result<Vec<String>> {
    anyhow::ensure!(!urls.is_empty(), "No URLs to process");

    let pool = Arc::new(WorkerPool::new(workers));
    tracing::info!(
        "Starting {} workflows across {} workers",
        urls.len(),
        pool.workers().len()
    );

    let mut handles = Vec::with_capacity(urls.len());
    for (idx, url) in urls.iter().enumerate() {
        let workflow = FileProcessing::new(activities.clone(), pool.clone());
        let url = url.clone();

        handles.push(tokio::spawn(async move {
            tracing::info!("Workflow {} started for {}", idx, url);
            workflow.run(&url).await
        }));

        tokio::time::sleep(Duration::from_millis(START_STAGGER_MS)).await;
    }

    let mut checksums = Vec::with_capacity(handles.len());
    for (idx, handle) in futures::future::join_all(handles).await.into_iter().enumerate() {
        match handle.context("Workflow task panicked")? {
            Ok(checksum) => checksums.push(checksum),
            Err(e) => {
                tracing::error!("Workflow {} failed: {}", idx, e);
                checksums.push(FAILED_CHECKSUM.to_string());
            }
        }
    }

    Ok(checksums)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_options(max_attempts: u32) -> ActivityOptions {
        ActivityOptions {
            start_to_close: Duration::from_millis(50),
            retry: RetryPolicy {
                maximum_attempts: max_attempts,
                initial_interval: Duration::from_millis(1),
                backoff_coefficient: 2.0,
                maximum_interval: Duration::from_millis(10),
            },
        }
    }

    #[tokio::test]
    async fn test_execute_activity_success() {
        let result = execute_activity("ok", &fast_options(3), || async { Ok::<_, ActivityError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_execute_activity_retries_then_succeeds() {
        let calls = AtomicU32::new(0);

        let result = execute_activity("flaky", &fast_options(5), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ActivityError::Retryable(anyhow::anyhow!("transient")))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_execute_activity_exhausts_attempts() {
        let calls = AtomicU32::new(0);

        let result: ActivityResult<()> = execute_activity("failing", &fast_options(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ActivityError::Retryable(anyhow::anyhow!("always"))) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_execute_activity_non_retryable_stops() {
        let calls = AtomicU32::new(0);

        let result: ActivityResult<()> = execute_activity("fatal", &fast_options(5), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ActivityError::NonRetryable("status 404".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(ActivityError::NonRetryable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execute_activity_timeout() {
        let result: ActivityResult<()> = execute_activity(
            "slow",
            &fast_options(1),
            || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await;

        assert!(matches!(result, Err(ActivityError::TimedOut(_))));
    }

    #[test]
    fn test_worker_pool_pick_is_member() {
        let pool = WorkerPool::new(3);
        assert_eq!(pool.workers().len(), 3);

        for _ in 0..20 {
            let picked = pool.pick().to_string();
            assert!(pool.workers().contains(&picked));
        }
    }

    #[test]
    fn test_worker_pool_minimum_size() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.workers().len(), 1);
    }

    #[test]
    fn test_worker_ids_unique() {
        let pool = WorkerPool::new(5);
        let mut ids = pool.workers().to_vec();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 5);
    }
}

//! 파이프라인 모듈 - FileProcessing 워크플로
//!
//! URL 다운로드 → 처리(임베딩/업서트) → 정리의 3단계 액티비티를
//! 선언하고, 타임아웃/재시도 정책과 함께 tokio 위에서 실행합니다.
//!
//! 워크플로는 랜덤으로 선택된 "스티키 워커"에 고정됩니다. 다운로드된
//! 파일이 해당 워커의 파일시스템에 있으므로 이후 액티비티도 같은
//! 워커에서 실행되어야 합니다.

mod activities;
mod workflow;

use std::time::Duration;

use thiserror::Error;

pub use activities::{create_filepath, demo_fs_root, Activities};
pub use workflow::{execute_activity, run_starter, FileProcessing, WorkerPool, FAILED_CHECKSUM};

// ============================================================================
// Types
// ============================================================================

/// 다운로드 디스크립터
///
/// 다운로드가 워커 파일시스템의 어디에 저장될지를 나타냅니다.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    /// 다운로드할 URL
    pub url: String,
    /// 스티키 워커 ID
    pub worker_id: String,
    /// 워크플로 실행 ID (uuid v4)
    pub run_id: String,
}

/// 재시도 정책 (런타임에 전달되는 선언)
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 최대 시도 횟수 (0 = 무제한)
    pub maximum_attempts: u32,
    /// 첫 재시도 전 대기 시간
    pub initial_interval: Duration,
    /// 대기 시간 증가 계수
    pub backoff_coefficient: f64,
    /// 대기 시간 상한
    pub maximum_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            maximum_attempts: 3,
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(100),
        }
    }
}

impl RetryPolicy {
    /// 재시도 없음 (시도 1회)
    pub fn no_retry() -> Self {
        Self {
            maximum_attempts: 1,
            ..Default::default()
        }
    }
}

/// 액티비티 실행 옵션
#[derive(Debug, Clone)]
pub struct ActivityOptions {
    /// start-to-close 타임아웃
    pub start_to_close: Duration,
    /// 재시도 정책
    pub retry: RetryPolicy,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            start_to_close: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

/// 액티비티 에러
///
/// 재시도 가능 여부를 구분합니다. NonRetryable은 러너가 즉시 포기합니다.
#[derive(Debug, Error)]
pub enum ActivityError {
    /// 재시도해도 소용없는 실패 (예: HTTP 4xx)
    #[error("non-retryable: {0}")]
    NonRetryable(String),

    /// start-to-close 타임아웃 초과
    #[error("activity timed out after {0:?}")]
    TimedOut(Duration),

    /// 재시도 가능한 실패
    #[error(transparent)]
    Retryable(#[from] anyhow::Error),
}

/// 액티비티 결과 타입
pub type ActivityResult<T> = Result<T, ActivityError>;

// ============================================================================
// Tests
// ============================================================================

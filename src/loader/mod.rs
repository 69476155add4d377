//! 문서 로더 모듈 - HTML 덤프 디렉토리 수집
//!
//! ReadTheDocs 스타일 덤프(`rtdocs/<host>/<path>.html`)를 순회하며
//! 페이지 텍스트를 추출하고, 파일 경로를 원본 `https://` URL로
//! 되돌립니다.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use scraper::{Html, Selector};

// ============================================================================
// Types
// ============================================================================

/// 로드된 페이지 문서
#[derive(Debug, Clone)]
pub struct PageDocument {
    /// 추출된 본문 텍스트
    pub text: String,
    /// 원본 문서 URL (경로에서 복원)
    pub url: String,
    /// 로컬 파일 경로
    pub path: PathBuf,
}

/// 로더 설정
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// URL 복원 시 사용할 스킴
    pub scheme: String,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            max_file_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

// ============================================================================
// DocsLoader
// ============================================================================

/// HTML 덤프 디렉토리 로더
pub struct DocsLoader {
    config: LoaderConfig,
}

impl DocsLoader {
    /// 설정으로 생성
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 생성
    pub fn with_defaults() -> Self {
        Self::new(LoaderConfig::default())
    }

    /// 디렉토리 전체 로드 (재귀)
    pub fn load_dir(&self, root: &Path) -> Result<Vec<PageDocument>> {
        anyhow::ensure!(
            root.is_dir(),
            "Docs directory not found: {}",
            root.display()
        );

        let mut documents = Vec::new();

        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Walk error: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_file() || !is_html(path) {
                continue;
            }

            match self.load_file(root, path)? {
                Some(doc) => documents.push(doc),
                None => tracing::debug!("Skipped: {}", path.display()),
            }
        }

        tracing::info!("Loaded {} documents from {}", documents.len(), root.display());
        Ok(documents)
    }

    /// 단일 파일 로드
    ///
    /// 크기 제한 초과 또는 빈 본문이면 None을 반환합니다.
    pub fn load_file(&self, root: &Path, path: &Path) -> Result<Option<PageDocument>> {
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("Failed to read metadata: {}", path.display()))?;

        if self.config.max_file_size > 0 && metadata.len() > self.config.max_file_size {
            tracing::warn!("File too large, skipping: {}", path.display());
            return Ok(None);
        }

        let html = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;

        let text = extract_html_text(&html);
        if text.trim().is_empty() {
            return Ok(None);
        }

        let url = path_to_url(root, path, &self.config.scheme)?;

        Ok(Some(PageDocument {
            text,
            url,
            path: path.to_path_buf(),
        }))
    }
}

// ============================================================================
// URL Mapping
// ============================================================================

/// 파일 경로를 원본 URL로 복원
///
/// `rtdocs/www.gitpod.io/docs/introduction.html`
/// → `https://www.gitpod.io/docs/introduction.html`
fn path_to_url(root: &Path, path: &Path, scheme: &str) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .with_context(|| format!("Path outside root: {}", path.display()))?;

    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();

    anyhow::ensure!(!parts.is_empty(), "Empty relative path");

    Ok(format!("{}://{}", scheme, parts.join("/")))
}

/// HTML 파일 여부
fn is_html(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("html") | Some("htm")
    )
}

// ============================================================================
// HTML Text Extraction
// ============================================================================

/// HTML에서 본문 텍스트 추출
///
/// 우선순위: article > main > [role=main] > .content > #content > body
pub fn extract_html_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let selectors = [
        "article",
        "main",
        "[role=main]",
        ".content",
        "#content",
        "body",
    ];

    for selector_str in selectors {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(element) = document.select(&selector).next() {
                let text = element_text(&element);
                if text.len() > 100 {
                    return text;
                }
            }
        }
    }

    // 폴백: 전체 body 텍스트
    if let Ok(selector) = Selector::parse("body") {
        if let Some(element) = document.select(&selector).next() {
            return element_text(&element);
        }
    }

    String::new()
}

/// 요소에서 텍스트 추출 및 공백 정리
fn element_text(element: &scraper::ElementRef) -> String {
    let mut text = String::new();

    for node in element.text() {
        let trimmed = node.trim();
        if !trimmed.is_empty() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(trimmed);
        }
    }

    // 연속 공백 정리
    if let Ok(re) = regex::Regex::new(r"\s+") {
        re.replace_all(&text, " ").trim().to_string()
    } else {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

// ============================================================================
// Tests
// ============================================================================

//! CLI 모듈
//!
//! docs-rag CLI 명령어 정의 및 구현

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::chat::{augment_with_contexts, ChatClient, ChatMessage, Transcript, DEFAULT_PRIMER};
use crate::embedding::{has_api_key, EmbeddingProvider, OpenAiEmbedding};
use crate::knowledge::{
    default_chunker, has_index_config, ChunkRecord, Chunker, PineconeIndex, VectorIndex,
};
use crate::loader::DocsLoader;
use crate::pipeline::{demo_fs_root, run_starter, Activities};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "docs-rag")]
#[command(version, about = "문서 RAG 챗 CLI", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// HTML 덤프 디렉토리를 임베딩하여 인덱스에 업서트
    Ingest {
        /// HTML 덤프 디렉토리 (예: rtdocs)
        dir: PathBuf,

        /// 배치 크기 (한 번에 임베딩/업서트할 청크 수)
        #[arg(short, long, default_value = "100")]
        batch_size: usize,

        /// 인덱스가 없으면 생성
        #[arg(long)]
        create_index: bool,
    },

    /// 단일 질문 (검색 증강 질의응답)
    Ask {
        /// 질문
        query: String,

        /// 검색 결과 개수
        #[arg(short, long, default_value = "5")]
        top_k: usize,
    },

    /// 대화형 챗 (q 입력 시 CSV 로그 저장 후 종료)
    Chat {
        /// 시스템 프롬프트 (미지정 시 실행 중 입력)
        #[arg(short, long)]
        system: Option<String>,

        /// 검색 결과 개수
        #[arg(short, long, default_value = "5")]
        top_k: usize,

        /// 챗 로그 저장 경로
        #[arg(long, default_value = "chatlog.csv")]
        log: PathBuf,

        /// 검색 증강 없이 순수 챗
        #[arg(long)]
        no_retrieval: bool,
    },

    /// FileProcessing 워크플로 실행 (다운로드 → 처리 → 정리)
    Pipeline {
        /// 처리할 URL 목록
        urls: Vec<String>,

        /// URL 목록 파일 (줄 단위, # 주석 지원)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// 스티키 워커 수
        #[arg(short, long, default_value = "3")]
        workers: usize,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Ingest {
            dir,
            batch_size,
            create_index,
        } => cmd_ingest(dir, batch_size, create_index).await,
        Commands::Ask { query, top_k } => cmd_ask(&query, top_k).await,
        Commands::Chat {
            system,
            top_k,
            log,
            no_retrieval,
        } => cmd_chat(system, top_k, log, no_retrieval).await,
        Commands::Pipeline {
            urls,
            file,
            workers,
        } => cmd_pipeline(urls, file, workers).await,
        Commands::Status => cmd_status().await,
    }
}

/// API 키/인덱스 설정 확인
fn ensure_config() -> Result<()> {
    if !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export OPENAI_API_KEY=your-api-key\n\n\
             API 키 발급: https://platform.openai.com/api-keys"
        );
    }

    if !has_index_config() {
        bail!(
            "Pinecone 설정이 없습니다.\n\n\
             설정 방법:\n  \
             export PINECONE_API_KEY=your-api-key\n  \
             export PINECONE_ENVIRONMENT=us-east1-gcp\n  \
             export PINECONE_INDEX=your-index"
        );
    }

    Ok(())
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 인제스트 명령어 (ingest)
///
/// HTML 덤프를 로드해서 청킹하고, 배치 단위로 임베딩 후 업서트합니다.
async fn cmd_ingest(dir: PathBuf, batch_size: usize, create_index: bool) -> Result<()> {
    ensure_config()?;

    if batch_size == 0 {
        bail!("배치 크기는 1 이상이어야 합니다");
    }

    // 문서 로드
    println!("[*] 문서 로드 중: {}", dir.display());
    let loader = DocsLoader::with_defaults();
    let documents = loader.load_dir(&dir).context("문서 로드 실패")?;
    println!("[OK] {} 개 문서 로드됨", documents.len());

    if documents.is_empty() {
        println!("[!] 수집할 문서가 없습니다.");
        return Ok(());
    }

    // 청킹
    let chunker = default_chunker().context("청커 생성 실패")?;
    let mut chunks: Vec<(String, usize, String)> = Vec::new();
    for doc in &documents {
        for (i, text) in chunker.chunk(&doc.text).into_iter().enumerate() {
            chunks.push((text, i, doc.url.clone()));
        }
    }
    println!("[*] 총 {} 개 청크 생성됨", chunks.len());

    // 임베딩/인덱스 준비
    let embedder = OpenAiEmbedding::from_env().context("임베딩 클라이언트 생성 실패")?;
    let index = PineconeIndex::from_env().context("인덱스 클라이언트 생성 실패")?;

    if create_index {
        let created = index
            .ensure_index(embedder.dimension())
            .await
            .context("인덱스 생성 실패")?;
        if created {
            println!("[OK] 인덱스 생성됨: {}", index.index_name());
        }
    }

    match index.stats().await {
        Ok(stats) => println!("[*] 인덱스 현황: {} 벡터", stats.vector_count),
        Err(e) => tracing::debug!("인덱스 통계 조회 실패: {}", e),
    }

    // 배치 임베딩 + 업서트
    // (rate limit은 임베딩 클라이언트가 성공할 때까지 재시도)
    let total_batches = chunks.len().div_ceil(batch_size);
    let mut upserted_total = 0;

    for (batch_no, batch) in chunks.chunks(batch_size).enumerate() {
        print!("[{}/{}] 임베딩 중... ", batch_no + 1, total_batches);
        std::io::stdout().flush().ok();

        let texts: Vec<String> = batch.iter().map(|(text, _, _)| text.clone()).collect();
        let embeddings = embedder.embed_batch(&texts).await.context("임베딩 실패")?;

        let records: Vec<ChunkRecord> = batch
            .iter()
            .zip(embeddings)
            .map(|((text, chunk_idx, url), embedding)| {
                ChunkRecord::new(text.clone(), *chunk_idx, url.clone(), embedding)
            })
            .collect();

        let upserted = index
            .upsert_batch(&records)
            .await
            .context("업서트 실패")?;
        upserted_total += upserted;

        println!("완료 ({} 벡터)", upserted);
    }

    println!();
    println!("[OK] 인제스트 완료: {} 벡터 업서트됨", upserted_total);

    Ok(())
}

/// 질문 명령어 (ask)
///
/// 질문을 임베딩해 인덱스에서 컨텍스트를 찾고 GPT-4에 전달합니다.
async fn cmd_ask(query: &str, top_k: usize) -> Result<()> {
    ensure_config()?;

    println!("[*] 검색 중: \"{}\"", query);

    let embedder = OpenAiEmbedding::from_env().context("임베딩 클라이언트 생성 실패")?;
    let index = PineconeIndex::from_env().context("인덱스 클라이언트 생성 실패")?;

    let contexts = retrieve_contexts(&embedder, &index, query, top_k).await?;

    if contexts.is_empty() {
        println!("[!] 검색 결과가 없습니다. 질문만으로 진행합니다.");
    }

    let mut transcript = Transcript::new();
    transcript.push(ChatMessage::system(DEFAULT_PRIMER));
    transcript.push(ChatMessage::user(augment_with_contexts(&contexts, query)));

    println!("[*] GPT-4 응답 대기 중...");
    let client = ChatClient::from_env().context("챗 클라이언트 생성 실패")?;
    let answer = client
        .complete(transcript.messages())
        .await
        .context("챗 컴플리션 실패")?;

    println!();
    println!("{}", answer);

    Ok(())
}

/// 챗 명령어 (chat)
///
/// 대화형 루프. 매 턴 현재 질문으로 검색 증강하며, 종료 시
/// 트랜스크립트를 CSV로 저장합니다.
async fn cmd_chat(
    system: Option<String>,
    top_k: usize,
    log: PathBuf,
    no_retrieval: bool,
) -> Result<()> {
    if !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\
             설정: export OPENAI_API_KEY=your-key"
        );
    }
    if !no_retrieval && !has_index_config() {
        bail!(
            "Pinecone 설정이 없습니다. (--no-retrieval로 순수 챗 가능)\n\
             설정: export PINECONE_API_KEY=... PINECONE_ENVIRONMENT=... PINECONE_INDEX=..."
        );
    }

    // 시스템 프롬프트 결정
    let system_prompt = match system {
        Some(s) => s,
        None => {
            println!(
                "Enter your system prompt context below. As an example it should be something like:"
            );
            println!("'you are an experienced frontend developer who cares about readability'");
            let input = prompt_line("Leave blank for default: ")?.unwrap_or_default();
            if input.is_empty() {
                DEFAULT_PRIMER.to_string()
            } else {
                input
            }
        }
    };

    let retrieval = build_retrieval(no_retrieval)?;
    let client = ChatClient::from_env().context("챗 클라이언트 생성 실패")?;

    let mut transcript = Transcript::new();
    transcript.push(ChatMessage::system(system_prompt));

    loop {
        let prompt_text = if transcript.len() == 1 {
            "Enter your prompt: "
        } else {
            "Enter next prompt (q to quit): "
        };
        // EOF(파이프 입력 소진)는 q와 동일하게 종료 처리
        let input = prompt_line(prompt_text)?.unwrap_or_else(|| "q".to_string());

        if input == "q" {
            transcript.save_csv(&log).context("챗 로그 저장 실패")?;
            println!("Wrote log of chat to `{}`", log.display());
            return Ok(());
        }
        if input.is_empty() {
            continue;
        }

        // 검색 증강
        let user_content = match retrieval {
            Some((ref embedder, ref index)) => {
                let contexts = retrieve_contexts(embedder, index, &input, top_k).await?;
                if contexts.is_empty() {
                    println!("[!] 검색 결과 없음");
                }
                augment_with_contexts(&contexts, &input)
            }
            None => input.clone(),
        };

        transcript.push(ChatMessage::user(user_content));

        let answer = client
            .complete(transcript.messages())
            .await
            .context("챗 컴플리션 실패")?;

        println!();
        println!("{}", answer);
        println!();

        transcript.push(ChatMessage::assistant(answer));
    }
}

/// 파이프라인 명령어 (pipeline)
///
/// URL마다 FileProcessing 워크플로를 동시 실행하고 체크섬을 출력합니다.
async fn cmd_pipeline(urls: Vec<String>, file: Option<PathBuf>, workers: usize) -> Result<()> {
    ensure_config()?;

    let mut all_urls = urls;
    if let Some(ref path) = file {
        all_urls.extend(read_urls_file(path)?);
    }

    if all_urls.is_empty() {
        bail!("URL을 지정하거나 --file로 목록 파일을 전달해야 합니다");
    }

    println!("[*] {} 개 URL, {} 워커로 파이프라인 시작", all_urls.len(), workers);

    let embedder: Arc<dyn EmbeddingProvider> =
        Arc::new(OpenAiEmbedding::from_env().context("임베딩 클라이언트 생성 실패")?);
    let index: Arc<dyn VectorIndex> =
        Arc::new(PineconeIndex::from_env().context("인덱스 클라이언트 생성 실패")?);
    let chunker = default_chunker().context("청커 생성 실패")?;

    let activities = Arc::new(
        Activities::new(embedder, index, chunker).context("액티비티 초기화 실패")?,
    );

    let checksums = run_starter(&all_urls, workers, activities).await?;

    println!();
    println!("Output checksums:");
    for (url, checksum) in all_urls.iter().zip(&checksums) {
        println!("  {}  {}", checksum, url);
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status() -> Result<()> {
    println!("docs-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    // API 키 상태
    if has_api_key() {
        println!("[OK] OpenAI API 키: 설정됨");
    } else {
        println!("[!] OpenAI API 키: 미설정");
        println!("    설정: export OPENAI_API_KEY=your-key");
    }

    if has_index_config() {
        println!("[OK] Pinecone 설정: 완료");
    } else {
        println!("[!] Pinecone 설정: 미완성");
        println!("    필요: PINECONE_API_KEY, PINECONE_ENVIRONMENT, PINECONE_INDEX");
    }

    // 워커 파일시스템
    println!("[*] 워커 파일시스템: {}", demo_fs_root().display());

    // 인덱스 통계 (설정이 있을 때만)
    if has_index_config() {
        match PineconeIndex::from_env() {
            Ok(index) => match index.stats().await {
                Ok(stats) => {
                    println!(
                        "[OK] 인덱스 {}: {} 벡터 (차원: {})",
                        index.index_name(),
                        stats.vector_count,
                        stats.dimension
                    );
                }
                Err(e) => {
                    println!("[!] 인덱스 통계 조회 실패: {}", e);
                }
            },
            Err(e) => {
                tracing::debug!("인덱스 클라이언트 생성 실패: {}", e);
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 질문 임베딩 후 인덱스에서 컨텍스트 텍스트 조회
async fn retrieve_contexts(
    embedder: &OpenAiEmbedding,
    index: &PineconeIndex,
    query: &str,
    top_k: usize,
) -> Result<Vec<String>> {
    let embedding = embedder.embed(query).await.context("질문 임베딩 실패")?;
    let matches = index.query(&embedding, top_k).await.context("검색 실패")?;

    for (i, m) in matches.iter().enumerate() {
        let preview = m
            .metadata
            .as_ref()
            .map(|meta| truncate_text(&meta.text, 80))
            .unwrap_or_else(|| "-".to_string());
        tracing::info!("match {}: [score {:.4}] {}", i + 1, m.score, preview);
    }

    Ok(matches
        .into_iter()
        .filter_map(|m| m.metadata.map(|meta| meta.text))
        .collect())
}

/// 검색 증강용 클라이언트 쌍 생성 (--no-retrieval이면 생성하지 않음)
fn build_retrieval(no_retrieval: bool) -> Result<Option<(OpenAiEmbedding, PineconeIndex)>> {
    if no_retrieval {
        return Ok(None);
    }

    Ok(Some((
        OpenAiEmbedding::from_env().context("임베딩 클라이언트 생성 실패")?,
        PineconeIndex::from_env().context("인덱스 클라이언트 생성 실패")?,
    )))
}

/// 표준 입력에서 한 줄 읽기 (EOF면 None)
fn prompt_line(prompt: &str) -> Result<Option<String>> {
    print!("{}", prompt);
    std::io::stdout().flush().context("stdout flush 실패")?;

    read_line_from(&mut std::io::stdin().lock())
}

/// 리더에서 한 줄 읽기
///
/// 입력이 소진되면(0바이트 읽기) None을 반환합니다.
fn read_line_from(reader: &mut impl std::io::BufRead) -> Result<Option<String>> {
    let mut input = String::new();
    let n = reader.read_line(&mut input).context("stdin 읽기 실패")?;
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}

/// URL 목록 파일 읽기 (빈 줄/# 주석 제외)
fn read_urls_file(path: &std::path::Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("URL 파일 읽기 실패: {}", path.display()))?;

    Ok(content
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| l.to_string())
        .collect())
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_read_urls_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.txt");
        std::fs::write(
            &path,
            "https://www.gitpod.io/docs/introduction\n\
             \n\
             # comment line\n\
             https://www.gitpod.io/docs/configure/workspaces\n",
        )
        .unwrap();

        let urls = read_urls_file(&path).unwrap();
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0], "https://www.gitpod.io/docs/introduction");
    }

    #[test]
    fn test_read_urls_file_missing() {
        let result = read_urls_file(std::path::Path::new("/nonexistent/urls.txt"));
        assert!(result.is_err());
    }

    #[test]
    fn test_read_line_from() {
        let mut reader = std::io::Cursor::new("  hello world \n");
        assert_eq!(
            read_line_from(&mut reader).unwrap().unwrap(),
            "hello world"
        );
    }

    #[test]
    fn test_read_line_from_eof() {
        // 입력 소진 시 빈 문자열이 아니라 None (챗 루프 종료 신호)
        let mut reader = std::io::Cursor::new("");
        assert!(read_line_from(&mut reader).unwrap().is_none());

        let mut reader = std::io::Cursor::new("last line\n");
        assert!(read_line_from(&mut reader).unwrap().is_some());
        assert!(read_line_from(&mut reader).unwrap().is_none());
    }

    #[test]
    fn test_build_retrieval_skipped() {
        // 순수 챗 모드에서는 임베딩/인덱스 클라이언트를 만들지 않음
        assert!(build_retrieval(true).unwrap().is_none());
    }
}

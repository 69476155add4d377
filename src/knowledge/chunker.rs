//! Text Chunking Module
//!
//! 토큰 길이 기반 재귀 분할을 제공합니다.
//! 문단/줄/단어 경계를 순서대로 시도하면서 청크 크기를 맞춥니다.
//! 토큰 길이는 p50k_base 인코딩 기준입니다.

use std::collections::VecDeque;

use anyhow::{Context, Result};
use tiktoken_rs::CoreBPE;

/// 분할 구분자 우선순위 (문단 > 줄 > 단어 > 문자)
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (토큰 수)
    pub chunk_tokens: usize,
    /// 오버랩 크기 (토큰 수)
    pub overlap_tokens: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_tokens: 400,
            overlap_tokens: 20,
        }
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// TokenSplitter
// ============================================================================

/// 토큰 길이 기반 재귀 분할기
///
/// 가장 큰 구분자(문단)부터 시도하고, 조각이 여전히 크면
/// 다음 구분자로 내려갑니다. 작은 조각들은 오버랩을 유지하며
/// 청크 크기까지 병합됩니다.
pub struct TokenSplitter {
    config: ChunkConfig,
    bpe: CoreBPE,
}

impl TokenSplitter {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Result<Self> {
        let bpe = tiktoken_rs::p50k_base().context("Failed to load p50k_base tokenizer")?;
        Ok(Self { config, bpe })
    }

    /// 기본 설정으로 생성
    pub fn with_defaults() -> Result<Self> {
        Self::new(ChunkConfig::default())
    }

    /// 토큰 길이 계산 (특수 토큰 없이)
    fn token_len(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    /// 재귀 분할
    fn split_text(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (sep, remaining) = pick_separator(text, separators);
        let pieces = split_on(text, sep);

        let mut finals: Vec<String> = Vec::new();
        let mut goods: Vec<String> = Vec::new();

        for piece in pieces {
            if self.token_len(&piece) <= self.config.chunk_tokens {
                goods.push(piece);
            } else {
                // 쌓인 작은 조각들 먼저 병합
                if !goods.is_empty() {
                    finals.extend(self.merge_pieces(&goods, sep));
                    goods.clear();
                }
                // 큰 조각은 다음 구분자로 재귀
                if remaining.is_empty() {
                    finals.push(piece);
                } else {
                    finals.extend(self.split_text(&piece, remaining));
                }
            }
        }

        if !goods.is_empty() {
            finals.extend(self.merge_pieces(&goods, sep));
        }

        finals
    }

    /// 작은 조각들을 청크 크기까지 병합 (오버랩 유지)
    fn merge_pieces(&self, pieces: &[String], sep: &str) -> Vec<String> {
        let sep_len = self.token_len(sep);
        let mut chunks: Vec<String> = Vec::new();
        let mut window: VecDeque<(String, usize)> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = self.token_len(piece);

            if !window.is_empty() && total + len + sep_len > self.config.chunk_tokens {
                chunks.push(join_window(&window, sep));

                // 오버랩 크기까지 앞에서 제거
                while total > self.config.overlap_tokens
                    || (!window.is_empty() && total + len + sep_len > self.config.chunk_tokens)
                {
                    match window.pop_front() {
                        Some((_, popped)) => {
                            total = total.saturating_sub(popped + sep_len);
                        }
                        None => break,
                    }
                }
            }

            total += len + if window.is_empty() { 0 } else { sep_len };
            window.push_back((piece.clone(), len));
        }

        if !window.is_empty() {
            chunks.push(join_window(&window, sep));
        }

        chunks.retain(|c| !c.trim().is_empty());
        chunks
    }
}

impl Chunker for TokenSplitter {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        let mut chunks = self.split_text(text, &SEPARATORS);
        chunks.retain(|c| !c.trim().is_empty());
        chunks
    }

    fn name(&self) -> &'static str {
        "TokenSplitter"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트에 등장하는 첫 구분자 선택
///
/// # Returns
/// (선택된 구분자, 남은 하위 구분자들)
fn pick_separator<'a>(text: &str, separators: &'a [&'a str]) -> (&'a str, &'a [&'a str]) {
    for (i, sep) in separators.iter().enumerate() {
        if sep.is_empty() || text.contains(sep) {
            return (sep, &separators[i + 1..]);
        }
    }
    // 비어있지 않은 separators가 전제
    (separators[separators.len() - 1], &[])
}

/// 구분자로 분할 (빈 구분자는 문자 단위)
fn split_on(text: &str, sep: &str) -> Vec<String> {
    if sep.is_empty() {
        return text.chars().map(|c| c.to_string()).collect();
    }

    text.split(sep)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// 윈도우 내용을 구분자로 연결
fn join_window(window: &VecDeque<(String, usize)>, sep: &str) -> String {
    window
        .iter()
        .map(|(s, _)| s.as_str())
        .collect::<Vec<_>>()
        .join(sep)
        .trim()
        .to_string()
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Result<Box<dyn Chunker>> {
    Ok(Box::new(TokenSplitter::with_defaults()?))
}

/// 설정 지정 청커 생성
pub fn token_splitter(config: ChunkConfig) -> Result<Box<dyn Chunker>> {
    Ok(Box::new(TokenSplitter::new(config)?))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn small_splitter() -> TokenSplitter {
        TokenSplitter::new(ChunkConfig {
            chunk_tokens: 20,
            overlap_tokens: 4,
        })
        .unwrap()
    }

    #[test]
    fn test_chunker_empty() {
        let splitter = TokenSplitter::with_defaults().unwrap();
        assert!(splitter.chunk("").is_empty());
        assert!(splitter.chunk("   \n\n  ").is_empty());
    }

    #[test]
    fn test_chunker_small_text() {
        let splitter = TokenSplitter::with_defaults().unwrap();
        let chunks = splitter.chunk("Short paragraph about nothing much.");
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("Short paragraph"));
    }

    #[test]
    fn test_chunker_splits_paragraphs() {
        let splitter = small_splitter();

        let text = (0..10)
            .map(|i| format!("Paragraph number {} with several words inside it.", i))
            .collect::<Vec<_>>()
            .join("\n\n");

        let chunks = splitter.chunk(&text);
        assert!(chunks.len() > 1);

        // 각 청크가 제한 이하인지 확인
        for chunk in &chunks {
            assert!(splitter.token_len(chunk) <= 20, "chunk too big: {}", chunk);
        }
    }

    #[test]
    fn test_chunker_overlap() {
        let splitter = TokenSplitter::new(ChunkConfig {
            chunk_tokens: 10,
            overlap_tokens: 3,
        })
        .unwrap();

        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu nu xi";
        let chunks = splitter.chunk(text);
        assert!(chunks.len() > 1);

        // 인접 청크가 단어를 공유하는지 확인 (오버랩)
        let first_words: Vec<&str> = chunks[0].split_whitespace().collect();
        let second_words: Vec<&str> = chunks[1].split_whitespace().collect();
        let shared = first_words.iter().any(|w| second_words.contains(w));
        assert!(shared, "expected overlap between {:?} and {:?}", chunks[0], chunks[1]);
    }

    #[test]
    fn test_chunker_long_unbroken_word() {
        let splitter = small_splitter();

        // 구분자가 전혀 없는 긴 문자열도 분할되어야 함
        let text = "x".repeat(500);
        let chunks = splitter.chunk(&text);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(splitter.token_len(chunk) <= 20 + 4);
        }
    }

    #[test]
    fn test_pick_separator() {
        let seps = ["\n\n", "\n", " ", ""];
        let (sep, rest) = pick_separator("a\n\nb", &seps);
        assert_eq!(sep, "\n\n");
        assert_eq!(rest.len(), 3);

        let (sep, _) = pick_separator("a b", &seps);
        assert_eq!(sep, " ");

        let (sep, rest) = pick_separator("abc", &seps);
        assert_eq!(sep, "");
        assert!(rest.is_empty());
    }

    #[test]
    fn test_split_on() {
        assert_eq!(split_on("a\n\nb", "\n\n"), vec!["a", "b"]);
        assert_eq!(split_on("ab", ""), vec!["a", "b"]);
        // 빈 조각 제거
        assert_eq!(split_on("a\n\n\n\nb", "\n\n"), vec!["a", "b"]);
    }

    #[test]
    fn test_default_config() {
        let config = ChunkConfig::default();
        assert_eq!(config.chunk_tokens, 400);
        assert_eq!(config.overlap_tokens, 20);
    }

    #[test]
    fn test_chunker_name() {
        let splitter = TokenSplitter::with_defaults().unwrap();
        assert_eq!(splitter.name(), "TokenSplitter");
    }
}

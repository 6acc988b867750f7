//! Token counting, pluggable so the declared tokenizer identity in
//! configuration (`chunking.tokenizer`) is honored rather than hardwired.

use std::sync::Arc;
use tiktoken_rs::CoreBPE;

use crate::error::{RetrievalError, Result};

/// Counts and splits text into tokens for a declared tokenizer identity.
pub trait Tokenizer: Send + Sync {
    fn count(&self, text: &str) -> u32;

    /// The tail of `text` containing approximately `tokens` tokens, used to
    /// build chunk overlap without re-tokenizing the whole chunk twice.
    fn tail(&self, text: &str, tokens: u32) -> String;

    /// Splits `text` into consecutive windows of at most `max_tokens`
    /// tokens each. Used as the last-resort "token boundary" cut (§4.5 step
    /// 3) when no section, paragraph, or sentence boundary is available.
    fn split_into_token_windows(&self, text: &str, max_tokens: u32) -> Vec<String>;

    fn identity(&self) -> &str;
}

/// Wraps a `tiktoken-rs` BPE, matching `wg-ragsmith`'s default
/// `semantic-chunking-tiktoken` tokenizer choice.
pub struct TiktokenTokenizer {
    bpe: CoreBPE,
    identity: String,
}

impl TiktokenTokenizer {
    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|err| RetrievalError::internal("failed to load cl100k_base encoding").with_source(err.to_string()))?;
        Ok(Self {
            bpe,
            identity: "cl100k_base".into(),
        })
    }

    pub fn by_name(name: &str) -> Result<Self> {
        match name {
            "cl100k_base" => Self::cl100k(),
            other => Err(RetrievalError::config(format!("unknown tokenizer '{other}'"))),
        }
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn count(&self, text: &str) -> u32 {
        self.bpe.encode_ordinary(text).len() as u32
    }

    fn tail(&self, text: &str, tokens: u32) -> String {
        let encoded = self.bpe.encode_ordinary(text);
        if encoded.len() as u32 <= tokens {
            return text.to_string();
        }
        let start = encoded.len() - tokens as usize;
        self.bpe.decode(encoded[start..].to_vec()).unwrap_or_default()
    }

    fn split_into_token_windows(&self, text: &str, max_tokens: u32) -> Vec<String> {
        if max_tokens == 0 {
            return vec![text.to_string()];
        }
        let encoded = self.bpe.encode_ordinary(text);
        encoded
            .chunks(max_tokens as usize)
            .map(|window| self.bpe.decode(window.to_vec()).unwrap_or_default())
            .collect()
    }

    fn identity(&self) -> &str {
        &self.identity
    }
}

/// Shared handle, since the chunker and the embedder may both need to
/// count tokens against the same declared tokenizer.
pub type SharedTokenizer = Arc<dyn Tokenizer>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_are_positive_for_nonempty_text() {
        let tokenizer = TiktokenTokenizer::cl100k().unwrap();
        assert!(tokenizer.count("hello world") > 0);
    }

    #[test]
    fn tail_shorter_than_whole_text_for_long_input() {
        let tokenizer = TiktokenTokenizer::cl100k().unwrap();
        let text = "the quick brown fox jumps over the lazy dog ".repeat(50);
        let tail = tokenizer.tail(&text, 5);
        assert!(tail.len() < text.len());
    }

    #[test]
    fn token_windows_each_stay_under_limit() {
        let tokenizer = TiktokenTokenizer::cl100k().unwrap();
        let text = "the quick brown fox jumps over the lazy dog ".repeat(200);
        let windows = tokenizer.split_into_token_windows(&text, 20);
        assert!(windows.len() > 1);
        for window in &windows {
            assert!(tokenizer.count(window) <= 20);
        }
    }
}

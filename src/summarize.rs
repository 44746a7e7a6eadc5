//! Cluster summarization seam.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Sentence terminator followed by whitespace.
static SENTENCE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").expect("sentence break pattern is valid"));

/// Sentences at or below this length are too short to stand for a cluster.
const MIN_SENTENCE_CHARS: usize = 30;
const MAX_SENTENCES: usize = 2;
const FALLBACK_CHARS: usize = 150;

#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("Summarization failed: {0}\nSuggestion: Check the summarizer backend")]
    Failed(String),
}

/// Produces one summary string for a cluster's concatenated chunk texts.
///
/// `theme_hint` is a short label such as `"Cluster 3"`. Implementations must
/// be callable from several worker threads at once.
pub trait Summarizer: Send + Sync {
    fn summarize(&self, text: &str, theme_hint: &str) -> Result<String, SummaryError>;
}

/// Cheap extractive fallback: the first two substantial sentences.
#[derive(Debug, Clone, Default)]
pub struct ExtractiveSummarizer;

impl Summarizer for ExtractiveSummarizer {
    fn summarize(&self, text: &str, _theme_hint: &str) -> Result<String, SummaryError> {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");

        let picked: Vec<&str> = split_sentences(&collapsed)
            .into_iter()
            .filter(|s| s.chars().count() > MIN_SENTENCE_CHARS)
            .take(MAX_SENTENCES)
            .collect();
        if !picked.is_empty() {
            return Ok(picked.join(" "));
        }

        if collapsed.chars().count() > FALLBACK_CHARS {
            let head: String = collapsed.chars().take(FALLBACK_CHARS).collect();
            Ok(format!("{head}..."))
        } else {
            Ok(collapsed)
        }
    }
}

/// Split after `.`, `!` or `?` followed by whitespace, keeping the terminator.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut last = 0;
    for m in SENTENCE_BREAK.find_iter(text) {
        let end = m.start() + 1;
        let sentence = text[last..end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        last = m.end();
    }
    let tail = text[last..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

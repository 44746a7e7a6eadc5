//! Keyword retrieval: tokenization, synonym expansion and BM25 scoring.

mod index;
pub mod tokenize;

pub use index::{KeywordError, KeywordIndex};
pub use tokenize::{STOP_WORDS, expand_query, tokenize};

//! Hybrid retrieval: vector, cluster-summary and BM25 signals fused by RRF.

pub mod fusion;
mod hybrid;

pub use fusion::{RRF_K, reciprocal_rank_fusion};
pub use hybrid::{HybridSearchEngine, SearchError, SearchResultSet};

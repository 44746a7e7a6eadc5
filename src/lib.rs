/// The main library module for docsift
pub mod chunking;
pub mod config;
pub mod display;
pub mod error;
pub mod extract;
pub mod handle;
pub mod indexing;
pub mod keyword;
pub mod logging;
pub mod search;
pub mod storage;
pub mod summarize;
pub mod types;
pub mod vector;

// Explicit exports for better API clarity
pub use chunking::Chunker;
pub use config::Settings;
pub use error::{IndexError, IndexResult};
pub use extract::{PlainTextExtractor, TextExtractor};
pub use handle::{ClusterLayer, IndexHandle, LiveIndex};
pub use indexing::{BuildOutcome, BuildStats, IndexBuilder, ProgressReporter, calculate_hash};
pub use search::{HybridSearchEngine, SearchError};
pub use storage::{IndexPersistence, MetadataStore, StorageError, StorageResult};
pub use summarize::{ExtractiveSummarizer, Summarizer};
pub use types::{ChunkPosition, ClusterPosition, SearchResult};
pub use vector::{EmbeddingProvider, HashingEmbedder};

//! Error types for the retrieval engine
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages. Component errors live next
//! to their components and convert into [`IndexError`] at the pipeline edge.

use crate::extract::ExtractError;
use crate::indexing::BuildStage;
use crate::keyword::KeywordError;
use crate::storage::StorageError;
use crate::summarize::SummaryError;
use crate::vector::{ClusteringError, VectorError, VectorStorageError};
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for indexing operations
#[derive(Error, Debug)]
pub enum IndexError {
    /// File system errors
    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    /// Embedding errors abort the build: a missing batch would shift every later vector
    #[error(
        "Embedding batch {batch} failed: {cause}\nSuggestion: Check the embedding provider and re-run indexing"
    )]
    EmbeddingBatch { batch: usize, cause: String },

    #[error("Embedding failed: {0}")]
    Embedding(#[from] VectorError),

    #[error("Clustering failed: {0}")]
    Clustering(#[from] ClusteringError),

    #[error("Summarization failed: {0}")]
    Summarization(#[from] SummaryError),

    #[error("Keyword index failed: {0}")]
    Keyword(#[from] KeywordError),

    #[error("Metadata store failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Vector storage failed: {0}")]
    VectorStorage(#[from] VectorStorageError),

    /// Storage errors
    #[error("Failed to persist index to '{path}': {source}")]
    PersistenceError {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to load index from '{path}': {source}")]
    LoadError {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration errors
    #[error("Invalid configuration: {reason}")]
    ConfigError { reason: String },

    /// Corrupted index error
    #[error("Index appears to be corrupted: {reason}")]
    IndexCorrupted { reason: String },

    /// A pipeline stage failed; the metadata store was rolled back
    #[error("Indexing failed during {stage}: {source}")]
    StageFailed {
        stage: BuildStage,
        source: Box<IndexError>,
    },

    /// General errors for cases where we need to preserve existing behavior
    #[error("{0}")]
    General(String),
}

impl IndexError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::FileRead { .. } => "FILE_READ_ERROR",
            Self::FileWrite { .. } => "FILE_WRITE_ERROR",
            Self::Extraction(_) => "EXTRACTION_ERROR",
            Self::EmbeddingBatch { .. } => "EMBEDDING_BATCH_FAILED",
            Self::Embedding(_) => "EMBEDDING_ERROR",
            Self::Clustering(_) => "CLUSTERING_ERROR",
            Self::Summarization(_) => "SUMMARIZATION_ERROR",
            Self::Keyword(_) => "KEYWORD_INDEX_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::VectorStorage(_) => "VECTOR_STORAGE_ERROR",
            Self::PersistenceError { .. } => "PERSISTENCE_ERROR",
            Self::LoadError { .. } => "LOAD_ERROR",
            Self::ConfigError { .. } => "CONFIG_ERROR",
            Self::IndexCorrupted { .. } => "INDEX_CORRUPTED",
            Self::StageFailed { source, .. } => return source.status_code(),
            Self::General(_) => "GENERAL_ERROR",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::StageFailed { source, .. } => {
                let mut suggestions = vec!["The previous index is still live and unchanged"];
                suggestions.extend(source.recovery_suggestions());
                suggestions
            }
            Self::EmbeddingBatch { .. } | Self::Embedding(_) => vec![
                "Verify the embedding provider is reachable and returns vectors of one dimension",
                "Try lowering 'indexing.embedding_batch_size' in settings.toml",
            ],
            Self::Storage(StorageError::RangeCollision { .. }) => vec![
                "Chunk ranges overlap in the metadata store",
                "Run 'docsift index' again to rebuild the file table from scratch",
            ],
            Self::Storage(_) => vec![
                "Check that the database file is writable and not locked by another process",
            ],
            Self::IndexCorrupted { .. } => vec![
                "Run 'docsift index' to rebuild from scratch",
                "Check for disk errors or filesystem corruption",
            ],
            Self::LoadError { .. } | Self::PersistenceError { .. } => vec![
                "Check disk space and permissions in the index directory",
                "Run 'docsift index' if you continue to have issues",
            ],
            Self::FileRead { .. } => vec![
                "Check that the file exists and you have read permissions",
                "Ensure the file is not locked by another process",
            ],
            Self::ConfigError { .. } => {
                vec!["Run 'docsift config' to inspect the effective settings"]
            }
            _ => vec![],
        }
    }
}

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T, IndexError>;

    /// Add context with a path
    fn with_path(self, path: &std::path::Path) -> Result<T, IndexError>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, msg: &str) -> Result<T, IndexError> {
        self.map_err(|e| IndexError::General(format!("{msg}: {e}")))
    }

    fn with_path(self, path: &std::path::Path) -> Result<T, IndexError> {
        self.map_err(|e| {
            IndexError::General(format!("Error processing '{}': {}", path.display(), e))
        })
    }
}

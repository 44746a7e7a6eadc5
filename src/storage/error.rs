use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(
        "Chunk range {start}..={end} of '{path}' overlaps '{other}'\nSuggestion: Re-index from scratch so every file gets a fresh range"
    )]
    RangeCollision {
        path: PathBuf,
        start: u32,
        end: u32,
        other: PathBuf,
    },

    #[error("Invalid chunk range for '{path}': {reason}")]
    InvalidRange { path: PathBuf, reason: String },

    #[error(
        "Requested {requested} positions, above the limit of {max}\nSuggestion: Split the lookup into batches of at most {max}"
    )]
    TooManyPositions { requested: usize, max: usize },

    #[error("Stored value for {field} is out of range: {value}")]
    InvalidColumn { field: &'static str, value: i64 },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("General error: {0}")]
    General(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

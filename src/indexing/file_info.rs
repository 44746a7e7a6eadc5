//! File information gathered during discovery and extraction

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Filesystem facts about a discovered file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Path to the file
    pub path: PathBuf,
    /// Size on disk in bytes
    pub size_bytes: u64,
    /// Last modification time (UTC seconds since UNIX_EPOCH)
    pub modified_utc: i64,
}

impl FileInfo {
    /// Stat a file, returning `None` if it vanished or is unreadable
    pub fn from_path(path: &Path) -> Option<Self> {
        let metadata = std::fs::metadata(path).ok()?;
        let modified_utc = metadata
            .modified()
            .ok()
            .map(|t| DateTime::<Utc>::from(t).timestamp())
            .unwrap_or_default();
        Some(Self {
            path: path.to_path_buf(),
            size_bytes: metadata.len(),
            modified_utc,
        })
    }
}

/// Calculate SHA256 hash of content
pub fn calculate_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Get current UTC timestamp in seconds since UNIX_EPOCH
pub fn get_utc_timestamp() -> i64 {
    Utc::now().timestamp()
}

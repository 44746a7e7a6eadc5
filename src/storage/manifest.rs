//! Manifest describing a persisted index.

use crate::{IndexError, IndexResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Version of the on-disk artifact layout.
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// Metadata about a built index, written next to its artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Version of the index format
    pub version: u32,

    pub chunk_count: u32,

    pub cluster_count: u32,

    pub file_count: u32,

    /// Embedding dimension shared by both vector indices
    pub dimension: u32,

    /// Embedding provider the vectors came from
    #[serde(default)]
    pub model_id: String,

    /// Build completion time, UTC seconds
    pub created_at: i64,

    /// Roots that were indexed (canonicalized where possible)
    #[serde(default)]
    pub roots: Vec<PathBuf>,
}

impl Default for IndexManifest {
    fn default() -> Self {
        Self {
            version: INDEX_FORMAT_VERSION,
            chunk_count: 0,
            cluster_count: 0,
            file_count: 0,
            dimension: 0,
            model_id: String::new(),
            created_at: crate::indexing::get_utc_timestamp(),
            roots: Vec::new(),
        }
    }
}

impl IndexManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update counts and stamp the current time
    pub fn update_counts(&mut self, chunk_count: u32, cluster_count: u32, file_count: u32) {
        self.chunk_count = chunk_count;
        self.cluster_count = cluster_count;
        self.file_count = file_count;
        self.created_at = crate::indexing::get_utc_timestamp();
    }

    /// Save the manifest as pretty JSON at `path`
    pub fn save(&self, path: &Path) -> IndexResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| IndexError::General(format!("Failed to serialize manifest: {e}")))?;

        fs::write(path, json).map_err(|e| IndexError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load a manifest written by [`IndexManifest::save`]
    pub fn load(path: &Path) -> IndexResult<Self> {
        let json = fs::read_to_string(path).map_err(|e| IndexError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let manifest: Self = serde_json::from_str(&json).map_err(|e| IndexError::LoadError {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;

        if manifest.version != INDEX_FORMAT_VERSION {
            return Err(IndexError::IndexCorrupted {
                reason: format!(
                    "manifest version {} is not supported (expected {INDEX_FORMAT_VERSION})",
                    manifest.version
                ),
            });
        }
        Ok(manifest)
    }

    /// Human-readable summary for the CLI
    pub fn describe(&self) -> String {
        let built = chrono::DateTime::from_timestamp(self.created_at, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| self.created_at.to_string());
        format!(
            "Index v{} built {built}: {} chunks from {} files, {} clusters ({}-dim, {})",
            self.version,
            self.chunk_count,
            self.file_count,
            self.cluster_count,
            self.dimension,
            if self.model_id.is_empty() {
                "unknown model"
            } else {
                &self.model_id
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corpus.meta.json");
        let mut manifest = IndexManifest {
            dimension: 384,
            model_id: "hashing-384".to_string(),
            roots: vec![PathBuf::from("/docs")],
            ..IndexManifest::default()
        };
        manifest.update_counts(12, 2, 3);
        manifest.save(&path).unwrap();

        let loaded = IndexManifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
        assert!(loaded.describe().contains("12 chunks from 3 files"));
    }

    #[test]
    fn test_unsupported_version_is_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.json");
        let manifest = IndexManifest {
            version: 99,
            ..IndexManifest::default()
        };
        manifest.save(&path).unwrap();
        assert!(matches!(
            IndexManifest::load(&path),
            Err(IndexError::IndexCorrupted { .. })
        ));
    }
}

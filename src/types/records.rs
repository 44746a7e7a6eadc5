//! Typed records crossing the store and engine boundaries.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{ChunkPosition, ClusterPosition};
use crate::indexing::calculate_hash;

/// A bounded slice of a document's text, the unit of indexing and retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source_path: PathBuf,
    pub position: ChunkPosition,
    /// Static tags derived from the source file (extension, parent folder).
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Chunk {
    pub fn new(text: String, source_path: PathBuf, position: ChunkPosition) -> Self {
        let tags = static_tags(&source_path);
        Self {
            text,
            source_path,
            position,
            tags,
        }
    }
}

fn static_tags(path: &Path) -> Vec<String> {
    let mut tags = Vec::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        tags.push(ext.to_lowercase());
    }
    if let Some(folder) = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
    {
        tags.push(folder.to_string());
    }
    tags
}

/// A file row ready for insertion; the store assigns `id` and `indexed_time`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFileRecord {
    pub path: PathBuf,
    pub filename: String,
    pub extension: String,
    pub size_bytes: u64,
    pub modified_time: i64,
    pub chunk_count: u32,
    pub start: ChunkPosition,
    pub end: ChunkPosition,
}

impl NewFileRecord {
    /// Builds a record for `chunk_count` chunks starting at `start`.
    ///
    /// Returns `None` for zero chunks; such files never get a row.
    pub fn for_chunks(
        path: &Path,
        size_bytes: u64,
        modified_time: i64,
        start: ChunkPosition,
        chunk_count: u32,
    ) -> Option<Self> {
        if chunk_count == 0 {
            return None;
        }
        Some(Self {
            path: path.to_path_buf(),
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            extension: path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default(),
            size_bytes,
            modified_time,
            chunk_count,
            start,
            end: ChunkPosition::new(start.get() + chunk_count - 1),
        })
    }

    pub fn contains(&self, position: ChunkPosition) -> bool {
        self.start <= position && position <= self.end
    }

    pub fn overlaps(&self, start: ChunkPosition, end: ChunkPosition) -> bool {
        self.start <= end && start <= self.end
    }
}

/// A persisted file row mapping a source file to its inclusive chunk range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub id: i64,
    pub path: PathBuf,
    pub filename: String,
    pub extension: String,
    pub size_bytes: u64,
    pub modified_time: i64,
    pub indexed_time: i64,
    pub chunk_count: u32,
    pub start: ChunkPosition,
    pub end: ChunkPosition,
}

impl FileRecord {
    pub fn contains(&self, position: ChunkPosition) -> bool {
        self.start <= position && position <= self.end
    }
}

/// A row of the clusters table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterRow {
    pub id: ClusterPosition,
    pub summary: String,
    pub level: u32,
    pub created_at: i64,
}

/// A cluster of chunks with its generated summary.
///
/// `id` is the row of the summary in the cluster vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterPosition,
    pub summary: String,
    pub level: u32,
    pub member_positions: BTreeSet<ChunkPosition>,
}

/// Which retrieval signal surfaced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SignalSource {
    Semantic,
    Keyword,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "Semantic",
            Self::Keyword => "Keyword",
        }
    }
}

impl std::fmt::Display for SignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-query fusion state for one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCandidate {
    pub position: ChunkPosition,
    pub vector_distance: Option<f32>,
    pub keyword_score: Option<f32>,
    pub fused_score: f32,
    pub sources: BTreeSet<SignalSource>,
}

impl SearchCandidate {
    pub fn new(position: ChunkPosition) -> Self {
        Self {
            position,
            vector_distance: None,
            keyword_score: None,
            fused_score: 0.0,
            sources: BTreeSet::new(),
        }
    }
}

/// One ranked hit returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub document: String,
    pub file_path: PathBuf,
    pub file_name: String,
    pub position: ChunkPosition,
    pub tags: Vec<String>,
    pub score: f32,
}

/// Key of the response cache: hashes of the normalized query and context plus model identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub query_hash: String,
    pub context_hash: String,
    pub model_id: String,
    pub response_type: String,
}

impl CacheKey {
    /// Hashes the trimmed lower-cased query and the whitespace-collapsed context.
    pub fn new(query: &str, context: &str, model_id: &str, response_type: &str) -> Self {
        let (query_hash, context_hash) = compute_cache_hashes(query, context);
        Self {
            query_hash,
            context_hash,
            model_id: model_id.to_string(),
            response_type: response_type.to_string(),
        }
    }
}

/// Returns `(query_hash, context_hash)` for the response cache.
pub fn compute_cache_hashes(query: &str, context: &str) -> (String, String) {
    let query_norm = query.trim().to_lowercase();
    let context_norm = context.split_whitespace().collect::<Vec<_>>().join(" ");
    (calculate_hash(&query_norm), calculate_hash(&context_norm))
}

/// A memoized generation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseCacheEntry {
    pub key: CacheKey,
    pub response_text: String,
    pub hit_count: u64,
    pub created_at: i64,
    pub last_accessed: i64,
}

/// Aggregate counters over the response cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: u64,
    pub total_hits: u64,
    pub by_type: Vec<(String, u64)>,
}

/// A logged query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHistoryEntry {
    pub query: String,
    pub result_count: u32,
    pub execution_time_ms: u64,
    pub timestamp: i64,
}

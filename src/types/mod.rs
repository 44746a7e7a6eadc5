//! Core value types shared by the index builder, the stores and the search engine.
//!
//! Positions are newtypes so a cluster row can never be passed where a chunk
//! row is expected. Both are zero-based, like tantivy segment ordinals.

mod records;

pub use records::{
    CacheKey, CacheStats, Chunk, Cluster, ClusterRow, FileRecord, NewFileRecord,
    ResponseCacheEntry, SearchCandidate, SearchHistoryEntry, SearchResult, SignalSource,
    compute_cache_hashes,
};

use serde::{Deserialize, Serialize};

/// Slot of a chunk in the chunk vector index.
///
/// The same integer addresses the keyword index document and falls inside
/// exactly one [`FileRecord`] range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkPosition(u32);

impl ChunkPosition {
    /// Creates a new `ChunkPosition`.
    #[must_use]
    pub const fn new(position: u32) -> Self {
        Self(position)
    }

    /// Returns the underlying u32 value.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Returns the position as a row index.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }

    /// Converts a row index, failing if it does not fit in u32.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        u32::try_from(index).ok().map(Self)
    }

    /// Returns the next position.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for ChunkPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Slot of a cluster summary in the cluster-summary vector index.
///
/// Equal to the cluster id, so a summary hit maps straight back to its row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterPosition(u32);

impl ClusterPosition {
    /// Creates a new `ClusterPosition`.
    #[must_use]
    pub const fn new(position: u32) -> Self {
        Self(position)
    }

    /// Returns the underlying u32 value.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Returns the position as a row index.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }

    /// Converts a row index, failing if it does not fit in u32.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        u32::try_from(index).ok().map(Self)
    }
}

impl std::fmt::Display for ClusterPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_position_roundtrip() {
        let pos = ChunkPosition::new(7);
        assert_eq!(pos.get(), 7);
        assert_eq!(pos.index(), 7);
        assert_eq!(pos.next().get(), 8);
        assert_eq!(ChunkPosition::from_index(7), Some(pos));
    }

    #[test]
    fn test_from_index_overflow() {
        assert!(ChunkPosition::from_index(u32::MAX as usize + 1).is_none());
        assert!(ClusterPosition::from_index(u32::MAX as usize + 1).is_none());
    }

    #[test]
    fn test_position_ordering() {
        assert!(ChunkPosition::new(1) < ChunkPosition::new(2));
        assert!(ClusterPosition::new(0) < ClusterPosition::new(3));
    }

    #[test]
    fn test_serde_is_transparent() {
        let json = serde_json::to_string(&ChunkPosition::new(42)).unwrap();
        assert_eq!(json, "42");
        let back: ClusterPosition = serde_json::from_str("3").unwrap();
        assert_eq!(back, ClusterPosition::new(3));
    }
}

//! The live index and the slot that publishes it to searchers.
//!
//! A [`LiveIndex`] is immutable once built. Rebuilding produces a new one
//! which replaces the old in [`IndexHandle`] with a single pointer swap;
//! searches that already hold a snapshot finish against the old index.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::keyword::KeywordIndex;
use crate::storage::IndexManifest;
use crate::types::{Chunk, ChunkPosition, Cluster, ClusterPosition};
use crate::vector::FlatVectorIndex;
use crate::{IndexError, IndexResult};

/// Cluster summaries with their vectors; row `i` is cluster `i`.
#[derive(Debug, Clone)]
pub struct ClusterLayer {
    vectors: FlatVectorIndex,
    clusters: Vec<Cluster>,
}

impl ClusterLayer {
    /// Pair summary vectors with their clusters, checking ids match rows.
    pub fn new(vectors: FlatVectorIndex, clusters: Vec<Cluster>) -> IndexResult<Self> {
        if vectors.len() != clusters.len() {
            return Err(IndexError::IndexCorrupted {
                reason: format!(
                    "{} summary vectors for {} clusters",
                    vectors.len(),
                    clusters.len()
                ),
            });
        }
        if let Some((row, cluster)) = clusters
            .iter()
            .enumerate()
            .find(|(row, c)| c.id.index() != *row)
        {
            return Err(IndexError::IndexCorrupted {
                reason: format!("cluster {} stored at row {row}", cluster.id),
            });
        }
        Ok(Self { vectors, clusters })
    }

    pub fn vectors(&self) -> &FlatVectorIndex {
        &self.vectors
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn get(&self, id: ClusterPosition) -> Option<&Cluster> {
        self.clusters.get(id.index())
    }

    pub fn members(&self, id: ClusterPosition) -> Option<&BTreeSet<ChunkPosition>> {
        self.get(id).map(|c| &c.member_positions)
    }

    /// Cluster id to member positions, as persisted.
    pub fn membership(&self) -> BTreeMap<ClusterPosition, BTreeSet<ChunkPosition>> {
        self.clusters
            .iter()
            .map(|c| (c.id, c.member_positions.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

/// Everything a search needs, addressed by [`ChunkPosition`].
#[derive(Debug)]
pub struct LiveIndex {
    pub chunks: Vec<Chunk>,
    pub vectors: FlatVectorIndex,
    pub clusters: Option<ClusterLayer>,
    pub keyword: Option<KeywordIndex>,
    pub manifest: IndexManifest,
}

impl LiveIndex {
    /// Assemble an index, checking that chunk `i` sits at position `i`
    /// and has vector row `i`.
    pub fn new(
        chunks: Vec<Chunk>,
        vectors: FlatVectorIndex,
        clusters: Option<ClusterLayer>,
        keyword: Option<KeywordIndex>,
        manifest: IndexManifest,
    ) -> IndexResult<Self> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::IndexCorrupted {
                reason: format!("{} chunks but {} vectors", chunks.len(), vectors.len()),
            });
        }
        if let Some((row, chunk)) = chunks
            .iter()
            .enumerate()
            .find(|(row, c)| c.position.index() != *row)
        {
            return Err(IndexError::IndexCorrupted {
                reason: format!("chunk {} stored at row {row}", chunk.position),
            });
        }
        if let Some(keyword) = &keyword {
            check_keyword_len(keyword, chunks.len())?;
        }
        Ok(Self {
            chunks,
            vectors,
            clusters,
            keyword,
            manifest,
        })
    }

    /// Attach a keyword index opened after the other parts were assembled.
    pub fn attach_keyword(&mut self, keyword: KeywordIndex) -> IndexResult<()> {
        check_keyword_len(&keyword, self.chunks.len())?;
        self.keyword = Some(keyword);
        Ok(())
    }

    pub fn chunk(&self, position: ChunkPosition) -> Option<&Chunk> {
        self.chunks.get(position.index())
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

fn check_keyword_len(keyword: &KeywordIndex, chunks: usize) -> IndexResult<()> {
    if keyword.len() != chunks {
        return Err(IndexError::IndexCorrupted {
            reason: format!(
                "keyword index has {} documents for {chunks} chunks",
                keyword.len()
            ),
        });
    }
    Ok(())
}

/// Shared slot holding the index searches run against.
#[derive(Debug, Default)]
pub struct IndexHandle {
    current: RwLock<Option<Arc<LiveIndex>>>,
}

impl IndexHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_index(index: LiveIndex) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(index))),
        }
    }

    /// The current index, if any. Holds the lock only to clone the `Arc`.
    pub fn snapshot(&self) -> Option<Arc<LiveIndex>> {
        self.current.read().clone()
    }

    /// Publish `index`, returning the one it replaced.
    pub fn swap(&self, index: LiveIndex) -> Option<Arc<LiveIndex>> {
        let next = Arc::new(index);
        std::mem::replace(&mut *self.current.write(), Some(next))
    }

    pub fn clear(&self) -> Option<Arc<LiveIndex>> {
        self.current.write().take()
    }

    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::VectorDimension;
    use std::path::PathBuf;

    fn tiny_index(texts: &[&str]) -> LiveIndex {
        let dim = VectorDimension::new(2).unwrap();
        let chunks: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| {
                Chunk::new(
                    t.to_string(),
                    PathBuf::from("/d/a.txt"),
                    ChunkPosition::new(i as u32),
                )
            })
            .collect();
        let rows: Vec<Vec<f32>> = (0..texts.len()).map(|i| vec![i as f32, 0.0]).collect();
        let vectors = FlatVectorIndex::from_rows(dim, &rows).unwrap();
        LiveIndex::new(chunks, vectors, None, None, IndexManifest::default()).unwrap()
    }

    #[test]
    fn test_swap_keeps_old_snapshot_alive() {
        let handle = IndexHandle::new();
        assert!(handle.snapshot().is_none());

        assert!(handle.swap(tiny_index(&["one"])).is_none());
        let before = handle.snapshot().unwrap();

        let replaced = handle.swap(tiny_index(&["one", "two"])).unwrap();
        assert!(Arc::ptr_eq(&before, &replaced));
        assert_eq!(before.len(), 1);
        assert_eq!(handle.snapshot().unwrap().len(), 2);

        handle.clear();
        assert!(!handle.is_loaded());
    }

    #[test]
    fn test_live_index_rejects_misaligned_parts() {
        let dim = VectorDimension::new(2).unwrap();
        let chunk = Chunk::new("x".into(), PathBuf::from("/a"), ChunkPosition::new(1));
        let vectors = FlatVectorIndex::from_rows(dim, &[vec![0.0, 0.0]]).unwrap();
        assert!(matches!(
            LiveIndex::new(vec![chunk], vectors, None, None, IndexManifest::default()),
            Err(IndexError::IndexCorrupted { .. })
        ));

        let empty = FlatVectorIndex::new(dim);
        assert!(LiveIndex::new(vec![], empty.clone(), None, None, IndexManifest::default()).is_ok());
        assert!(ClusterLayer::new(empty, vec![Cluster {
            id: ClusterPosition::new(0),
            summary: "s".into(),
            level: 1,
            member_positions: BTreeSet::new(),
        }])
        .is_err());
    }

    #[test]
    fn test_attach_keyword_checks_document_count() {
        let mut index = tiny_index(&["red planet", "gas giant"]);
        let short = KeywordIndex::build_in_ram(&index.chunks[..1]).unwrap();
        assert!(index.attach_keyword(short).is_err());
        assert!(index.keyword.is_none());

        let full = KeywordIndex::build_in_ram(&index.chunks).unwrap();
        index.attach_keyword(full).unwrap();
        assert_eq!(index.keyword.as_ref().unwrap().len(), 2);
    }
}

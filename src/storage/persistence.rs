//! On-disk layout of a built index.
//!
//! All artifacts share one base path. A save stages every artifact under a
//! `.tmp` sibling first and only then renames them over the old ones, so a
//! failed save leaves the previous index loadable.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::handle::{ClusterLayer, LiveIndex};
use crate::keyword::KeywordIndex;
use crate::storage::IndexManifest;
use crate::types::{Chunk, ChunkPosition, Cluster, ClusterPosition};
use crate::vector::FlatVectorIndex;
use crate::{IndexError, IndexResult};

const CHUNK_VECTORS: &str = ".vec";
const SUMMARY_VECTORS: &str = "_summary.vec";
const DOCS: &str = "_docs.bin";
const SUMMARIES: &str = "_summaries.bin";
const CLUSTER_MAP: &str = "_cluster_map.bin";
const KEYWORD_DIR: &str = "_bm25";
const MANIFEST: &str = ".meta.json";

/// Persisted cluster row, without its members.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClusterSummaryRow {
    id: ClusterPosition,
    summary: String,
    level: u32,
}

/// Manages persistence of the index
#[derive(Debug, Clone)]
pub struct IndexPersistence {
    base_path: PathBuf,
}

impl IndexPersistence {
    /// Create a new persistence manager for artifacts named after `base_path`
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn artifact(&self, suffix: &str) -> PathBuf {
        with_suffix(&self.base_path, suffix)
    }

    pub fn chunk_vectors_path(&self) -> PathBuf {
        self.artifact(CHUNK_VECTORS)
    }

    pub fn docs_path(&self) -> PathBuf {
        self.artifact(DOCS)
    }

    pub fn summary_vectors_path(&self) -> PathBuf {
        self.artifact(SUMMARY_VECTORS)
    }

    pub fn summaries_path(&self) -> PathBuf {
        self.artifact(SUMMARIES)
    }

    pub fn cluster_map_path(&self) -> PathBuf {
        self.artifact(CLUSTER_MAP)
    }

    pub fn keyword_dir(&self) -> PathBuf {
        self.artifact(KEYWORD_DIR)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.artifact(MANIFEST)
    }

    /// True when the required artifacts (chunk vectors and docs) are present
    pub fn exists(&self) -> bool {
        self.chunk_vectors_path().exists() && self.docs_path().exists()
    }

    /// Save every artifact of `index`, stamping `roots` into the manifest.
    ///
    /// Either every artifact is replaced or none is.
    #[must_use = "Save errors should be handled to ensure data is persisted"]
    pub fn save(&self, index: &LiveIndex, roots: &[PathBuf]) -> IndexResult<()> {
        let mut save = self.begin_save()?;
        save.stage(index, roots)?;
        save.commit()
    }

    /// Start a save. Artifacts are staged under `.tmp` names and only
    /// moved into place by [`SaveTransaction::commit`].
    pub fn begin_save(&self) -> IndexResult<SaveTransaction<'_>> {
        if let Some(parent) = self.base_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| IndexError::FileWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        // Left behind by an interrupted save
        remove_path(&staging_path(&self.keyword_dir()))?;

        Ok(SaveTransaction {
            persistence: self,
            staged: Vec::new(),
            removed: Vec::new(),
        })
    }

    /// Load a saved index. Cluster and keyword artifacts are optional
    pub fn load(&self) -> IndexResult<LiveIndex> {
        let vectors_path = self.chunk_vectors_path();
        let vectors = FlatVectorIndex::load(&vectors_path).map_err(|e| IndexError::LoadError {
            path: vectors_path,
            source: Box::new(e),
        })?;
        let chunks: Vec<Chunk> = read_bincode(&self.docs_path())?;

        let manifest = match IndexManifest::load(&self.manifest_path()) {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::warn!("manifest unavailable, using defaults: {e}");
                IndexManifest {
                    chunk_count: u32::try_from(chunks.len()).unwrap_or(u32::MAX),
                    dimension: u32::try_from(vectors.dimension().get()).unwrap_or(u32::MAX),
                    ..IndexManifest::default()
                }
            }
        };

        let clusters = match self.load_cluster_layer() {
            Ok(layer) => layer,
            Err(e) => {
                tracing::warn!("cluster artifacts skipped: {e}");
                None
            }
        };

        let keyword = match self.load_keyword(chunks.len()) {
            Ok(keyword) => keyword,
            Err(e) => {
                tracing::warn!("keyword index skipped: {e}");
                None
            }
        };

        LiveIndex::new(chunks, vectors, clusters, keyword, manifest)
    }

    fn load_cluster_layer(&self) -> IndexResult<Option<ClusterLayer>> {
        let paths = [
            self.summary_vectors_path(),
            self.summaries_path(),
            self.cluster_map_path(),
        ];
        if let Some(missing) = paths.iter().find(|p| !p.exists()) {
            tracing::warn!(
                "missing {}, cluster expansion disabled",
                missing.display()
            );
            return Ok(None);
        }

        let vectors = FlatVectorIndex::load(&paths[0]).map_err(|e| IndexError::LoadError {
            path: paths[0].clone(),
            source: Box::new(e),
        })?;
        let rows: Vec<ClusterSummaryRow> = read_bincode(&paths[1])?;
        let mut membership: BTreeMap<ClusterPosition, BTreeSet<ChunkPosition>> =
            read_bincode(&paths[2])?;

        let clusters = rows
            .into_iter()
            .map(|row| Cluster {
                member_positions: membership.remove(&row.id).unwrap_or_default(),
                id: row.id,
                summary: row.summary,
                level: row.level,
            })
            .collect();
        ClusterLayer::new(vectors, clusters).map(Some)
    }

    fn load_keyword(&self, expected: usize) -> IndexResult<Option<KeywordIndex>> {
        let dir = self.keyword_dir();
        if !dir.exists() {
            tracing::warn!("missing {}, keyword search disabled", dir.display());
            return Ok(None);
        }
        let keyword = KeywordIndex::open(&dir).map_err(|e| IndexError::LoadError {
            path: dir.clone(),
            source: Box::new(e),
        })?;
        if keyword.len() != expected {
            return Err(IndexError::IndexCorrupted {
                reason: format!(
                    "keyword index has {} documents for {expected} chunks",
                    keyword.len()
                ),
            });
        }
        Ok(Some(keyword))
    }

    /// Remove every artifact. Missing ones are ignored
    pub fn clear(&self) -> IndexResult<()> {
        for path in [
            self.chunk_vectors_path(),
            self.docs_path(),
            self.summary_vectors_path(),
            self.summaries_path(),
            self.cluster_map_path(),
            self.manifest_path(),
        ] {
            remove_file_if_exists(&path)?;
        }
        remove_dir_if_exists(&self.keyword_dir())
    }
}

/// A save in progress. Dropping it without [`commit`](Self::commit) removes
/// everything staged and leaves the previous artifacts in place.
#[derive(Debug)]
pub struct SaveTransaction<'a> {
    persistence: &'a IndexPersistence,
    /// `(staged, final)` pairs in the order they are moved into place
    staged: Vec<(PathBuf, PathBuf)>,
    /// Final paths with no counterpart in the new index
    removed: Vec<PathBuf>,
}

impl SaveTransaction<'_> {
    /// Directory to build the keyword index in. Once it holds an index,
    /// [`stage`](Self::stage) moves it as is instead of building another.
    pub fn keyword_dir(&self) -> PathBuf {
        staging_path(&self.persistence.keyword_dir())
    }

    /// Write every artifact of `index` under its staging name.
    pub fn stage(&mut self, index: &LiveIndex, roots: &[PathBuf]) -> IndexResult<()> {
        let paths = self.persistence;

        self.stage_file(&paths.chunk_vectors_path(), |tmp| {
            index.vectors.save(tmp).map_err(boxed)
        })?;
        self.stage_file(&paths.docs_path(), |tmp| write_bincode(tmp, &index.chunks))?;

        match &index.clusters {
            Some(layer) => {
                let rows: Vec<ClusterSummaryRow> = layer
                    .clusters()
                    .iter()
                    .map(|c| ClusterSummaryRow {
                        id: c.id,
                        summary: c.summary.clone(),
                        level: c.level,
                    })
                    .collect();
                self.stage_file(&paths.summary_vectors_path(), |tmp| {
                    layer.vectors().save(tmp).map_err(boxed)
                })?;
                self.stage_file(&paths.summaries_path(), |tmp| write_bincode(tmp, &rows))?;
                self.stage_file(&paths.cluster_map_path(), |tmp| {
                    write_bincode(tmp, &layer.membership())
                })?;
            }
            None => self.removed.extend([
                paths.summary_vectors_path(),
                paths.summaries_path(),
                paths.cluster_map_path(),
            ]),
        }

        let keyword_tmp = self.keyword_dir();
        if keyword_tmp.is_dir() {
            self.staged.push((keyword_tmp, paths.keyword_dir()));
        } else if index.keyword.is_some() {
            self.staged.push((keyword_tmp.clone(), paths.keyword_dir()));
            KeywordIndex::build_in_dir(&keyword_tmp, &index.chunks).map_err(|e| {
                IndexError::PersistenceError {
                    path: keyword_tmp.clone(),
                    source: Box::new(e),
                }
            })?;
        } else {
            self.removed.push(paths.keyword_dir());
        }

        let mut manifest = index.manifest.clone();
        manifest.roots = roots.to_vec();
        self.stage_file(&paths.manifest_path(), |tmp| manifest.save(tmp).map_err(boxed))
    }

    fn stage_file<F>(&mut self, path: &Path, write: F) -> IndexResult<()>
    where
        F: FnOnce(&Path) -> Result<(), BoxedError>,
    {
        let tmp = staging_path(path);
        self.staged.push((tmp.clone(), path.to_path_buf()));
        write(&tmp).map_err(|source| IndexError::PersistenceError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Move the staged artifacts into place.
    ///
    /// Current artifacts are first renamed to `.old` backups. If any move
    /// fails the backups are restored before the error is returned.
    pub fn commit(self) -> IndexResult<()> {
        let mut backups: Vec<(PathBuf, PathBuf)> = Vec::new();
        let mut placed: Vec<PathBuf> = Vec::new();

        if let Err(e) = self.swap_in(&mut backups, &mut placed) {
            for path in placed.iter().rev() {
                let _ = remove_path(path);
            }
            for (backup, path) in backups.iter().rev() {
                if let Err(restore) = std::fs::rename(backup, path) {
                    tracing::error!("failed to restore {}: {restore}", path.display());
                }
            }
            return Err(e);
        }

        for (backup, _) in &backups {
            if let Err(e) = remove_path(backup) {
                tracing::warn!("stale backup left at {}: {e}", backup.display());
            }
        }
        tracing::info!(
            "saved index artifacts to {}",
            self.persistence.base_path.display()
        );
        Ok(())
    }

    fn swap_in(
        &self,
        backups: &mut Vec<(PathBuf, PathBuf)>,
        placed: &mut Vec<PathBuf>,
    ) -> IndexResult<()> {
        let finals = self.staged.iter().map(|(_, path)| path).chain(&self.removed);
        for path in finals {
            if std::fs::symlink_metadata(path).is_ok() {
                let backup = backup_path(path);
                remove_path(&backup)?;
                rename(path, &backup)?;
                backups.push((backup, path.clone()));
            }
        }
        for (tmp, path) in &self.staged {
            rename(tmp, path)?;
            placed.push(path.clone());
        }
        Ok(())
    }
}

impl Drop for SaveTransaction<'_> {
    fn drop(&mut self) {
        for (tmp, _) in &self.staged {
            if let Err(e) = remove_path(tmp) {
                tracing::warn!("failed to remove staged {}: {e}", tmp.display());
            }
        }
    }
}

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

fn boxed<E: std::error::Error + Send + Sync + 'static>(e: E) -> BoxedError {
    Box::new(e)
}

fn staging_path(path: &Path) -> PathBuf {
    with_suffix(path, ".tmp")
}

fn backup_path(path: &Path) -> PathBuf {
    with_suffix(path, ".old")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn write_bincode<T: Serialize>(path: &Path, value: &T) -> Result<(), BoxedError> {
    let bytes = bincode::serde::encode_to_vec(value, bincode::config::standard())?;
    std::fs::write(path, bytes)?;
    Ok(())
}

fn read_bincode<T: DeserializeOwned>(path: &Path) -> IndexResult<T> {
    let bytes = std::fs::read(path).map_err(|e| IndexError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let (value, _) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
        .map_err(|e| IndexError::LoadError {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
    Ok(value)
}

fn rename(from: &Path, to: &Path) -> IndexResult<()> {
    std::fs::rename(from, to).map_err(|e| IndexError::FileWrite {
        path: to.to_path_buf(),
        source: e,
    })
}

fn remove_file_if_exists(path: &Path) -> IndexResult<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(IndexError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        }),
        _ => Ok(()),
    }
}

fn remove_dir_if_exists(path: &Path) -> IndexResult<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(IndexError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        }),
        _ => Ok(()),
    }
}

/// Remove a file or a directory tree. Missing paths are ignored
fn remove_path(path: &Path) -> IndexResult<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => remove_dir_if_exists(path),
        Ok(_) => remove_file_if_exists(path),
        Err(_) => Ok(()),
    }
}

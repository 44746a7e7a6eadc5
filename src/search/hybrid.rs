//! Hybrid search over a live index.
//!
//! Three signals run concurrently against one [`LiveIndex`] snapshot: the
//! chunk vector index, the cluster-summary index (expanded to member
//! chunks) and BM25. Semantic and keyword lists are fused with RRF, boosted
//! for proper-noun matches, then filtered to one hit per file and per text
//! prefix.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use super::fusion::{
    apply_identity_boost, merge_cluster_members, proper_nouns, rank, reciprocal_rank_fusion,
    select_distinct,
};
use crate::config::{SearchConfig, Settings};
use crate::handle::LiveIndex;
use crate::keyword::KeywordError;
use crate::storage::MetadataStore;
use crate::types::{ChunkPosition, ClusterPosition, FileRecord, SearchCandidate, SearchResult};
use crate::vector::{EmbeddingProvider, VectorError};

#[derive(Error, Debug)]
pub enum SearchError {
    #[error(
        "Query embedding failed: {0}\nSuggestion: Re-run 'docsift index' if the embedding settings changed"
    )]
    Embedding(#[from] VectorError),

    #[error("Keyword search failed: {0}")]
    Keyword(#[from] KeywordError),
}

pub type SearchResultSet = Result<Vec<SearchResult>, SearchError>;

/// Runs hybrid queries against one index snapshot.
pub struct HybridSearchEngine {
    index: Arc<LiveIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Option<Arc<MetadataStore>>,
    config: SearchConfig,
}

impl std::fmt::Debug for HybridSearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridSearchEngine")
            .field("chunks", &self.index.len())
            .field("has_store", &self.store.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl HybridSearchEngine {
    /// Without a `store`, results carry the chunk's own source path.
    pub fn new(
        index: Arc<LiveIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Option<Arc<MetadataStore>>,
        settings: &Settings,
    ) -> Self {
        Self {
            index,
            embedder,
            store,
            config: settings.search.clone(),
        }
    }

    pub fn index(&self) -> &Arc<LiveIndex> {
        &self.index
    }

    /// Search with `search.default_top_k`.
    pub fn search_default(&self, query: &str) -> SearchResultSet {
        self.search(query, self.config.default_top_k)
    }

    pub fn search(&self, query: &str, top_k: usize) -> SearchResultSet {
        let started = Instant::now();
        if query.trim().is_empty() || top_k == 0 || self.index.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed_query(query)?;
        self.index.vectors.dimension().validate_vector(&query_vector)?;

        let ((vector_hits, cluster_members), keyword_hits) = rayon::join(
            || {
                rayon::join(
                    || self.vector_hits(&query_vector),
                    || self.cluster_members(&query_vector),
                )
            },
            || self.keyword_hits(query),
        );
        let semantic = merge_cluster_members(
            vector_hits?,
            cluster_members?,
            self.config.cluster_placeholder_distance,
        );
        let keyword = keyword_hits?;
        tracing::debug!(
            "{} semantic and {} keyword candidates for '{query}'",
            semantic.len(),
            keyword.len()
        );

        let mut candidates = reciprocal_rank_fusion(&semantic, &keyword, self.config.rrf_k);
        apply_identity_boost(
            &mut candidates,
            &self.index.chunks,
            &proper_nouns(query),
            self.config.identity_boost,
        );
        rank(&mut candidates);
        let selected = select_distinct(
            candidates,
            &self.index.chunks,
            top_k,
            self.config.dedup_prefix_chars,
        );

        let results = self.resolve(selected);
        self.record(query, results.len(), started.elapsed());
        Ok(results)
    }

    fn vector_hits(&self, query: &[f32]) -> Result<Vec<(ChunkPosition, f32)>, VectorError> {
        let hits = self.index.vectors.search(query, self.config.vector_candidates)?;
        Ok(hits
            .into_iter()
            .filter_map(|(row, distance)| ChunkPosition::from_index(row).map(|p| (p, distance)))
            .collect())
    }

    /// Members of the nearest cluster summaries, nearest cluster first.
    fn cluster_members(&self, query: &[f32]) -> Result<Vec<ChunkPosition>, VectorError> {
        let Some(layer) = &self.index.clusters else {
            return Ok(Vec::new());
        };
        let hits = layer.vectors().search(query, self.config.summary_candidates)?;
        Ok(hits
            .into_iter()
            .filter_map(|(row, _)| ClusterPosition::from_index(row))
            .filter_map(|id| layer.members(id))
            .flat_map(|members| members.iter().copied())
            .collect())
    }

    fn keyword_hits(&self, query: &str) -> Result<Vec<(ChunkPosition, f32)>, KeywordError> {
        match &self.index.keyword {
            Some(keyword) => keyword.search(query, self.config.keyword_candidates),
            None => Ok(Vec::new()),
        }
    }

    /// Attach file paths, names and tags to the selected candidates.
    fn resolve(&self, selected: Vec<SearchCandidate>) -> Vec<SearchResult> {
        let records = self.lookup_files(&selected);

        selected
            .into_iter()
            .filter_map(|candidate| {
                let chunk = self.index.chunk(candidate.position)?;
                let record = records.get(&candidate.position);
                let (file_path, file_name) = match record {
                    Some(record) => (record.path.clone(), record.filename.clone()),
                    None => (
                        chunk.source_path.clone(),
                        chunk
                            .source_path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                    ),
                };
                let tags = candidate
                    .sources
                    .iter()
                    .map(|s| s.as_str().to_string())
                    .chain(chunk.tags.iter().cloned())
                    .collect();
                Some(SearchResult {
                    document: chunk.text.clone(),
                    file_path,
                    file_name,
                    position: candidate.position,
                    tags,
                    score: candidate.fused_score,
                })
            })
            .collect()
    }

    /// File records for the candidates, in batches of the store's lookup bound.
    fn lookup_files(&self, selected: &[SearchCandidate]) -> HashMap<ChunkPosition, FileRecord> {
        let mut found = HashMap::new();
        let Some(store) = &self.store else {
            tracing::warn!("no metadata store, using chunk source paths");
            return found;
        };

        let positions: Vec<ChunkPosition> = selected.iter().map(|c| c.position).collect();
        for batch in positions.chunks(store.max_position_lookup().max(1)) {
            match store.get_files_by_positions(batch) {
                Ok(records) => {
                    found.extend(
                        records
                            .into_iter()
                            .filter_map(|(position, record)| record.map(|r| (position, r))),
                    );
                }
                Err(e) => {
                    tracing::warn!("file lookup failed, using chunk source paths: {e}");
                }
            }
        }
        found
    }

    fn record(&self, query: &str, result_count: usize, elapsed: Duration) {
        if !self.config.record_history {
            return;
        }
        let Some(store) = &self.store else {
            return;
        };
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let count = u32::try_from(result_count).unwrap_or(u32::MAX);
        if let Err(e) = store.add_search_history(query, count, elapsed_ms) {
            tracing::warn!("failed to record search history: {e}");
        }
    }
}

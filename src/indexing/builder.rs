//! Index build pipeline.
//!
//! Stages run in a fixed order: discovery, extraction, chunking, embedding,
//! keyword indexing, clustering, summarization, finalization. File records
//! and cluster rows are written inside one rebuild transaction that commits
//! only after every artifact is persisted, so a failed build leaves the
//! previous metadata and artifacts in place. The keyword index is built
//! once, straight into the staged save.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::unbounded;
use rayon::prelude::*;

use super::{BuildStage, BuildStats, FileInfo, FileWalker, ProgressReporter};
use crate::chunking::Chunker;
use crate::config::Settings;
use crate::extract::{ExtractError, TextExtractor};
use crate::handle::{ClusterLayer, LiveIndex};
use crate::keyword::KeywordIndex;
use crate::storage::{IndexManifest, IndexPersistence, MetadataStore, RebuildTransaction};
use crate::summarize::{Summarizer, SummaryError};
use crate::types::{Chunk, ChunkPosition, Cluster, NewFileRecord};
use crate::vector::{EmbeddingProvider, FlatVectorIndex, cluster, validate_batch};
use crate::{IndexError, IndexResult};

/// Result of a build that did not fail.
#[derive(Debug)]
pub enum BuildOutcome {
    /// No indexable files, or none produced a chunk. Nothing was changed.
    Empty,
    Built { index: LiveIndex, stats: BuildStats },
}

impl BuildOutcome {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Extracted text of one file, in discovery order.
struct ExtractedDocument {
    path: PathBuf,
    text: String,
    info: Option<FileInfo>,
}

type ExtractionSlot = Option<Result<Option<String>, ExtractError>>;

/// Builds a complete [`LiveIndex`] from document roots.
pub struct IndexBuilder {
    settings: Arc<Settings>,
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn EmbeddingProvider>,
    summarizer: Arc<dyn Summarizer>,
    store: Arc<MetadataStore>,
    chunker: Chunker,
    persistence: IndexPersistence,
}

impl std::fmt::Debug for IndexBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexBuilder")
            .field("chunker", &self.chunker)
            .field("index_path", &self.persistence.base_path())
            .finish_non_exhaustive()
    }
}

impl IndexBuilder {
    pub fn new(
        settings: Arc<Settings>,
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<dyn EmbeddingProvider>,
        summarizer: Arc<dyn Summarizer>,
        store: Arc<MetadataStore>,
    ) -> IndexResult<Self> {
        let chunker = Chunker::from_config(&settings.chunking).map_err(|e| {
            IndexError::ConfigError {
                reason: e.to_string(),
            }
        })?;
        let persistence = IndexPersistence::new(settings.index_path.clone());
        Ok(Self {
            settings,
            extractor,
            embedder,
            summarizer,
            store,
            chunker,
            persistence,
        })
    }

    pub fn persistence(&self) -> &IndexPersistence {
        &self.persistence
    }

    /// Run every stage over `roots`.
    ///
    /// On error the rebuild transaction is rolled back, nothing new is
    /// renamed into place and the failure is reported through `progress`.
    pub fn build(
        &self,
        roots: &[PathBuf],
        progress: &ProgressReporter,
    ) -> IndexResult<BuildOutcome> {
        let mut stats = BuildStats::new();
        let roots: Vec<PathBuf> = roots
            .iter()
            .map(|root| root.canonicalize().unwrap_or_else(|_| root.clone()))
            .collect();

        tracing::info!("discovering files under {} root(s)", roots.len());
        progress.report(0, Some("Discovering files"));
        let files = FileWalker::new(&self.settings.indexing).discover(&roots);
        stats.files_discovered = files.len();
        if files.is_empty() {
            return Ok(empty_outcome(progress));
        }

        tracing::info!("extracting text from {} files", files.len());
        let documents = self.extract_all(&files, progress, &mut stats)?;

        progress.report(22, Some("Chunking documents"));
        let (chunks, records) = self
            .chunk_documents(&documents)
            .map_err(|e| stage_failed(progress, BuildStage::Chunking, e))?;
        drop(documents);
        if chunks.is_empty() {
            return Ok(empty_outcome(progress));
        }
        stats.files_indexed = records.len();
        stats.chunk_count = chunks.len();
        tracing::info!(
            "{} chunks from {} files",
            chunks.len(),
            records.len()
        );

        let mut rebuild = self
            .store
            .begin_rebuild()
            .map_err(|e| stage_failed(progress, BuildStage::Chunking, e))?;
        rebuild
            .replace_files(&records)
            .map_err(|e| stage_failed(progress, BuildStage::Chunking, e))?;

        let embeddings = self
            .embed_chunks(&chunks, progress)
            .map_err(|e| stage_failed(progress, BuildStage::Embedding, e))?;

        tracing::info!("building keyword index");
        progress.report(66, Some("Building keyword index"));
        // Built once, in the save's staging dir, and moved into place on commit
        let mut save = self
            .persistence
            .begin_save()
            .map_err(|e| stage_failed(progress, BuildStage::KeywordIndexing, e))?;
        let keyword = KeywordIndex::build_in_dir(&save.keyword_dir(), &chunks)
            .map_err(|e| stage_failed(progress, BuildStage::KeywordIndexing, e))?;
        tracing::debug!("keyword index holds {} documents", keyword.len());
        drop(keyword);

        tracing::info!("clustering {} vectors", embeddings.len());
        progress.report(70, Some("Clustering chunks"));
        let membership = cluster(
            &embeddings,
            self.settings.clustering.target_cluster_size,
            self.settings.clustering.seed,
        )
        .map_err(|e| stage_failed(progress, BuildStage::Clustering, e))?;

        let clusters = self
            .summarize_clusters(&chunks, membership, &mut rebuild, progress)
            .map_err(|e| stage_failed(progress, BuildStage::Summarization, e))?;
        stats.cluster_count = clusters.len();

        tracing::info!("finalizing index");
        progress.report(97, Some("Finalizing index"));
        let mut index = self
            .assemble(chunks, embeddings, clusters, records.len(), &roots)
            .map_err(|e| stage_failed(progress, BuildStage::Finalization, e))?;
        save.stage(&index, &roots)
            .map_err(|e| stage_failed(progress, BuildStage::Finalization, e))?;
        save.commit()
            .map_err(|e| stage_failed(progress, BuildStage::Finalization, e))?;
        rebuild
            .commit()
            .map_err(|e| stage_failed(progress, BuildStage::Finalization, e))?;

        let keyword_dir = self.persistence.keyword_dir();
        if let Err(e) = KeywordIndex::open(&keyword_dir)
            .map_err(IndexError::from)
            .and_then(|keyword| index.attach_keyword(keyword))
        {
            tracing::warn!(
                "keyword index at {} unavailable, keyword search disabled: {e}",
                keyword_dir.display()
            );
        }

        stats.stop_timing();
        tracing::info!(
            "index built: {} chunks, {} clusters in {:.2}s",
            stats.chunk_count,
            stats.cluster_count,
            stats.elapsed.as_secs_f64()
        );
        progress.report(100, Some("Indexing complete"));
        Ok(BuildOutcome::Built { index, stats })
    }

    /// Extract every file on a rayon pool; results come back in discovery order.
    fn extract_all(
        &self,
        files: &[PathBuf],
        progress: &ProgressReporter,
        stats: &mut BuildStats,
    ) -> IndexResult<Vec<ExtractedDocument>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.indexing.extraction_threads.max(1))
            .thread_name(|i| format!("docsift-extract-{i}"))
            .build()
            .map_err(|e| IndexError::General(format!("Failed to start extraction pool: {e}")))?;

        let total = files.len();
        let extractor: &dyn TextExtractor = self.extractor.as_ref();
        let mut slots: Vec<ExtractionSlot> = (0..total).map(|_| None).collect();
        let (result_tx, result_rx) = unbounded();

        std::thread::scope(|s| {
            let pool = &pool;
            s.spawn(move || {
                pool.install(|| {
                    files
                        .par_iter()
                        .enumerate()
                        .for_each_with(result_tx, |tx, (i, path)| {
                            let _ = tx.send((i, extractor.extract(path)));
                        });
                });
            });

            for (done, (i, result)) in result_rx.iter().enumerate() {
                slots[i] = Some(result);
                progress.report_range(0, 20, done + 1, total, Some("Extracting text"));
            }
        });

        let mut documents = Vec::with_capacity(total);
        for (path, slot) in files.iter().zip(slots) {
            match slot {
                Some(Ok(Some(text))) => documents.push(ExtractedDocument {
                    path: path.clone(),
                    info: FileInfo::from_path(path),
                    text,
                }),
                Some(Ok(None)) => {
                    tracing::warn!("skipping {}: no extractable text", path.display());
                    stats.add_error(path.clone(), "no extractable text".to_string());
                }
                Some(Err(e)) => {
                    tracing::warn!("skipping {}: {e}", path.display());
                    stats.add_error(path.clone(), e.to_string());
                }
                None => {
                    stats.add_error(path.clone(), "extraction did not complete".to_string());
                }
            }
        }
        Ok(documents)
    }

    /// Split documents and hand each one a contiguous block of positions.
    fn chunk_documents(
        &self,
        documents: &[ExtractedDocument],
    ) -> IndexResult<(Vec<Chunk>, Vec<NewFileRecord>)> {
        let overflow = || IndexError::General("Corpus exceeds the chunk position range".to_string());

        let mut chunks = Vec::new();
        let mut records = Vec::with_capacity(documents.len());
        for document in documents {
            let pieces = self.chunker.split(&document.text);
            let start = ChunkPosition::from_index(chunks.len()).ok_or_else(overflow)?;
            let count = u32::try_from(pieces.len()).map_err(|_| overflow())?;
            if count > 0 && start.get().checked_add(count - 1).is_none() {
                return Err(overflow());
            }

            let (size_bytes, modified_time) = document
                .info
                .as_ref()
                .map_or((document.text.len() as u64, 0), |info| {
                    (info.size_bytes, info.modified_utc)
                });
            let Some(record) =
                NewFileRecord::for_chunks(&document.path, size_bytes, modified_time, start, count)
            else {
                tracing::debug!("{} produced no chunks", document.path.display());
                continue;
            };

            for (offset, text) in pieces.into_iter().enumerate() {
                let position = ChunkPosition::new(start.get() + offset as u32);
                chunks.push(Chunk::new(text, document.path.clone(), position));
            }
            records.push(record);
        }
        Ok((chunks, records))
    }

    /// Embed chunk texts in batches on scoped workers, reassembled in batch order.
    fn embed_chunks(
        &self,
        chunks: &[Chunk],
        progress: &ProgressReporter,
    ) -> IndexResult<Vec<Vec<f32>>> {
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let batch_size = self.settings.indexing.embedding_batch_size.max(1);
        let batches: Vec<&[&str]> = texts.chunks(batch_size).collect();
        let total = batches.len();
        let workers = self.settings.indexing.embedding_workers.clamp(1, total.max(1));

        tracing::info!(
            "embedding {} chunks in {total} batches on {workers} workers",
            texts.len()
        );
        progress.report(25, Some("Embedding chunks"));

        let (job_tx, job_rx) = unbounded::<(usize, &[&str])>();
        for job in batches.iter().copied().enumerate() {
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        let (result_tx, result_rx) = unbounded();
        let cancelled = AtomicBool::new(false);
        let mut slots: Vec<Option<Vec<Vec<f32>>>> = vec![None; total];
        let mut failure: Option<(usize, String)> = None;

        std::thread::scope(|s| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let cancelled = &cancelled;
                s.spawn(move || {
                    for (batch, texts) in job_rx.iter() {
                        if cancelled.load(Ordering::Relaxed) {
                            break;
                        }
                        let result = self.embed_batch(batch, texts);
                        if result_tx.send((batch, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(result_tx);

            let mut done = 0;
            for (batch, result) in result_rx.iter() {
                match result {
                    Ok(vectors) => {
                        slots[batch] = Some(vectors);
                        done += 1;
                        progress.report_range(25, 65, done, total, Some("Embedding chunks"));
                    }
                    Err(cause) => {
                        cancelled.store(true, Ordering::Relaxed);
                        failure = Some((batch, cause));
                        break;
                    }
                }
            }
        });

        if let Some((batch, cause)) = failure {
            return Err(IndexError::EmbeddingBatch { batch, cause });
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for (batch, slot) in slots.into_iter().enumerate() {
            let vectors = slot.ok_or_else(|| IndexError::EmbeddingBatch {
                batch,
                cause: "batch produced no result".to_string(),
            })?;
            embeddings.extend(vectors);
        }
        Ok(embeddings)
    }

    /// One batch with bounded retries. Every attempt is shape-checked.
    fn embed_batch(&self, batch: usize, texts: &[&str]) -> Result<Vec<Vec<f32>>, String> {
        let attempts = self.settings.indexing.embedding_retries + 1;
        let dimension = self.embedder.dimension();
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let result = self.embedder.embed_documents(texts).and_then(|vectors| {
                validate_batch(dimension, texts.len(), &vectors)?;
                Ok(vectors)
            });
            match result {
                Ok(vectors) => {
                    tracing::debug!("embedded batch {batch} ({} texts)", texts.len());
                    return Ok(vectors);
                }
                Err(e) => {
                    tracing::warn!(
                        "embedding batch {batch} attempt {attempt}/{attempts} failed: {e}"
                    );
                    last_error = e.to_string();
                }
            }
        }
        Err(last_error)
    }

    /// Summarize clusters on scoped workers and record each summary as it arrives.
    fn summarize_clusters(
        &self,
        chunks: &[Chunk],
        membership: BTreeMap<usize, BTreeSet<ChunkPosition>>,
        rebuild: &mut RebuildTransaction<'_>,
        progress: &ProgressReporter,
    ) -> IndexResult<Vec<Cluster>> {
        let total = membership.len();
        let workers = self.settings.indexing.summary_workers.clamp(1, total.max(1));
        let level = self.settings.clustering.summary_level;

        tracing::info!("summarizing {total} clusters on {workers} workers");
        progress.report(75, Some("Summarizing clusters"));

        let (job_tx, job_rx) = unbounded::<(usize, BTreeSet<ChunkPosition>)>();
        for job in membership {
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        let (result_tx, result_rx) =
            unbounded::<(usize, BTreeSet<ChunkPosition>, Result<String, SummaryError>)>();
        let cancelled = AtomicBool::new(false);
        let mut clusters = Vec::with_capacity(total);
        let mut failure: Option<IndexError> = None;

        std::thread::scope(|s| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let cancelled = &cancelled;
                s.spawn(move || {
                    for (id, members) in job_rx.iter() {
                        if cancelled.load(Ordering::Relaxed) {
                            break;
                        }
                        let text = members
                            .iter()
                            .filter_map(|position| chunks.get(position.index()))
                            .map(|chunk| chunk.text.as_str())
                            .collect::<Vec<_>>()
                            .join("\n\n");
                        let summary = self.summarizer.summarize(&text, &format!("Cluster {id}"));
                        if result_tx.send((id, members, summary)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(result_tx);

            let mut done = 0;
            for (id, members, summary) in result_rx.iter() {
                done += 1;
                progress.report_range(75, 95, done, total, Some("Summarizing clusters"));
                match summary {
                    Ok(summary) if !summary.trim().is_empty() => {
                        match rebuild.add_cluster(&summary, level) {
                            Ok(position) => clusters.push(Cluster {
                                id: position,
                                summary,
                                level,
                                member_positions: members,
                            }),
                            Err(e) => {
                                cancelled.store(true, Ordering::Relaxed);
                                failure = Some(e.into());
                                break;
                            }
                        }
                    }
                    Ok(_) => {
                        tracing::warn!("cluster {id} produced an empty summary, skipping");
                    }
                    Err(e) => {
                        tracing::warn!("cluster {id} summary failed, skipping: {e}");
                    }
                }
            }
        });

        match failure {
            Some(e) => Err(e),
            None => Ok(clusters),
        }
    }

    /// Embed summaries and put the finished index together.
    fn assemble(
        &self,
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
        clusters: Vec<Cluster>,
        file_count: usize,
        roots: &[PathBuf],
    ) -> IndexResult<LiveIndex> {
        let dimension = self.embedder.dimension();
        let vectors = FlatVectorIndex::from_rows(dimension, &embeddings)?;
        drop(embeddings);

        let cluster_count = clusters.len();
        let cluster_layer = if clusters.is_empty() {
            None
        } else {
            let summaries: Vec<&str> = clusters.iter().map(|c| c.summary.as_str()).collect();
            let batch_size = self.settings.indexing.embedding_batch_size.max(1);
            let mut rows = Vec::with_capacity(summaries.len());
            for (batch, texts) in summaries.chunks(batch_size).enumerate() {
                let vectors = self
                    .embed_batch(batch, texts)
                    .map_err(|cause| IndexError::EmbeddingBatch { batch, cause })?;
                rows.extend(vectors);
            }
            let summary_vectors = FlatVectorIndex::from_rows(dimension, &rows)?;
            Some(ClusterLayer::new(summary_vectors, clusters)?)
        };

        let mut manifest = IndexManifest::new();
        manifest.update_counts(chunks.len() as u32, cluster_count as u32, file_count as u32);
        manifest.dimension = dimension.get() as u32;
        manifest.model_id = self.settings.embedding.model_id.clone();
        manifest.roots = roots.to_vec();

        LiveIndex::new(chunks, vectors, cluster_layer, None, manifest)
    }
}

fn empty_outcome(progress: &ProgressReporter) -> BuildOutcome {
    tracing::info!("no indexable files found");
    progress.report(100, Some("No indexable files found"));
    BuildOutcome::Empty
}

/// Wrap a stage error and announce it on the progress channel.
fn stage_failed(
    progress: &ProgressReporter,
    stage: BuildStage,
    error: impl Into<IndexError>,
) -> IndexError {
    let error = IndexError::StageFailed {
        stage,
        source: Box::new(error.into()),
    };
    tracing::error!("{error}");
    progress.message(&error.to_string());
    error
}

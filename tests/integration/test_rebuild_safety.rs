//! Failed rebuilds must leave the previous index and metadata serving

use crate::common::{TestCorpus, create_engine, default_builder, embedder};
use docsift::indexing::BuildStage;
use docsift::vector::{EmbeddingProvider, VectorDimension, VectorError};
use docsift::{
    BuildOutcome, ExtractiveSummarizer, IndexBuilder, IndexError, IndexHandle,
    IndexPersistence, MetadataStore, PlainTextExtractor, ProgressReporter, Settings,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Fails the first `failures` calls, then delegates to the hashing embedder.
struct FlakyEmbedder {
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyEmbedder {
    fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }
}

impl EmbeddingProvider for FlakyEmbedder {
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(VectorError::EmbeddingFailed("timeout".to_string()));
        }
        embedder().embed_documents(texts)
    }

    fn dimension(&self) -> VectorDimension {
        embedder().dimension()
    }
}

/// Returns one vector fewer than requested.
struct ShortBatchEmbedder;

impl EmbeddingProvider for ShortBatchEmbedder {
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        let mut vectors = embedder().embed_documents(texts)?;
        vectors.pop();
        Ok(vectors)
    }

    fn dimension(&self) -> VectorDimension {
        embedder().dimension()
    }
}

fn builder_with(
    settings: Arc<Settings>,
    store: Arc<MetadataStore>,
    provider: Arc<dyn EmbeddingProvider>,
) -> IndexBuilder {
    IndexBuilder::new(
        settings,
        Arc::new(PlainTextExtractor::default()),
        provider,
        Arc::new(ExtractiveSummarizer),
        store,
    )
    .unwrap()
}

fn corpus() -> TestCorpus {
    let corpus = TestCorpus::new();
    corpus.add_file("ocean.txt", "The Pacific Ocean is the deepest ocean on Earth.");
    corpus.add_file("desert.txt", "The Sahara is a hot desert covering North Africa.");
    corpus
}

#[test]
fn test_failed_rebuild_keeps_live_index_and_metadata() {
    let corpus = corpus();
    let settings = Arc::new(corpus.settings());
    let store = Arc::new(MetadataStore::from_config(&settings.storage).unwrap());

    let outcome = default_builder(settings.clone(), store.clone())
        .build(&[corpus.docs()], &ProgressReporter::silent())
        .unwrap();
    let BuildOutcome::Built { index, .. } = outcome else {
        panic!("expected a built index");
    };
    let handle = IndexHandle::with_index(index);
    let files_before = store.get_all_files().unwrap();

    corpus.add_file("forest.txt", "The Amazon rainforest produces a large share of oxygen.");
    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = messages.clone();
    let progress = ProgressReporter::new(move |_, _, message| {
        if let Some(message) = message {
            sink.lock().push(message.to_string());
        }
    });

    let err = builder_with(
        settings.clone(),
        store.clone(),
        Arc::new(FlakyEmbedder::new(usize::MAX)),
    )
    .build(&[corpus.docs()], &progress)
    .unwrap_err();

    assert!(matches!(
        err,
        IndexError::StageFailed {
            stage: BuildStage::Embedding,
            ..
        }
    ));
    let last = messages.lock().last().cloned().unwrap();
    assert!(last.contains("embedding"), "unexpected message: {last}");
    assert!(last.contains("timeout"));

    assert_eq!(store.get_all_files().unwrap(), files_before);
    let reloaded = IndexPersistence::new(settings.index_path.clone())
        .load()
        .unwrap();
    assert_eq!(reloaded.manifest.file_count, 2);

    let snapshot = handle.snapshot().unwrap();
    assert_eq!(snapshot.manifest.file_count, 2);
    let results = create_engine(reloaded, Some(store), &settings)
        .search("deepest ocean", 1)
        .unwrap();
    assert_eq!(results[0].file_name, "ocean.txt");
}

#[test]
fn test_transient_embedding_failure_is_retried() {
    let corpus = corpus();
    let mut settings = corpus.settings();
    settings.indexing.embedding_workers = 1;
    settings.indexing.embedding_retries = 2;
    let settings = Arc::new(settings);
    let store = Arc::new(MetadataStore::open_in_memory().unwrap());
    let provider = Arc::new(FlakyEmbedder::new(2));

    let outcome = builder_with(settings, store.clone(), provider.clone())
        .build(&[corpus.docs()], &ProgressReporter::silent())
        .unwrap();

    assert!(!outcome.is_empty());
    assert!(provider.calls.load(Ordering::SeqCst) > 2);
    assert_eq!(store.get_all_files().unwrap().len(), 2);
}

#[test]
fn test_short_embedding_batch_is_fatal() {
    let corpus = corpus();
    let settings = Arc::new(corpus.settings());
    let store = Arc::new(MetadataStore::open_in_memory().unwrap());

    let err = builder_with(settings.clone(), store.clone(), Arc::new(ShortBatchEmbedder))
        .build(&[corpus.docs()], &ProgressReporter::silent())
        .unwrap_err();

    assert!(matches!(
        err,
        IndexError::StageFailed {
            stage: BuildStage::Embedding,
            ..
        }
    ));
    assert!(store.get_all_files().unwrap().is_empty());
    assert!(!IndexPersistence::new(settings.index_path.clone()).exists());
}

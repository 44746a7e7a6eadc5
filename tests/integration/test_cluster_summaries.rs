//! Cluster summaries produced during indexing

use crate::common::{TestCorpus, create_builder, create_engine, default_builder};
use docsift::summarize::SummaryError;
use docsift::{BuildOutcome, MetadataStore, ProgressReporter, Summarizer};
use parking_lot::Mutex;
use std::sync::Arc;

/// Records every text it is asked to summarize.
#[derive(Default)]
struct RecordingSummarizer {
    inputs: Mutex<Vec<String>>,
}

impl Summarizer for RecordingSummarizer {
    fn summarize(&self, text: &str, _theme_hint: &str) -> Result<String, SummaryError> {
        self.inputs.lock().push(text.to_string());
        Ok(format!("Summary of {} characters", text.len()))
    }
}

struct BrokenSummarizer;

impl Summarizer for BrokenSummarizer {
    fn summarize(&self, _text: &str, _theme_hint: &str) -> Result<String, SummaryError> {
        Err(SummaryError::Failed("model unavailable".to_string()))
    }
}

#[test]
fn test_small_corpus_is_summarized_as_one_cluster() {
    let corpus = TestCorpus::new();
    corpus.add_file("history.txt", "The Roman Empire built roads and aqueducts across Europe.");
    corpus.add_file("space.txt", "Jupiter is the largest planet and has dozens of moons.");

    let mut settings = corpus.settings();
    settings.clustering.target_cluster_size = 10;
    let level = settings.clustering.summary_level;
    let settings = Arc::new(settings);
    let store = Arc::new(MetadataStore::open_in_memory().unwrap());
    let summarizer = Arc::new(RecordingSummarizer::default());

    let outcome = create_builder(settings, store.clone(), summarizer.clone())
        .build(&[corpus.docs()], &ProgressReporter::silent())
        .unwrap();
    let BuildOutcome::Built { index, stats } = outcome else {
        panic!("expected a built index");
    };

    assert_eq!(stats.cluster_count, 1);
    let inputs = summarizer.inputs.lock();
    assert_eq!(inputs.len(), 1);
    assert!(inputs[0].contains("Roman Empire"));
    assert!(inputs[0].contains("Jupiter"));

    let layer = index.clusters.as_ref().expect("cluster layer");
    assert_eq!(layer.len(), 1);
    assert_eq!(layer.clusters()[0].member_positions.len(), index.len());

    let rows = store.get_clusters_by_level(level).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].summary, layer.clusters()[0].summary);
}

#[test]
fn test_every_chunk_belongs_to_one_cluster() {
    let corpus = TestCorpus::new();
    for i in 0..8 {
        corpus.add_file(
            &format!("topic{i}.txt"),
            &format!("Topic {i} covers subject number {i} in some detail. ").repeat(6),
        );
    }
    let mut settings = corpus.settings();
    settings.chunking.chunk_size = 100;
    settings.chunking.overlap = 10;
    settings.clustering.target_cluster_size = 4;
    let settings = Arc::new(settings);
    let store = Arc::new(MetadataStore::open_in_memory().unwrap());

    let outcome = default_builder(settings, store)
        .build(&[corpus.docs()], &ProgressReporter::silent())
        .unwrap();
    let BuildOutcome::Built { index, .. } = outcome else {
        panic!("expected a built index");
    };

    let layer = index.clusters.as_ref().expect("cluster layer");
    assert!(layer.len() > 1);
    let mut members: Vec<_> = layer
        .clusters()
        .iter()
        .flat_map(|c| c.member_positions.iter().copied())
        .collect();
    members.sort();
    let expected: Vec<_> = (0..index.len())
        .map(|i| docsift::ChunkPosition::from_index(i).unwrap())
        .collect();
    assert_eq!(members, expected);
}

#[test]
fn test_failed_summaries_are_skipped() {
    let corpus = TestCorpus::new();
    corpus.add_file("a.txt", "Photosynthesis turns light into chemical energy.");
    corpus.add_file("b.txt", "Mitochondria release energy inside the cell.");
    let settings = Arc::new(corpus.settings());
    let store = Arc::new(MetadataStore::open_in_memory().unwrap());

    let outcome = create_builder(settings.clone(), store.clone(), Arc::new(BrokenSummarizer))
        .build(&[corpus.docs()], &ProgressReporter::silent())
        .unwrap();
    let BuildOutcome::Built { index, stats } = outcome else {
        panic!("expected a built index");
    };

    assert_eq!(stats.cluster_count, 0);
    assert!(index.clusters.is_none());
    assert!(
        store
            .get_clusters_by_level(settings.clustering.summary_level)
            .unwrap()
            .is_empty()
    );

    let results = create_engine(index, Some(store), &settings)
        .search("energy in the cell", 2)
        .unwrap();
    assert_eq!(results[0].file_name, "b.txt");
}

//! Bounded position lookups against the metadata store

use crate::common::{TestCorpus, create_engine, default_builder};
use docsift::storage::StorageError;
use docsift::{BuildOutcome, ChunkPosition, MetadataStore, ProgressReporter};
use std::sync::Arc;

fn indexed_store(corpus: &TestCorpus, files: usize) -> (Arc<MetadataStore>, docsift::LiveIndex) {
    for i in 0..files {
        corpus.add_file(
            &format!("city{i}.txt"),
            &format!("City {i} has a harbour, a museum and a market square."),
        );
    }
    let settings = Arc::new(corpus.settings());
    let store = Arc::new(MetadataStore::from_config(&settings.storage).unwrap());
    let outcome = default_builder(settings, store.clone())
        .build(&[corpus.docs()], &ProgressReporter::silent())
        .unwrap();
    let BuildOutcome::Built { index, .. } = outcome else {
        panic!("expected a built index");
    };
    (store, index)
}

#[test]
fn test_lookup_bound_counts_unique_positions() {
    let corpus = TestCorpus::new();
    let (store, _) = indexed_store(&corpus, 3);
    assert_eq!(store.max_position_lookup(), 100);

    let unique: Vec<ChunkPosition> = (0..101).map(ChunkPosition::new).collect();
    let err = store.get_files_by_positions(&unique).unwrap_err();
    assert!(matches!(
        err,
        StorageError::TooManyPositions {
            requested: 101,
            max: 100
        }
    ));

    let repeated: Vec<ChunkPosition> = (0..101).map(|i| ChunkPosition::new(i % 3)).collect();
    let found = store.get_files_by_positions(&repeated).unwrap();
    assert_eq!(found.len(), 3);
    assert!(found.values().all(|record| record.is_some()));
}

#[test]
fn test_unowned_position_maps_to_none() {
    let corpus = TestCorpus::new();
    let (store, index) = indexed_store(&corpus, 2);

    let beyond = ChunkPosition::from_index(index.len() + 10).unwrap();
    let found = store
        .get_files_by_positions(&[ChunkPosition::new(0), beyond])
        .unwrap();
    assert!(found[&ChunkPosition::new(0)].is_some());
    assert!(found[&beyond].is_none());
}

#[test]
fn test_search_batches_lookups_over_small_bound() {
    let corpus = TestCorpus::new();
    let mut settings = corpus.settings();
    settings.storage.max_position_lookup = 2;
    let (_, index) = indexed_store(&corpus, 6);
    let store = Arc::new(MetadataStore::from_config(&settings.storage).unwrap());
    assert_eq!(store.max_position_lookup(), 2);

    let results = create_engine(index, Some(store), &settings)
        .search("harbour museum market", 6)
        .unwrap();

    assert_eq!(results.len(), 6);
    for result in &results {
        assert!(result.file_name.starts_with("city"));
        assert_eq!(result.file_path.file_name().unwrap().to_string_lossy(), result.file_name);
    }
}

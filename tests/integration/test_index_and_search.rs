//! End-to-end indexing and hybrid search over small corpora

use crate::common::{TestCorpus, create_engine, default_builder};
use docsift::{BuildOutcome, ChunkPosition, IndexPersistence, MetadataStore, ProgressReporter};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

#[test]
fn test_single_file_corpus_is_one_chunk() {
    let corpus = TestCorpus::new();
    corpus.add_file(
        "solar.txt",
        "Mars is the fourth planet. Jupiter is the largest planet.",
    );
    let settings = Arc::new(corpus.settings());
    let store = Arc::new(MetadataStore::open_in_memory().unwrap());
    let builder = default_builder(settings.clone(), store.clone());

    let outcome = builder
        .build(&[corpus.docs()], &ProgressReporter::silent())
        .unwrap();
    let BuildOutcome::Built { index, stats } = outcome else {
        panic!("expected a built index");
    };

    assert_eq!(stats.chunk_count, 1);
    assert_eq!(index.manifest.chunk_count, 1);
    let files = store.get_all_files().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].start, ChunkPosition::new(0));
    assert_eq!(files[0].end, ChunkPosition::new(0));
    assert_eq!(files[0].filename, "solar.txt");

    let engine = create_engine(index, Some(store), &settings);
    let results = engine.search("planet", 5).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].position, ChunkPosition::new(0));
    assert_eq!(results[0].file_name, "solar.txt");
    assert!(results[0].document.contains("Jupiter is the largest planet"));
}

#[test]
fn test_proper_noun_match_ranks_first() {
    let corpus = TestCorpus::new();
    corpus.add_file(
        "team/a.txt",
        "Priya reviewed the quarterly planning notes with the platform group.",
    );
    corpus.add_file(
        "team/b.txt",
        "Siddhesh reviewed the quarterly planning notes with the platform group.",
    );
    let settings = Arc::new(corpus.settings());
    let store = Arc::new(MetadataStore::open_in_memory().unwrap());

    let outcome = default_builder(settings.clone(), store.clone())
        .build(&[corpus.docs()], &ProgressReporter::silent())
        .unwrap();
    let BuildOutcome::Built { index, .. } = outcome else {
        panic!("expected a built index");
    };

    let engine = create_engine(index, Some(store), &settings);
    let results = engine.search("Siddhesh planning notes", 2).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].file_name, "b.txt");
    assert!(results[0].score > results[1].score);
}

#[test]
fn test_results_are_distinct_by_file_and_prefix() {
    let corpus = TestCorpus::new();
    let paragraph = "Saturn has bright rings made of ice and rock. ";
    corpus.add_file("saturn.txt", &paragraph.repeat(12));
    corpus.add_file("copy/saturn.txt", &paragraph.repeat(12));
    corpus.add_file("moons.txt", "Titan is the largest moon of Saturn and has lakes of methane.");

    let mut settings = corpus.settings();
    settings.chunking.chunk_size = 120;
    settings.chunking.overlap = 20;
    let settings = Arc::new(settings);
    let store = Arc::new(MetadataStore::open_in_memory().unwrap());

    let outcome = default_builder(settings.clone(), store.clone())
        .build(&[corpus.docs()], &ProgressReporter::silent())
        .unwrap();
    let BuildOutcome::Built { index, .. } = outcome else {
        panic!("expected a built index");
    };
    assert!(index.len() > 3);

    let engine = create_engine(index, Some(store), &settings);
    let results = engine.search("Saturn rings", 10).unwrap();
    assert!(!results.is_empty());

    let mut paths = HashSet::new();
    let mut prefixes = HashSet::new();
    for result in &results {
        assert!(paths.insert(result.file_path.clone()), "duplicate file in results");
        let prefix: String = result.document.to_lowercase().chars().take(200).collect();
        assert!(prefixes.insert(prefix), "duplicate text prefix in results");
    }
}

#[test]
fn test_reindexing_unchanged_folder_is_deterministic() {
    let corpus = TestCorpus::new();
    corpus.add_file("notes/one.md", &"Rust ownership rules keep memory safe. ".repeat(40));
    corpus.add_file("notes/two.md", "Borrowing lets code read data without taking it.");
    corpus.add_file("three.txt", &"Lifetimes describe how long references live. ".repeat(30));
    let settings = Arc::new(corpus.settings());
    let store = Arc::new(MetadataStore::from_config(&settings.storage).unwrap());

    let mut runs = Vec::new();
    for _ in 0..2 {
        let outcome = default_builder(settings.clone(), store.clone())
            .build(&[corpus.docs()], &ProgressReporter::silent())
            .unwrap();
        let BuildOutcome::Built { index, .. } = outcome else {
            panic!("expected a built index");
        };
        let paths: BTreeSet<_> = store
            .get_all_files()
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        runs.push((index.len(), paths));
    }

    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[0].1.len(), 3);
    assert_eq!(store.chunk_total().unwrap() as usize, runs[0].0);
}

#[test]
fn test_every_position_has_exactly_one_file() {
    let corpus = TestCorpus::new();
    for i in 0..6 {
        corpus.add_file(
            &format!("doc{i}.txt"),
            &format!("Document {i} talks about topic {i}. ").repeat(10 * (i + 1)),
        );
    }
    let mut settings = corpus.settings();
    settings.chunking.chunk_size = 150;
    settings.chunking.overlap = 30;
    let settings = Arc::new(settings);
    let store = Arc::new(MetadataStore::open_in_memory().unwrap());

    let outcome = default_builder(settings, store.clone())
        .build(&[corpus.docs()], &ProgressReporter::silent())
        .unwrap();
    let BuildOutcome::Built { index, .. } = outcome else {
        panic!("expected a built index");
    };

    let files = store.get_all_files().unwrap();
    for row in 0..index.len() {
        let position = ChunkPosition::from_index(row).unwrap();
        let owners = files.iter().filter(|f| f.contains(position)).count();
        assert_eq!(owners, 1, "position {row} owned by {owners} files");
        let owner = files.iter().find(|f| f.contains(position)).unwrap();
        assert_eq!(index.chunk(position).unwrap().source_path, owner.path);
    }
}

#[test]
fn test_progress_is_monotonic_and_completes() {
    let corpus = TestCorpus::new();
    for i in 0..5 {
        corpus.add_file(&format!("p{i}.txt"), &format!("Paragraph {i} of the report. ").repeat(50));
    }
    let mut settings = corpus.settings();
    settings.indexing.embedding_batch_size = 3;
    let settings = Arc::new(settings);
    let store = Arc::new(MetadataStore::open_in_memory().unwrap());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let progress = ProgressReporter::new(move |current, total, _| {
        sink.lock().push((current, total));
    });

    default_builder(settings, store)
        .build(&[corpus.docs()], &progress)
        .unwrap();

    let seen = seen.lock();
    assert!(!seen.is_empty());
    for pair in seen.windows(2) {
        assert!(pair[0].0 <= pair[1].0, "progress went backwards: {pair:?}");
    }
    assert_eq!(*seen.last().unwrap(), (100, 100));
}

#[test]
fn test_persisted_index_serves_same_results() {
    let corpus = TestCorpus::new();
    corpus.add_file("venus.txt", "Venus is covered by thick clouds of sulfuric acid.");
    corpus.add_file("mercury.txt", "Mercury is the smallest planet and closest to the Sun.");
    corpus.add_file("earth.txt", "Earth has liquid water oceans and a nitrogen atmosphere.");
    let settings = Arc::new(corpus.settings());
    let store = Arc::new(MetadataStore::open_in_memory().unwrap());

    let outcome = default_builder(settings.clone(), store.clone())
        .build(&[corpus.docs()], &ProgressReporter::silent())
        .unwrap();
    let BuildOutcome::Built { index, .. } = outcome else {
        panic!("expected a built index");
    };
    let live = create_engine(index, Some(store.clone()), &settings)
        .search("clouds of sulfuric acid", 3)
        .unwrap();

    let loaded = IndexPersistence::new(settings.index_path.clone())
        .load()
        .unwrap();
    assert_eq!(loaded.manifest.file_count, 3);
    let reloaded = create_engine(loaded, Some(store), &settings)
        .search("clouds of sulfuric acid", 3)
        .unwrap();

    assert_eq!(live[0].file_name, "venus.txt");
    let live_positions: Vec<_> = live.iter().map(|r| r.position).collect();
    let reloaded_positions: Vec<_> = reloaded.iter().map(|r| r.position).collect();
    assert_eq!(live_positions, reloaded_positions);
}

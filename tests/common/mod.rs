use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use docsift::vector::VectorDimension;
use docsift::{
    ExtractiveSummarizer, HashingEmbedder, HybridSearchEngine, IndexBuilder, LiveIndex,
    MetadataStore, PlainTextExtractor, Settings, Summarizer,
};
use tempfile::TempDir;

pub struct TestCorpus {
    pub dir: TempDir,
}

impl TestCorpus {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Folder that holds the documents, separate from index artifacts.
    pub fn docs(&self) -> PathBuf {
        self.dir.path().join("docs")
    }

    pub fn add_file(&self, path: &str, content: &str) -> PathBuf {
        let file_path = self.docs().join(path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&file_path, content).expect("Failed to write file");
        file_path
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Settings with index artifacts and the database under the temp dir.
    pub fn settings(&self) -> Settings {
        let mut settings = Settings::default();
        settings.index_path = self.path().join("index").join("corpus");
        settings.storage.database_path = self.path().join("docsift.db");
        settings.indexing.extraction_threads = 2;
        settings.indexing.embedding_workers = 2;
        settings.indexing.summary_workers = 2;
        settings
    }
}

pub fn embedder() -> Arc<HashingEmbedder> {
    Arc::new(HashingEmbedder::new(
        VectorDimension::new(64).expect("valid dimension"),
    ))
}

pub fn create_builder(
    settings: Arc<Settings>,
    store: Arc<MetadataStore>,
    summarizer: Arc<dyn Summarizer>,
) -> IndexBuilder {
    IndexBuilder::new(
        settings.clone(),
        Arc::new(PlainTextExtractor::new(settings.indexing.max_file_size)),
        embedder(),
        summarizer,
        store,
    )
    .expect("Failed to create builder")
}

pub fn default_builder(settings: Arc<Settings>, store: Arc<MetadataStore>) -> IndexBuilder {
    create_builder(settings, store, Arc::new(ExtractiveSummarizer))
}

pub fn create_engine(
    index: LiveIndex,
    store: Option<Arc<MetadataStore>>,
    settings: &Settings,
) -> HybridSearchEngine {
    HybridSearchEngine::new(Arc::new(index), embedder(), store, settings)
}

//! Configuration module for the retrieval engine.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `DS_` and use double underscores
//! to separate nested levels:
//! - `DS_INDEXING__EMBEDDING_WORKERS=8` sets `indexing.embedding_workers`
//! - `DS_SEARCH__RRF_K=30` sets `search.rrf_k`
//! - `DS_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Directory holding settings and the default index location.
pub const CONFIG_DIR: &str = ".docsift";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Base path shared by every persisted index artifact
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct IndexingConfig {
    /// Worker threads for text extraction
    #[serde(default = "default_extraction_threads")]
    pub extraction_threads: usize,

    /// Chunks per embedding request
    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,

    /// Concurrent embedding batches in flight
    #[serde(default = "default_embedding_workers")]
    pub embedding_workers: usize,

    /// Extra attempts for a failed embedding batch before the build aborts
    #[serde(default = "default_embedding_retries")]
    pub embedding_retries: usize,

    /// Concurrent cluster summarization tasks
    #[serde(default = "default_summary_workers")]
    pub summary_workers: usize,

    /// Files larger than this are skipped during extraction
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Patterns to ignore during discovery (gitignore syntax)
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChunkingConfig {
    /// Target chunk length in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ClusteringConfig {
    /// Chunks per cluster; drives the k-means cluster count
    #[serde(default = "default_target_cluster_size")]
    pub target_cluster_size: usize,

    /// Seed for k-means++ initialization
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Level recorded for generated summaries
    #[serde(default = "default_summary_level")]
    pub summary_level: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmbeddingConfig {
    /// Dimension of the built-in hashing embedder
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Identity recorded in the manifest and used for cache keys
    #[serde(default = "default_model_id")]
    pub model_id: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SearchConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Nearest chunks taken from the chunk vector index
    #[serde(default = "default_vector_candidates")]
    pub vector_candidates: usize,

    /// Nearest cluster summaries expanded into member chunks
    #[serde(default = "default_summary_candidates")]
    pub summary_candidates: usize,

    /// Best BM25 hits taken from the keyword index
    #[serde(default = "default_keyword_candidates")]
    pub keyword_candidates: usize,

    /// Reciprocal rank fusion constant
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,

    /// Multiplier for candidates containing a capitalized query token
    #[serde(default = "default_identity_boost")]
    pub identity_boost: f32,

    /// Distance assigned to chunks injected from a matching cluster
    #[serde(default = "default_cluster_placeholder_distance")]
    pub cluster_placeholder_distance: f32,

    /// Prefix length hashed for near-duplicate suppression
    #[serde(default = "default_dedup_prefix_chars")]
    pub dedup_prefix_chars: usize,

    /// Log queries to the search history table
    #[serde(default = "default_true")]
    pub record_history: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StorageConfig {
    /// SQLite database holding file records, clusters and the response cache
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Idle connections kept by the pool
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Largest batch accepted by position lookups
    #[serde(default = "default_max_position_lookup")]
    pub max_position_lookup: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module level overrides, e.g. `"docsift::indexing" = "debug"`
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_index_path() -> PathBuf {
    PathBuf::from(".docsift/index/corpus")
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_extraction_threads() -> usize {
    num_cpus::get().min(4)
}
fn default_embedding_batch_size() -> usize {
    100
}
fn default_embedding_workers() -> usize {
    5
}
fn default_embedding_retries() -> usize {
    1
}
fn default_summary_workers() -> usize {
    10
}
fn default_max_file_size() -> u64 {
    50 * 1024 * 1024
}
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_target_cluster_size() -> usize {
    20
}
fn default_seed() -> u64 {
    42
}
fn default_summary_level() -> u32 {
    1
}
fn default_dimension() -> usize {
    crate::vector::VECTOR_DIMENSION_384
}
fn default_model_id() -> String {
    "hashing-384".to_string()
}
fn default_top_k() -> usize {
    10
}
fn default_vector_candidates() -> usize {
    15
}
fn default_summary_candidates() -> usize {
    3
}
fn default_keyword_candidates() -> usize {
    20
}
fn default_rrf_k() -> f32 {
    60.0
}
fn default_identity_boost() -> f32 {
    1.5
}
fn default_cluster_placeholder_distance() -> f32 {
    100.0
}
fn default_dedup_prefix_chars() -> usize {
    200
}
fn default_database_path() -> PathBuf {
    PathBuf::from(".docsift/metadata.db")
}
fn default_pool_size() -> usize {
    4
}
fn default_max_position_lookup() -> usize {
    100
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_path: default_index_path(),
            debug: false,
            indexing: IndexingConfig::default(),
            chunking: ChunkingConfig::default(),
            clustering: ClusteringConfig::default(),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            extraction_threads: default_extraction_threads(),
            embedding_batch_size: default_embedding_batch_size(),
            embedding_workers: default_embedding_workers(),
            embedding_retries: default_embedding_retries(),
            summary_workers: default_summary_workers(),
            max_file_size: default_max_file_size(),
            ignore_patterns: vec![
                ".git/**".to_string(),
                ".docsift/**".to_string(),
                "node_modules/**".to_string(),
            ],
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_chunk_overlap(),
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            target_cluster_size: default_target_cluster_size(),
            seed: default_seed(),
            summary_level: default_summary_level(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            model_id: default_model_id(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            vector_candidates: default_vector_candidates(),
            summary_candidates: default_summary_candidates(),
            keyword_candidates: default_keyword_candidates(),
            rrf_k: default_rrf_k(),
            identity_boost: default_identity_boost(),
            cluster_placeholder_distance: default_cluster_placeholder_distance(),
            dedup_prefix_chars: default_dedup_prefix_chars(),
            record_history: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            pool_size: default_pool_size(),
            max_position_lookup: default_max_position_lookup(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path))
            // Double underscore separates nested levels; single underscores stay in field names
            .merge(Env::prefixed("DS_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find the settings file by looking for a .docsift directory
    /// from the current directory up to the root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join("settings.toml"));
            }
        }
        None
    }

    /// Check that the chunking and search knobs are usable
    pub fn validate(&self) -> Result<(), String> {
        if self.chunking.chunk_size == 0 {
            return Err("chunking.chunk_size must be greater than zero".to_string());
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            return Err(format!(
                "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.overlap, self.chunking.chunk_size
            ));
        }
        if self.indexing.embedding_batch_size == 0 {
            return Err("indexing.embedding_batch_size must be greater than zero".to_string());
        }
        if self.clustering.target_cluster_size == 0 {
            return Err("clustering.target_cluster_size must be greater than zero".to_string());
        }
        if self.storage.max_position_lookup == 0 {
            return Err("storage.max_position_lookup must be greater than zero".to_string());
        }
        Ok(())
    }

    /// Save current configuration to file
    pub fn save(
        &self,
        path: impl AsRef<std::path::Path>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = format!(
            r#"# docsift configuration file

# Version of the configuration schema
version = 1

# Base name shared by every index artifact (<base>.vec, <base>_bm25/, ...)
index_path = ".docsift/index/corpus"

# Global debug mode
debug = false

[indexing]
# Extraction worker threads (defaults to min(CPU count, 4))
# extraction_threads = {}

# Chunks sent to the embedding provider per request
embedding_batch_size = 100
embedding_workers = 5

# A batch that still fails after these retries aborts the build
embedding_retries = 1

summary_workers = 10

# Additional patterns to ignore during discovery
ignore_patterns = [".git/**", ".docsift/**", "node_modules/**"]

[chunking]
chunk_size = 1000
overlap = 200

[clustering]
# One cluster per this many chunks; a corpus this small gets a single cluster
target_cluster_size = 20
seed = 42

[embedding]
dimension = 384
model_id = "hashing-384"

[search]
default_top_k = 10
vector_candidates = 15
summary_candidates = 3
keyword_candidates = 20
rrf_k = 60.0
identity_boost = 1.5

[storage]
database_path = ".docsift/metadata.db"
pool_size = 4
max_position_lookup = 100

[logging]
# Overridden by RUST_LOG when set
default = "warn"

[logging.modules]
# "docsift::indexing" = "info"
"#,
            default_extraction_threads()
        );

        std::fs::write(&config_path, template)?;
        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.chunking.chunk_size, 1000);
        assert_eq!(settings.chunking.overlap, 200);
        assert_eq!(settings.clustering.target_cluster_size, 20);
        assert_eq!(settings.search.vector_candidates, 15);
        assert_eq!(settings.search.summary_candidates, 3);
        assert_eq!(settings.search.keyword_candidates, 20);
        assert_eq!(settings.search.rrf_k, 60.0);
        assert_eq!(settings.storage.max_position_lookup, 100);
        assert!(settings.indexing.extraction_threads > 0);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2

[indexing]
embedding_batch_size = 16
ignore_patterns = ["custom/**"]

[search]
identity_boost = 2.0

[logging.modules]
"docsift::search" = "trace"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.indexing.embedding_batch_size, 16);
        assert_eq!(settings.indexing.ignore_patterns, vec!["custom/**"]);
        assert_eq!(settings.search.identity_boost, 2.0);
        assert_eq!(settings.logging.modules["docsift::search"], "trace");
        // Untouched sections keep defaults
        assert_eq!(settings.search.rrf_k, 60.0);
        assert_eq!(settings.chunking.chunk_size, 1000);
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.indexing.embedding_workers = 2;
        settings.clustering.seed = 7;

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.indexing.embedding_workers, 2);
        assert_eq!(loaded.clustering.seed, 7);
    }

    #[test]
    fn test_env_override() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "[clustering]\ntarget_cluster_size = 8\n").unwrap();

        unsafe {
            std::env::set_var("DS_CLUSTERING__TARGET_CLUSTER_SIZE", "12");
        }
        let settings = Settings::load_from(&config_path).unwrap();
        unsafe {
            std::env::remove_var("DS_CLUSTERING__TARGET_CLUSTER_SIZE");
        }

        assert_eq!(settings.clustering.target_cluster_size, 12);
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let mut settings = Settings::default();
        settings.chunking.overlap = settings.chunking.chunk_size;
        let err = settings.validate().unwrap_err();
        assert!(err.contains("overlap"));
    }
}

//! Dense vector retrieval.
//!
//! Embedding providers, a flat exact-L2 index with its binary file format,
//! and the k-means engine that groups chunks for cluster summaries.
//!
//! # Architecture
//! Two [`FlatVectorIndex`] instances back every live index: one row per chunk
//! and one row per cluster summary. Both are rebuilt wholesale on re-indexing
//! and written with [`write_vector_file`].

mod clustering;
mod embedding;
mod index;
mod storage;
mod types;

pub use clustering::{
    ClusteringError, KMeansResult, assign_to_nearest_centroid, cluster, cosine_similarity,
    kmeans_clustering,
};
pub use embedding::{EmbeddingProvider, HashingEmbedder, validate_batch};
pub use index::{FlatVectorIndex, squared_l2};
pub use storage::{STORAGE_VERSION, VectorStorageError, read_vector_file, write_vector_file};
pub use types::{VECTOR_DIMENSION_384, VectorDimension, VectorError};

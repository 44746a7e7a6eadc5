//! Durable state: the SQLite metadata store and the on-disk index artifacts.

pub mod error;
pub mod manifest;
pub mod metadata_store;
pub mod persistence;
pub mod pool;

pub use error::{StorageError, StorageResult};
pub use manifest::{INDEX_FORMAT_VERSION, IndexManifest};
pub use metadata_store::{MAX_POSITION_LOOKUP, MetadataStore, RebuildTransaction};
pub use persistence::{IndexPersistence, SaveTransaction};
pub use pool::{ConnectionPool, PooledSession};

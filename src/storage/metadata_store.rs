//! SQLite metadata store: file ranges, cluster rows, response cache,
//! search history and preferences.
//!
//! Every operation checks out its own [`PooledSession`]. Mutations run in a
//! transaction, so a failed batch leaves no partial rows behind.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use super::error::{StorageError, StorageResult};
use super::pool::{ConnectionPool, PooledSession};
use crate::config::StorageConfig;
use crate::indexing::get_utc_timestamp;
use crate::types::{
    CacheKey, CacheStats, ChunkPosition, ClusterPosition, ClusterRow, FileRecord, NewFileRecord,
    ResponseCacheEntry, SearchHistoryEntry,
};

/// Default bound on distinct positions per `get_files_by_positions` call.
pub const MAX_POSITION_LOOKUP: usize = 100;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    filename TEXT NOT NULL,
    extension TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    modified_time INTEGER NOT NULL,
    indexed_time INTEGER NOT NULL,
    chunk_count INTEGER NOT NULL,
    faiss_start_idx INTEGER NOT NULL,
    faiss_end_idx INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_files_range ON files(faiss_start_idx, faiss_end_idx);
CREATE INDEX IF NOT EXISTS idx_files_filename ON files(filename);

CREATE TABLE IF NOT EXISTS clusters (
    id INTEGER PRIMARY KEY,
    summary TEXT NOT NULL,
    level INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_clusters_level ON clusters(level);

CREATE TABLE IF NOT EXISTS response_cache (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    query_hash TEXT NOT NULL,
    context_hash TEXT NOT NULL,
    model_id TEXT NOT NULL,
    response_type TEXT NOT NULL,
    response_text TEXT NOT NULL,
    hit_count INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    last_accessed_at INTEGER NOT NULL,
    UNIQUE (query_hash, context_hash, model_id, response_type)
);

CREATE TABLE IF NOT EXISTS search_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    query TEXT NOT NULL,
    result_count INTEGER NOT NULL,
    execution_time_ms INTEGER NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS preferences (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
";

const FILE_COLUMNS: &str = "id, path, filename, extension, size_bytes, modified_time, \
                            indexed_time, chunk_count, faiss_start_idx, faiss_end_idx";

const CACHE_COLUMNS: &str = "query_hash, context_hash, model_id, response_type, response_text, \
                             hit_count, created_at, last_accessed_at";

#[derive(Debug)]
pub struct MetadataStore {
    pool: ConnectionPool,
    max_position_lookup: usize,
}

impl MetadataStore {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open(path: &Path, pool_size: usize) -> StorageResult<Self> {
        Self::with_pool(ConnectionPool::open(path, pool_size)?)
    }

    /// A private in-memory database, shared by all of this store's sessions.
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_pool(ConnectionPool::in_memory(2)?)
    }

    /// Open the database configured in `[storage]`.
    pub fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        Ok(Self::open(&config.database_path, config.pool_size)?
            .with_max_position_lookup(config.max_position_lookup))
    }

    fn with_pool(pool: ConnectionPool) -> StorageResult<Self> {
        pool.session()?.execute_batch(SCHEMA)?;
        Ok(Self {
            pool,
            max_position_lookup: MAX_POSITION_LOOKUP,
        })
    }

    #[must_use]
    pub fn with_max_position_lookup(mut self, max: usize) -> Self {
        self.max_position_lookup = max.max(1);
        self
    }

    /// Bound applied by [`MetadataStore::get_files_by_positions`].
    pub fn max_position_lookup(&self) -> usize {
        self.max_position_lookup
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    // ---- files ----

    /// Insert or replace (by path) a batch of file records in one transaction.
    pub fn add_file_records(&self, batch: &[NewFileRecord]) -> StorageResult<()> {
        let mut session = self.pool.session()?;
        let tx = session.transaction()?;
        insert_file_records(&tx, batch)?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_file_by_path(&self, path: &Path) -> StorageResult<Option<FileRecord>> {
        let session = self.pool.session()?;
        let record = session
            .query_row(
                &format!("SELECT {FILE_COLUMNS} FROM files WHERE path = ?1"),
                params![path_text(path)],
                file_from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn get_file_by_name(&self, name: &str) -> StorageResult<Vec<FileRecord>> {
        let session = self.pool.session()?;
        let mut stmt = session.prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE filename = ?1 ORDER BY faiss_start_idx"
        ))?;
        let rows = stmt.query_map(params![name], file_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Every file record, ordered by range start.
    pub fn get_all_files(&self) -> StorageResult<Vec<FileRecord>> {
        let session = self.pool.session()?;
        let mut stmt = session.prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM files ORDER BY faiss_start_idx"
        ))?;
        let rows = stmt.query_map([], file_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Map each distinct position to the file whose range contains it.
    ///
    /// More than [`MetadataStore::max_position_lookup`] distinct positions is
    /// an error; the request is never truncated.
    pub fn get_files_by_positions(
        &self,
        positions: &[ChunkPosition],
    ) -> StorageResult<HashMap<ChunkPosition, Option<FileRecord>>> {
        let unique: BTreeSet<ChunkPosition> = positions.iter().copied().collect();
        if unique.len() > self.max_position_lookup {
            return Err(StorageError::TooManyPositions {
                requested: unique.len(),
                max: self.max_position_lookup,
            });
        }
        if unique.is_empty() {
            return Ok(HashMap::new());
        }

        let clauses = (1..=unique.len())
            .map(|i| format!("(faiss_start_idx <= ?{i} AND faiss_end_idx >= ?{i})"))
            .collect::<Vec<_>>()
            .join(" OR ");
        let sql = format!("SELECT {FILE_COLUMNS} FROM files WHERE {clauses}");

        let session = self.pool.session()?;
        let mut stmt = session.prepare(&sql)?;
        let rows = stmt.query_map(
            params_from_iter(unique.iter().map(|p| i64::from(p.get()))),
            file_from_row,
        )?;
        let records = rows.collect::<Result<Vec<_>, _>>()?;

        Ok(unique
            .into_iter()
            .map(|position| {
                let record = records.iter().find(|r| r.contains(position)).cloned();
                (position, record)
            })
            .collect())
    }

    pub fn clear_all_files(&self) -> StorageResult<usize> {
        Ok(self.pool.session()?.execute("DELETE FROM files", [])?)
    }

    pub fn file_count(&self) -> StorageResult<u64> {
        let count: i64 = self
            .pool
            .session()?
            .query_row("SELECT COUNT(*) FROM files", [], |r| r.get(0))?;
        to_u64("file_count", count)
    }

    /// Sum of chunk counts over all files.
    pub fn chunk_total(&self) -> StorageResult<u64> {
        let total: i64 = self.pool.session()?.query_row(
            "SELECT COALESCE(SUM(chunk_count), 0) FROM files",
            [],
            |r| r.get(0),
        )?;
        to_u64("chunk_total", total)
    }

    // ---- clusters ----

    /// Append a cluster row; ids are assigned 0, 1, 2, ... in insertion order.
    pub fn add_cluster(&self, summary: &str, level: u32) -> StorageResult<ClusterPosition> {
        let mut session = self.pool.session()?;
        let tx = session.transaction()?;
        let id = insert_cluster(&tx, summary, level)?;
        tx.commit()?;
        Ok(id)
    }

    pub fn get_clusters_by_level(&self, level: u32) -> StorageResult<Vec<ClusterRow>> {
        let session = self.pool.session()?;
        let mut stmt = session.prepare(
            "SELECT id, summary, level, created_at FROM clusters WHERE level = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![level], cluster_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn clear_clusters(&self) -> StorageResult<usize> {
        Ok(self.pool.session()?.execute("DELETE FROM clusters", [])?)
    }

    // ---- response cache ----

    /// Look up a cached response, counting the hit.
    pub fn get_cached_response(&self, key: &CacheKey) -> StorageResult<Option<ResponseCacheEntry>> {
        let mut session = self.pool.session()?;
        let tx = session.transaction()?;
        let updated = tx.execute(
            "UPDATE response_cache
             SET hit_count = hit_count + 1, last_accessed_at = ?5
             WHERE query_hash = ?1 AND context_hash = ?2 AND model_id = ?3 AND response_type = ?4",
            params![
                key.query_hash,
                key.context_hash,
                key.model_id,
                key.response_type,
                get_utc_timestamp()
            ],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        let entry = tx.query_row(
            &format!(
                "SELECT {CACHE_COLUMNS} FROM response_cache
                 WHERE query_hash = ?1 AND context_hash = ?2 AND model_id = ?3 AND response_type = ?4"
            ),
            params![key.query_hash, key.context_hash, key.model_id, key.response_type],
            cache_entry_from_row,
        )?;
        tx.commit()?;
        Ok(Some(entry))
    }

    /// Store or overwrite a response for `key`. The hit count is kept on overwrite.
    pub fn cache_response(&self, key: &CacheKey, response_text: &str) -> StorageResult<()> {
        let now = get_utc_timestamp();
        self.pool.session()?.execute(
            "INSERT INTO response_cache
                (query_hash, context_hash, model_id, response_type, response_text,
                 hit_count, created_at, last_accessed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)
             ON CONFLICT (query_hash, context_hash, model_id, response_type)
             DO UPDATE SET response_text = excluded.response_text,
                           last_accessed_at = excluded.last_accessed_at",
            params![
                key.query_hash,
                key.context_hash,
                key.model_id,
                key.response_type,
                response_text,
                now
            ],
        )?;
        Ok(())
    }

    pub fn clear_response_cache(&self) -> StorageResult<usize> {
        Ok(self.pool.session()?.execute("DELETE FROM response_cache", [])?)
    }

    pub fn cache_stats(&self) -> StorageResult<CacheStats> {
        let session = self.pool.session()?;
        let (entries, total_hits): (i64, i64) = session.query_row(
            "SELECT COUNT(*), COALESCE(SUM(hit_count), 0) FROM response_cache",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        let mut stmt = session.prepare(
            "SELECT response_type, COUNT(*) FROM response_cache
             GROUP BY response_type ORDER BY response_type",
        )?;
        let by_type = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
            .map(|row| {
                let (kind, count) = row?;
                Ok((kind, to_u64("response_type count", count)?))
            })
            .collect::<StorageResult<Vec<_>>>()?;

        Ok(CacheStats {
            entries: to_u64("entries", entries)?,
            total_hits: to_u64("total_hits", total_hits)?,
            by_type,
        })
    }

    // ---- search history ----

    /// Record one executed search. Never waits on a locked database.
    pub fn add_search_history(
        &self,
        query: &str,
        result_count: u32,
        execution_time_ms: u64,
    ) -> StorageResult<()> {
        let session = self.pool.session_with_timeout(Duration::ZERO)?;
        session.execute(
            "INSERT INTO search_history (query, result_count, execution_time_ms, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                query,
                result_count,
                i64::try_from(execution_time_ms).unwrap_or(i64::MAX),
                get_utc_timestamp()
            ],
        )?;
        Ok(())
    }

    /// Most recent searches first.
    pub fn recent_searches(&self, limit: usize) -> StorageResult<Vec<SearchHistoryEntry>> {
        let session = self.pool.session()?;
        let mut stmt = session.prepare(
            "SELECT query, result_count, execution_time_ms, timestamp
             FROM search_history ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![i64::try_from(limit).unwrap_or(i64::MAX)], |row| {
            Ok(SearchHistoryEntry {
                query: row.get(0)?,
                result_count: row.get(1)?,
                execution_time_ms: column_u64(row, 2)?,
                timestamp: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ---- preferences ----

    pub fn set_preference(&self, key: &str, value: &str) -> StorageResult<()> {
        self.pool.session()?.execute(
            "INSERT INTO preferences (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, get_utc_timestamp()],
        )?;
        Ok(())
    }

    pub fn get_preference(&self, key: &str) -> StorageResult<Option<String>> {
        let value = self
            .pool
            .session()?
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                params![key],
                |r| r.get(0),
            )
            .optional()?;
        Ok(value)
    }

    // ---- rebuild ----

    /// Start the write transaction that spans a full index build.
    ///
    /// The transaction takes the write lock immediately. Readers on other
    /// sessions keep seeing the previous rows until [`RebuildTransaction::commit`].
    pub fn begin_rebuild(&self) -> StorageResult<RebuildTransaction<'_>> {
        let session = self.pool.session()?;
        session.execute_batch("BEGIN IMMEDIATE")?;
        Ok(RebuildTransaction { session })
    }
}

/// Metadata writes of one index build. Dropping without commit rolls back.
pub struct RebuildTransaction<'s> {
    session: PooledSession<'s>,
}

impl RebuildTransaction<'_> {
    /// Clear files and clusters, then insert `batch` with full range validation.
    pub fn replace_files(&mut self, batch: &[NewFileRecord]) -> StorageResult<()> {
        let savepoint = self.session.savepoint()?;
        savepoint.execute("DELETE FROM files", [])?;
        savepoint.execute("DELETE FROM clusters", [])?;
        insert_file_records(&savepoint, batch)?;
        savepoint.commit()?;
        Ok(())
    }

    pub fn add_cluster(&mut self, summary: &str, level: u32) -> StorageResult<ClusterPosition> {
        insert_cluster(&self.session, summary, level)
    }

    pub fn commit(self) -> StorageResult<()> {
        self.session.execute_batch("COMMIT")?;
        Ok(())
    }
}

fn insert_file_records(conn: &Connection, batch: &[NewFileRecord]) -> StorageResult<()> {
    for record in batch {
        validate_range(record)?;
    }

    let now = get_utc_timestamp();
    {
        let mut insert = conn.prepare_cached(
            "INSERT OR REPLACE INTO files
                (path, filename, extension, size_bytes, modified_time, indexed_time,
                 chunk_count, faiss_start_idx, faiss_end_idx)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for record in batch {
            insert.execute(params![
                path_text(&record.path),
                record.filename,
                record.extension,
                i64::try_from(record.size_bytes).unwrap_or(i64::MAX),
                record.modified_time,
                now,
                record.chunk_count,
                record.start.get(),
                record.end.get(),
            ])?;
        }
    }

    // Checked after insert so rows replaced by this batch do not count
    let mut overlap = conn.prepare_cached(
        "SELECT path FROM files
         WHERE path != ?1 AND faiss_start_idx <= ?3 AND faiss_end_idx >= ?2
         LIMIT 1",
    )?;
    for record in batch {
        let other: Option<String> = overlap
            .query_row(
                params![path_text(&record.path), record.start.get(), record.end.get()],
                |r| r.get(0),
            )
            .optional()?;
        if let Some(other) = other {
            return Err(StorageError::RangeCollision {
                path: record.path.clone(),
                start: record.start.get(),
                end: record.end.get(),
                other: PathBuf::from(other),
            });
        }
    }
    Ok(())
}

fn validate_range(record: &NewFileRecord) -> StorageResult<()> {
    if record.end < record.start {
        return Err(StorageError::InvalidRange {
            path: record.path.clone(),
            reason: format!("end {} is before start {}", record.end, record.start),
        });
    }
    let span = record.end.get() - record.start.get() + 1;
    if record.chunk_count != span {
        return Err(StorageError::InvalidRange {
            path: record.path.clone(),
            reason: format!(
                "chunk_count {} does not match range length {span}",
                record.chunk_count
            ),
        });
    }
    Ok(())
}

fn insert_cluster(conn: &Connection, summary: &str, level: u32) -> StorageResult<ClusterPosition> {
    let next: i64 = conn.query_row("SELECT COALESCE(MAX(id) + 1, 0) FROM clusters", [], |r| {
        r.get(0)
    })?;
    conn.execute(
        "INSERT INTO clusters (id, summary, level, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![next, summary, level, get_utc_timestamp()],
    )?;
    u32::try_from(next)
        .map(ClusterPosition::new)
        .map_err(|_| StorageError::InvalidColumn {
            field: "clusters.id",
            value: next,
        })
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn to_u64(field: &'static str, value: i64) -> StorageResult<u64> {
    u64::try_from(value).map_err(|_| StorageError::InvalidColumn { field, value })
}

fn column_u32(row: &Row<'_>, idx: usize) -> rusqlite::Result<u32> {
    let value: i64 = row.get(idx)?;
    u32::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, value))
}

fn column_u64(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(idx)?;
    u64::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, value))
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        path: PathBuf::from(row.get::<_, String>(1)?),
        filename: row.get(2)?,
        extension: row.get(3)?,
        size_bytes: column_u64(row, 4)?,
        modified_time: row.get(5)?,
        indexed_time: row.get(6)?,
        chunk_count: column_u32(row, 7)?,
        start: ChunkPosition::new(column_u32(row, 8)?),
        end: ChunkPosition::new(column_u32(row, 9)?),
    })
}

fn cluster_from_row(row: &Row<'_>) -> rusqlite::Result<ClusterRow> {
    Ok(ClusterRow {
        id: ClusterPosition::new(column_u32(row, 0)?),
        summary: row.get(1)?,
        level: column_u32(row, 2)?,
        created_at: row.get(3)?,
    })
}

fn cache_entry_from_row(row: &Row<'_>) -> rusqlite::Result<ResponseCacheEntry> {
    Ok(ResponseCacheEntry {
        key: CacheKey {
            query_hash: row.get(0)?,
            context_hash: row.get(1)?,
            model_id: row.get(2)?,
            response_type: row.get(3)?,
        },
        response_text: row.get(4)?,
        hit_count: column_u64(row, 5)?,
        created_at: row.get(6)?,
        last_accessed: row.get(7)?,
    })
}

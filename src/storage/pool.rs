//! Scoped SQLite connection pool.
//!
//! A [`PooledSession`] borrows the pool, so it cannot outlive it. On release
//! any transaction left open is rolled back before the connection goes back
//! to the idle list; a connection that cannot be reset is discarded.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};

use super::error::StorageResult;

/// Wait applied when another writer holds the database lock.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

static MEMORY_DB_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
enum Target {
    File(PathBuf),
    /// Shared-cache URI so every pooled connection sees one database.
    Memory(String),
}

pub struct ConnectionPool {
    target: Target,
    idle: Mutex<Vec<Connection>>,
    max_idle: usize,
    busy_timeout: Duration,
    /// Keeps a shared in-memory database alive while the pool exists.
    _anchor: Option<Mutex<Connection>>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("target", &self.target)
            .field("idle", &self.idle.lock().len())
            .field("max_idle", &self.max_idle)
            .finish()
    }
}

impl ConnectionPool {
    /// Pool over a database file, created if missing. WAL mode is enabled.
    pub fn open(path: &Path, size: usize) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            target: Target::File(path.to_path_buf()),
            idle: Mutex::new(Vec::with_capacity(size)),
            max_idle: size.max(1),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            _anchor: None,
        })
    }

    /// Pool over a private shared-cache in-memory database.
    pub fn in_memory(size: usize) -> StorageResult<Self> {
        let id = MEMORY_DB_COUNTER.fetch_add(1, Ordering::Relaxed);
        let uri = format!(
            "file:docsift_mem_{}_{id}?mode=memory&cache=shared",
            std::process::id()
        );
        let mut pool = Self {
            target: Target::Memory(uri),
            idle: Mutex::new(Vec::with_capacity(size)),
            max_idle: size.max(1),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            _anchor: None,
        };
        pool._anchor = Some(Mutex::new(pool.connect()?));
        Ok(pool)
    }

    /// Check out a connection with the pool's busy timeout.
    pub fn session(&self) -> StorageResult<PooledSession<'_>> {
        self.session_with_timeout(self.busy_timeout)
    }

    /// Check out a connection that waits at most `timeout` on a locked database.
    pub fn session_with_timeout(&self, timeout: Duration) -> StorageResult<PooledSession<'_>> {
        let conn = match self.take_idle() {
            Some(conn) => conn,
            None => self.connect_with_retry()?,
        };
        if timeout != self.busy_timeout {
            conn.busy_timeout(timeout)?;
        }
        Ok(PooledSession {
            pool: self,
            conn: Some(conn),
            timeout_changed: timeout != self.busy_timeout,
        })
    }

    /// Number of connections waiting for reuse.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Pop an idle connection that still answers, resetting it if needed.
    fn take_idle(&self) -> Option<Connection> {
        loop {
            let conn = self.idle.lock().pop()?;
            if !conn.is_autocommit() && conn.execute_batch("ROLLBACK").is_err() {
                tracing::debug!("discarding idle connection stuck in a transaction");
                continue;
            }
            if probe(&conn).is_ok() {
                return Some(conn);
            }
            tracing::debug!("discarding stale idle connection");
        }
    }

    fn connect_with_retry(&self) -> StorageResult<Connection> {
        match self.connect() {
            Ok(conn) => Ok(conn),
            Err(first) => {
                tracing::debug!("connection attempt failed, retrying once: {first}");
                self.connect()
            }
        }
    }

    fn connect(&self) -> StorageResult<Connection> {
        let conn = match &self.target {
            Target::File(path) => Connection::open(path)?,
            Target::Memory(uri) => Connection::open_with_flags(
                uri,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?,
        };
        conn.busy_timeout(self.busy_timeout)?;
        if matches!(self.target, Target::File(_)) {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            tracing::trace!("journal mode {mode}");
            conn.pragma_update(None, "synchronous", "NORMAL")?;
        }
        Ok(conn)
    }

    fn release(&self, conn: Connection, timeout_changed: bool) {
        if !conn.is_autocommit() {
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                tracing::warn!("rollback on release failed, dropping connection: {e}");
                return;
            }
        }
        if timeout_changed && conn.busy_timeout(self.busy_timeout).is_err() {
            return;
        }
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(conn);
        }
    }
}

fn probe(conn: &Connection) -> rusqlite::Result<()> {
    conn.query_row("SELECT 1", [], |_| Ok(()))
}

/// A checked-out connection. Dereferences to [`rusqlite::Connection`].
pub struct PooledSession<'p> {
    pool: &'p ConnectionPool,
    conn: Option<Connection>,
    timeout_changed: bool,
}

impl Deref for PooledSession<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
            .as_ref()
            .expect("connection is present until the session drops")
    }
}

impl DerefMut for PooledSession<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn
            .as_mut()
            .expect("connection is present until the session drops")
    }
}

impl Drop for PooledSession<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn, self.timeout_changed);
        }
    }
}

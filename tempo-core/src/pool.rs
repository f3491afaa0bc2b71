//! Connection pool: one write handle plus a fixed round-robin set of read
//! handles, all opened with identical pragmas.
//!
//! Writes use immediate-lock transactions (the write lock is taken up front,
//! so a later statement never hits a lock-upgrade failure under
//! busy_timeout). Reads run on deferred snapshots; WAL mode keeps them from
//! blocking the writer.

use crate::config::StoreConfig;
use crate::error::Result;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

pub struct ConnectionPool {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
}

impl ConnectionPool {
    /// Open the write handle and `read_pool_size` read handles.
    pub fn open(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        let path = path.as_ref();

        let writer = Connection::open(path)?;
        apply_pragmas(&writer, config)?;

        let mut readers = Vec::with_capacity(config.read_pool_size);
        for _ in 0..config.read_pool_size {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            apply_pragmas(&conn, config)?;
            readers.push(Mutex::new(conn));
        }

        debug!(
            readers = config.read_pool_size,
            "opened connection pool"
        );

        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            next_reader: AtomicUsize::new(0),
        })
    }

    /// Run `f` inside an immediate-lock transaction on the write handle.
    ///
    /// Commits on `Ok`; rolls back and propagates on `Err`. Every
    /// multi-statement write in the system goes through here.
    pub fn with_immediate_txn<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.writer.lock();
        let txn = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        match f(&txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            // Dropping the transaction rolls it back.
            Err(e) => Err(e),
        }
    }

    /// Run `f` with exclusive access to the raw write handle, outside any
    /// transaction. Reserved for maintenance passes (vacuum, checkpoints).
    pub fn with_writer<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.writer.lock();
        f(&conn)
    }

    /// Run `f` on the next read handle, selected round-robin.
    pub fn with_reader<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.next_reader();
        f(&conn)
    }

    fn next_reader(&self) -> MutexGuard<'_, Connection> {
        if self.readers.is_empty() {
            return self.writer.lock();
        }
        let idx = self.next_reader.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        self.readers[idx].lock()
    }

    pub fn reader_count(&self) -> usize {
        self.readers.len()
    }
}

/// Durability and concurrency pragmas, identical for every handle.
fn apply_pragmas(conn: &Connection, config: &StoreConfig) -> Result<()> {
    conn.busy_timeout(config.busy_timeout)?;
    // journal_mode returns a row; query it instead of pragma_update.
    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "OFF")?;
    conn.pragma_update(None, "cache_size", format!("-{}", config.cache_size_kib))?;
    conn.pragma_update(None, "auto_vacuum", "INCREMENTAL")?;
    Ok(())
}

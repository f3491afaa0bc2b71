//! High-level TempoDB API.
//!
//! [`Database`] wires together the three moving parts of a TempoDB
//! deployment: the entity store, the in-memory write queue, and the block
//! processor that periodically drains the queue into numbered blocks.
//! Writes are asynchronous by nature (staged now, committed at the next
//! block), so callers that need a committed view either run the background
//! processor or drive block closure themselves with [`Database::commit_pending`].

use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tempo_core::processor::{self, BlockProcessor};
use tempo_core::queue::WriteQueue;
use tempo_core::query::CacheStats;
use tempo_core::{
    is_reserved_attr, BlockNumber, Entity, EntityStore, Error, Receipt, Result, StoreConfig,
    WriteRequest,
};
use tracing::info;

pub use tempo_core::{Error as TempoError, NumericValue, StoreConfig as Config};

pub mod query;
pub use query::Query;

pub mod write;
pub use write::Write;

/// TempoDB database handle.
pub struct Database {
    store: Arc<EntityStore>,
    queue: Arc<WriteQueue>,
    processor: Mutex<BlockProcessor>,
    config: StoreConfig,
}

impl Database {
    /// Open (or create) a database at the specified path with defaults.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, StoreConfig::default())
    }

    /// Open (or create) a database with an explicit configuration.
    ///
    /// The background processor is not started; call
    /// [`Database::start_processor`] or drive blocks manually with
    /// [`Database::commit_pending`].
    pub fn open_with_config(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let store = Arc::new(EntityStore::open(&path, &config)?);
        let queue = Arc::new(WriteQueue::new(config.ops_per_transaction));
        queue.set_current_block(store.current_block()? + 1);

        info!(
            path = %path.as_ref().display(),
            current_block = store.current_block()?,
            "database opened"
        );

        let processor = Mutex::new(BlockProcessor::new(
            Arc::clone(&queue),
            Arc::clone(&store),
            config.block_interval,
            config.slow_block_threshold,
        ));

        Ok(Self {
            store,
            queue,
            processor,
            config,
        })
    }

    /// Stage a write and return its receipt id.
    ///
    /// The entity becomes durable and queryable when its block commits, not
    /// on return. The receipt id can be resolved with [`Database::receipt`]
    /// after commit.
    pub fn write(&self, request: WriteRequest) -> Result<String> {
        validate_write(&request)?;
        Ok(self.queue.enqueue(request))
    }

    /// Latest version of an entity by key, or `None`.
    pub fn get(&self, key: &str) -> Result<Option<Entity>> {
        if key.is_empty() {
            return Err(Error::InvalidArgument("entity key is empty".to_string()));
        }
        self.store.get_by_key(key)
    }

    /// Run an attribute query against the committed state.
    pub fn query(&self, query: Query) -> Result<Vec<Entity>> {
        let (filter, limit, offset) = query.into_parts();
        self.store.query(&filter, limit, offset)
    }

    /// Total versioned payload rows in the store.
    pub fn count(&self) -> Result<u64> {
        self.store.count()
    }

    /// Look up the acknowledgment record for a write id.
    pub fn receipt(&self, id: &str) -> Result<Option<Receipt>> {
        self.store.receipt(id)
    }

    /// Wipe all stored data and the plan cache. Staged writes survive.
    pub fn clean(&self) -> Result<()> {
        self.store.clean_all()
    }

    /// Checkpoint the WAL and reclaim free pages.
    pub fn vacuum(&self) -> Result<()> {
        self.store.vacuum()
    }

    /// Close the pending block now, synchronously. Returns the closed block
    /// number, or `None` when nothing was staged.
    ///
    /// Intended for tests and single-process tools; the background processor
    /// does the same thing on a timer.
    pub fn commit_pending(&self) -> Result<Option<BlockNumber>> {
        processor::process_block(&self.queue, &self.store, self.config.slow_block_threshold)
    }

    /// Start the background block processor.
    pub fn start_processor(&self) -> Result<()> {
        self.processor.lock().start()
    }

    /// Stop the background block processor and wait for it to exit.
    pub fn stop_processor(&self) {
        self.processor.lock().stop()
    }

    /// The persisted current block number.
    pub fn current_block(&self) -> Result<BlockNumber> {
        self.store.current_block()
    }

    /// Number of writes staged for the next block.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Query plan cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.store.plan_cache().stats()
    }

    /// Enable or disable the query plan cache at runtime.
    pub fn set_plan_cache_enabled(&self, enabled: bool) {
        self.store.plan_cache().set_enabled(enabled);
    }
}

/// Reject writes the queue would accept but the store cannot meaningfully
/// serve: missing identity fields, zero lifetime, or annotation names that
/// collide with the reserved `$`-prefixed synthetics.
fn validate_write(request: &WriteRequest) -> Result<()> {
    if request.key.is_empty() {
        return Err(Error::InvalidArgument("entity key is empty".to_string()));
    }
    if request.content_type.is_empty() {
        return Err(Error::InvalidArgument("content type is empty".to_string()));
    }
    if request.owner_address.is_empty() {
        return Err(Error::InvalidArgument(
            "owner address is empty".to_string(),
        ));
    }
    if request.expires_in == 0 {
        return Err(Error::InvalidArgument(
            "expires_in must be at least one block".to_string(),
        ));
    }
    for name in request
        .string_annotations
        .keys()
        .chain(request.numeric_annotations.keys())
    {
        if is_reserved_attr(name) {
            return Err(Error::InvalidArgument(format!(
                "annotation name '{name}' is reserved"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_db(dir: &TempDir) -> Database {
        Database::open(dir.path().join("api.db")).unwrap()
    }

    #[test]
    fn test_write_commit_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);

        let id = db
            .write(
                Write::new("e1")
                    .payload(b"body".as_ref())
                    .content_type("text/plain")
                    .owner("0xabc")
                    .expires_in(100)
                    .build(),
            )
            .unwrap();
        assert_eq!(db.queue_len(), 1);
        assert!(db.get("e1").unwrap().is_none());

        let block = db.commit_pending().unwrap().unwrap();
        assert_eq!(db.queue_len(), 0);

        let entity = db.get("e1").unwrap().unwrap();
        assert_eq!(entity.owner_address, "0xabc");

        let receipt = db.receipt(&id).unwrap().unwrap();
        assert_eq!(receipt.entity_key, "e1");
        assert_eq!(receipt.created_at_block, block);
    }

    #[test]
    fn test_invalid_writes_are_rejected() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);

        let cases = [
            Write::new("").content_type("t").owner("o").expires_in(1),
            Write::new("k").owner("o").expires_in(1),
            Write::new("k").content_type("t").expires_in(1),
            Write::new("k").content_type("t").owner("o"),
            Write::new("k")
                .content_type("t")
                .owner("o")
                .expires_in(1)
                .string_annotation("$owner", "spoof"),
            Write::new("k")
                .content_type("t")
                .owner("o")
                .expires_in(1)
                .numeric_annotation("$expiration", 1.0),
        ];
        for case in cases {
            let err = db.write(case.build()).unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)), "{err}");
            assert!(err.is_client_error());
        }
        assert_eq!(db.queue_len(), 0);
    }

    #[test]
    fn test_empty_key_get_is_invalid() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);
        assert!(matches!(
            db.get("").unwrap_err(),
            Error::InvalidArgument(_)
        ));
    }

    #[test]
    fn test_query_through_the_full_stack() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);

        for (key, pri) in [("a", 1.0), ("b", 5.0), ("c", 9.0)] {
            db.write(
                Write::new(key)
                    .content_type("text/plain")
                    .owner("0xabc")
                    .expires_in(100)
                    .numeric_annotation("pri", pri)
                    .build(),
            )
            .unwrap();
        }
        db.commit_pending().unwrap();

        let hits = db.query(Query::new().number_gte("pri", 5.0)).unwrap();
        let mut keys: Vec<&str> = hits.iter().map(|e| e.key.as_str()).collect();
        keys.sort();
        assert_eq!(keys, vec!["b", "c"]);
    }

    #[test]
    fn test_clean_preserves_staged_writes() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);

        db.write(
            Write::new("committed")
                .content_type("t")
                .owner("o")
                .expires_in(100)
                .build(),
        )
        .unwrap();
        db.commit_pending().unwrap();

        db.write(
            Write::new("staged")
                .content_type("t")
                .owner("o")
                .expires_in(100)
                .build(),
        )
        .unwrap();

        db.clean().unwrap();
        assert_eq!(db.count().unwrap(), 0);
        assert_eq!(db.queue_len(), 1);

        db.commit_pending().unwrap();
        assert!(db.get("staged").unwrap().is_some());
        assert!(db.get("committed").unwrap().is_none());
    }

    #[test]
    fn test_processor_lifecycle() {
        let dir = TempDir::new().unwrap();
        let db = Database::open_with_config(
            dir.path().join("api.db"),
            StoreConfig::default().with_block_interval(std::time::Duration::from_millis(10)),
        )
        .unwrap();

        db.start_processor().unwrap();
        db.write(
            Write::new("bg")
                .content_type("t")
                .owner("o")
                .expires_in(100)
                .build(),
        )
        .unwrap();

        for _ in 0..100 {
            if db.get("bg").unwrap().is_some() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        db.stop_processor();
        assert!(db.get("bg").unwrap().is_some());
    }
}

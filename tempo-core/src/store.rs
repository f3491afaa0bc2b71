//! The entity store engine: versioned inserts, point lookups, compiled
//! attribute queries, expiry, bulk clean and space reclamation.

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::pool::ConnectionPool;
use crate::query::filter::{self, Condition, ConditionParser, Filter};
use crate::query::{plan, PlanCache};
use crate::schema;
use crate::types::{
    BlockNumber, Entity, PendingWrite, Receipt, EXPIRATION_ATTR, OWNER_ATTR,
};
use bytes::Bytes;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

pub struct EntityStore {
    pool: Arc<ConnectionPool>,
    plan_cache: PlanCache,
    parser: ConditionParser,
}

impl EntityStore {
    /// Open (or create) a store at `path` and install the schema.
    pub fn open(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        config.validate().map_err(Error::InvalidArgument)?;

        let pool = Arc::new(ConnectionPool::open(path, config)?);
        pool.with_writer(|conn| schema::install(conn, config.bootstrap_ddl.as_deref()))?;

        Ok(Self {
            pool,
            plan_cache: PlanCache::new(config.plan_cache_enabled),
            parser: ConditionParser::new(),
        })
    }

    /// The authoritative persisted current block.
    pub fn current_block(&self) -> Result<BlockNumber> {
        self.pool.with_reader(|conn| schema::current_block(conn))
    }

    /// Insert a single entity's versioned rows in one immediate transaction.
    /// No receipt is written and the block counter is untouched.
    pub fn insert(&self, entity: &Entity) -> Result<()> {
        self.pool
            .with_immediate_txn(|txn| insert_entity_rows(txn, entity))
    }

    /// Persist a drained batch as one block: every entity's versioned rows,
    /// one receipt per write id, and the counter advance, all in a single
    /// immediate transaction. Either the whole block commits or none of it.
    pub fn insert_batch(&self, writes: &[PendingWrite], block: BlockNumber) -> Result<()> {
        self.pool.with_immediate_txn(|txn| {
            for write in writes {
                let mut entity = write.entity.clone();
                entity.created_at_block = block;
                entity.last_modified_at_block = block;
                insert_entity_rows(txn, &entity)?;

                txn.execute(
                    "INSERT OR REPLACE INTO entity_receipts (id, entity_key, created_at_block) \
                     VALUES (?1, ?2, ?3)",
                    params![write.id, entity.key, block as i64],
                )?;
            }
            schema::advance_block(txn, block)?;
            Ok(())
        })
    }

    /// Latest version for a key, by `from_block`, regardless of validity at
    /// the current block. `Ok(None)` for unknown keys, never an error.
    pub fn get_by_key(&self, key: &str) -> Result<Option<Entity>> {
        let start = Instant::now();
        let entity = self.pool.with_reader(|conn| {
            let mut stmt = conn.prepare_cached(&plan::point_lookup_sql())?;
            Ok(stmt.query_row([key], row_to_entity).optional()?)
        })?;

        debug!(
            query_type = "get_by_key",
            duration_ms = start.elapsed().as_millis() as u64,
            param_count = 1u64,
            found = entity.is_some(),
            "query audit"
        );
        Ok(entity)
    }

    /// Run an attribute filter against the store at the current block.
    ///
    /// The filter goes through its textual wire form, the permissive parser,
    /// structural sorting, the plan cache, and finally a pooled read handle.
    /// Rows with undecodable annotation blobs come back with that annotation
    /// set empty instead of failing the whole result.
    pub fn query(&self, filter: &Filter, limit: u64, offset: u64) -> Result<Vec<Entity>> {
        let start = Instant::now();

        let text = filter.to_query_string();
        let mut conditions = self.parser.parse(&text);
        filter::sort_conditions(&mut conditions);

        let current_block = self.current_block()?;
        let template = self.plan_cache.get_or_compile(&conditions, limit, offset);
        let params = plan::bind(&template, current_block, &conditions, limit, offset);

        let entities = self.pool.with_reader(|conn| {
            let mut stmt = conn.prepare_cached(&template.sql)?;
            let rows = stmt.query_map(params_from_iter(params.iter()), row_to_entity)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })?;

        debug!(
            query_type = "query_entities",
            duration_ms = start.elapsed().as_millis() as u64,
            param_count = params.len(),
            conditions = conditions.len(),
            results = entities.len(),
            "query audit"
        );
        Ok(entities)
    }

    /// Total versioned payload rows.
    pub fn count(&self) -> Result<u64> {
        self.pool.with_reader(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM payloads", [], |r| r.get(0))?;
            Ok(n as u64)
        })
    }

    /// Delete payload rows whose validity ended at `block`. Attribute rows
    /// for the same interval are deliberately left in place.
    pub fn remove_expired(&self, block: BlockNumber) -> Result<usize> {
        self.pool.with_immediate_txn(|txn| {
            let removed = txn.execute(
                "DELETE FROM payloads WHERE to_block = ?1",
                [block as i64],
            )?;
            Ok(removed)
        })
    }

    /// Wipe all four tables in one transaction and drop every cached plan.
    pub fn clean_all(&self) -> Result<()> {
        self.pool.with_immediate_txn(|txn| {
            txn.execute("DELETE FROM payloads", [])?;
            txn.execute("DELETE FROM string_attributes", [])?;
            txn.execute("DELETE FROM numeric_attributes", [])?;
            txn.execute("DELETE FROM entity_receipts", [])?;
            Ok(())
        })?;
        self.plan_cache.clear();
        Ok(())
    }

    /// Checkpoint the WAL and reclaim free pages.
    ///
    /// Switches to a rollback journal for the reclaim pass; the original
    /// journal mode is restored even when the reclaim step fails.
    pub fn vacuum(&self) -> Result<()> {
        self.pool.with_writer(|conn| {
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
            conn.query_row("PRAGMA journal_mode = DELETE", [], |_| Ok(()))?;

            let reclaim = conn.execute_batch("VACUUM");
            let restore = conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()));

            reclaim?;
            restore?;
            Ok(())
        })
    }

    /// Look up the acknowledgment record for a write id.
    pub fn receipt(&self, id: &str) -> Result<Option<Receipt>> {
        self.pool.with_reader(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, entity_key, created_at_block \
                     FROM entity_receipts WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(Receipt {
                            id: row.get(0)?,
                            entity_key: row.get(1)?,
                            created_at_block: row.get::<_, i64>(2)? as BlockNumber,
                        })
                    },
                )
                .optional()?)
        })
    }

    pub fn plan_cache(&self) -> &PlanCache {
        &self.plan_cache
    }

    /// Parse a raw filter string into conditions (the permissive wire-form
    /// parser); exposed for diagnostics and tests.
    pub fn parse_filter(&self, text: &str) -> Vec<Condition> {
        self.parser.parse(text)
    }
}

/// Insert one entity's versioned rows: the payload row, one attribute row
/// per annotation, and the `$owner` / `$expiration` synthetics. A rewrite of
/// the same key in the same block replaces the earlier rows
/// (last-writer-wins within a block).
fn insert_entity_rows(conn: &Connection, entity: &Entity) -> Result<()> {
    let from_block = entity.last_modified_at_block as i64;
    let to_block = entity.expires_at as i64;

    let string_json = serde_json::to_string(&entity.string_annotations)?;
    let numeric_json = serde_json::to_string(&entity.numeric_annotations)?;

    conn.execute(
        "INSERT OR REPLACE INTO payloads \
         (entity_key, from_block, to_block, payload, content_type, \
          string_attributes_json, numeric_attributes_json) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entity.key,
            from_block,
            to_block,
            entity.payload.as_ref(),
            entity.content_type,
            string_json,
            numeric_json
        ],
    )?;

    conn.execute(
        "DELETE FROM string_attributes WHERE entity_key = ?1 AND from_block = ?2",
        params![entity.key, from_block],
    )?;
    conn.execute(
        "DELETE FROM numeric_attributes WHERE entity_key = ?1 AND from_block = ?2",
        params![entity.key, from_block],
    )?;

    let mut insert_string = conn.prepare_cached(
        "INSERT INTO string_attributes (entity_key, from_block, to_block, key, value) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (key, value) in &entity.string_annotations {
        insert_string.execute(params![entity.key, from_block, to_block, key, value])?;
    }
    insert_string.execute(params![
        entity.key,
        from_block,
        to_block,
        OWNER_ATTR,
        entity.owner_address
    ])?;

    let mut insert_numeric = conn.prepare_cached(
        "INSERT INTO numeric_attributes (entity_key, from_block, to_block, key, value) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (key, value) in &entity.numeric_annotations {
        insert_numeric.execute(params![entity.key, from_block, to_block, key, value])?;
    }
    insert_numeric.execute(params![
        entity.key,
        from_block,
        to_block,
        EXPIRATION_ATTR,
        to_block as f64
    ])?;

    Ok(())
}

/// Map a result row onto an [`Entity`]. Annotation blobs decode tolerantly:
/// a malformed blob is logged and that annotation set comes back empty.
fn row_to_entity(row: &Row<'_>) -> rusqlite::Result<Entity> {
    let key: String = row.get(0)?;
    let from_block: i64 = row.get(1)?;
    let to_block: i64 = row.get(2)?;
    let payload: Option<Vec<u8>> = row.get(3)?;
    let content_type: String = row.get(4)?;
    let string_json: String = row.get(5)?;
    let numeric_json: String = row.get(6)?;
    let owner_address: Option<String> = row.get(7)?;
    let expires_at: Option<f64> = row.get(8)?;

    let string_annotations: HashMap<String, String> = match serde_json::from_str(&string_json) {
        Ok(map) => map,
        Err(e) => {
            warn!(entity_key = %key, error = %e, "undecodable string annotation blob");
            HashMap::new()
        }
    };
    let numeric_annotations: HashMap<String, f64> = match serde_json::from_str(&numeric_json) {
        Ok(map) => map,
        Err(e) => {
            warn!(entity_key = %key, error = %e, "undecodable numeric annotation blob");
            HashMap::new()
        }
    };

    Ok(Entity {
        key,
        payload: payload.map(Bytes::from).unwrap_or_default(),
        content_type,
        owner_address: owner_address.unwrap_or_default(),
        string_annotations,
        numeric_annotations,
        expires_at: expires_at.map(|f| f as BlockNumber).unwrap_or(to_block as BlockNumber),
        created_at_block: from_block as BlockNumber,
        last_modified_at_block: from_block as BlockNumber,
        deleted: false,
        transaction_index_in_block: 0,
        operation_index_in_transaction: 0,
    })
}

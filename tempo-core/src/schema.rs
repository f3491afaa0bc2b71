//! On-disk relational schema: versioned attribute tables, the receipt
//! ledger, and the singleton block counter.

use crate::error::{Error, Result};
use crate::types::BlockNumber;
use rusqlite::{Connection, OptionalExtension};

/// Built-in DDL for the three versioned tables and the block counter.
/// Idempotent; safe to run on every open.
const CORE_DDL: &str = "
CREATE TABLE IF NOT EXISTS payloads (
    entity_key              TEXT    NOT NULL,
    from_block              INTEGER NOT NULL,
    to_block                INTEGER NOT NULL,
    payload                 BLOB,
    content_type            TEXT    NOT NULL DEFAULT '',
    string_attributes_json  TEXT    NOT NULL DEFAULT '{}',
    numeric_attributes_json TEXT    NOT NULL DEFAULT '{}',
    PRIMARY KEY (entity_key, from_block)
);
CREATE INDEX IF NOT EXISTS idx_payloads_to_block ON payloads (to_block);

CREATE TABLE IF NOT EXISTS string_attributes (
    entity_key TEXT    NOT NULL,
    from_block INTEGER NOT NULL,
    to_block   INTEGER NOT NULL,
    key        TEXT    NOT NULL,
    value      TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_string_attributes_kv
    ON string_attributes (key, value);
CREATE INDEX IF NOT EXISTS idx_string_attributes_entity
    ON string_attributes (entity_key, from_block);

CREATE TABLE IF NOT EXISTS numeric_attributes (
    entity_key TEXT    NOT NULL,
    from_block INTEGER NOT NULL,
    to_block   INTEGER NOT NULL,
    key        TEXT    NOT NULL,
    value      REAL    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_numeric_attributes_kv
    ON numeric_attributes (key, value);
CREATE INDEX IF NOT EXISTS idx_numeric_attributes_entity
    ON numeric_attributes (entity_key, from_block);

CREATE TABLE IF NOT EXISTS last_block (
    id    INTEGER PRIMARY KEY CHECK (id = 1),
    block INTEGER NOT NULL
);
";

/// Receipt ledger DDL, appended unconditionally after any bootstrap DDL.
const RECEIPTS_DDL: &str = "
CREATE TABLE IF NOT EXISTS entity_receipts (
    id               TEXT PRIMARY KEY,
    entity_key       TEXT    NOT NULL,
    created_at_block INTEGER NOT NULL
);
";

/// Install the schema on a fresh or existing database.
///
/// A caller-supplied bootstrap DDL text runs first when provided; the
/// built-in DDL and the receipt-table DDL always follow. The block counter
/// is seeded to 1 only when absent.
pub fn install(conn: &Connection, bootstrap_ddl: Option<&str>) -> Result<()> {
    if let Some(ddl) = bootstrap_ddl {
        conn.execute_batch(ddl)?;
    }
    conn.execute_batch(CORE_DDL)?;
    conn.execute_batch(RECEIPTS_DDL)?;
    conn.execute(
        "INSERT OR IGNORE INTO last_block (id, block) VALUES (1, 1)",
        [],
    )?;
    Ok(())
}

/// Read the authoritative current block from the persisted counter.
pub fn current_block(conn: &Connection) -> Result<BlockNumber> {
    let block: Option<i64> = conn
        .query_row("SELECT block FROM last_block WHERE id = 1", [], |row| {
            row.get(0)
        })
        .optional()?;

    match block {
        Some(b) => Ok(b as BlockNumber),
        None => Err(Error::NotInitialized(
            "block counter row is missing".to_string(),
        )),
    }
}

/// Advance the persisted counter. The counter is monotonically
/// non-decreasing; a lagging value is ignored rather than written back.
pub fn advance_block(conn: &Connection, block: BlockNumber) -> Result<()> {
    conn.execute(
        "UPDATE last_block SET block = ?1 WHERE id = 1 AND block <= ?1",
        [block as i64],
    )?;
    Ok(())
}

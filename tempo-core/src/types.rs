use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Block number - monotonic commit unit
pub type BlockNumber = u64;

/// Reserved string attribute carrying the entity's owner address.
pub const OWNER_ATTR: &str = "$owner";

/// Reserved numeric attribute carrying the entity's expiry block.
pub const EXPIRATION_ATTR: &str = "$expiration";

/// Returns true for attribute names reserved for synthetic attributes.
pub fn is_reserved_attr(name: &str) -> bool {
    name.starts_with('$')
}

/// A key-addressed record versioned over block ranges.
///
/// Every write produces one versioned row per table scoped by the half-open
/// validity interval `[from_block, to_block)`; an entity is never updated in
/// place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub key: String,
    pub payload: Bytes,
    pub content_type: String,
    pub owner_address: String,
    pub string_annotations: HashMap<String, String>,
    pub numeric_annotations: HashMap<String, f64>,
    /// Absolute block number at which the entity lapses (`to_block`).
    pub expires_at: BlockNumber,
    pub created_at_block: BlockNumber,
    pub last_modified_at_block: BlockNumber,
    /// Carried on the entity but unused by the schema (no soft-delete).
    pub deleted: bool,
    pub transaction_index_in_block: u32,
    pub operation_index_in_transaction: u32,
}

/// A numeric annotation value as supplied by a caller: either a literal
/// number, or an operator-prefixed expression string such as `">=8"` (only
/// meaningful in query filters; on the write path expressions are parsed
/// best-effort as plain numbers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericValue {
    Number(f64),
    Expr(String),
}

/// A request to create one entity, staged through the write queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteRequest {
    pub key: String,
    /// Blocks from the current block until expiration.
    pub expires_in: u64,
    pub payload: Bytes,
    pub content_type: String,
    pub deleted: bool,
    pub owner_address: String,
    pub string_annotations: HashMap<String, String>,
    pub numeric_annotations: HashMap<String, NumericValue>,
}

/// An entity staged in the write queue, tagged with its write id.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub id: String,
    pub entity: Entity,
}

/// Append-only acknowledgment record: write id -> (entity key, commit block).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: String,
    pub entity_key: String,
    pub created_at_block: BlockNumber,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_attr_names() {
        assert!(is_reserved_attr(OWNER_ATTR));
        assert!(is_reserved_attr(EXPIRATION_ATTR));
        assert!(is_reserved_attr("$anything"));
        assert!(!is_reserved_attr("tag"));
    }

    #[test]
    fn test_numeric_value_deserializes_untagged() {
        let n: NumericValue = serde_json::from_str("5.5").unwrap();
        assert_eq!(n, NumericValue::Number(5.5));

        let e: NumericValue = serde_json::from_str("\">=8\"").unwrap();
        assert_eq!(e, NumericValue::Expr(">=8".to_string()));
    }
}

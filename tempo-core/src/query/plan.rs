//! SQL synthesis: a pure function from parsed conditions to an executable
//! plan (SQL text plus an ordered parameter skeleton).
//!
//! Each condition becomes a named relation selecting the candidate
//! `(entity_key, from_block)` set from its attribute table; multi-condition
//! filters fold those relations pairwise with INTERSECT, and the final stage
//! deduplicates before joining back to `payloads`. Attribute predicates live
//! in per-type tables to keep indexes narrow, so candidate-set intersection
//! replaces one wide multi-join that would blow up when entities carry many
//! annotations.

use crate::query::filter::Condition;
use crate::types::{BlockNumber, EXPIRATION_ATTR, OWNER_ATTR};

/// One positional parameter in a compiled plan. Values are bound per query;
/// the slot list is part of the cached template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// The caller's current block number.
    CurrentBlock,
    /// The attribute name of condition `i` (in structural order).
    Key(usize),
    /// The literal value of condition `i` (in structural order).
    Value(usize),
    Limit,
    Offset,
}

/// A compiled, value-independent query template.
#[derive(Debug, Clone)]
pub struct PlanTemplate {
    pub sql: String,
    pub slots: Vec<Slot>,
}

/// Columns surfaced by every entity query; owner and expiry come from the
/// synthetic attribute rows.
const ENTITY_COLUMNS: &str = "p.entity_key, p.from_block, p.to_block, p.payload, \
     p.content_type, p.string_attributes_json, p.numeric_attributes_json, \
     owner.value AS owner_address, expiry.value AS expires_at";

/// Point lookup: the latest versioned row for a key by `from_block`,
/// independent of current-block validity (expiry deletes rows physically,
/// so the latest present row is the latest valid one in steady state).
pub(crate) fn point_lookup_sql() -> String {
    format!(
        "SELECT {ENTITY_COLUMNS} \
         FROM payloads p \
         {joins} \
         WHERE p.entity_key = ? \
         ORDER BY p.from_block DESC \
         LIMIT 1",
        joins = synthetic_joins(),
    )
}

fn synthetic_joins() -> String {
    format!(
        "LEFT JOIN string_attributes owner \
           ON owner.entity_key = p.entity_key \
          AND owner.from_block = p.from_block \
          AND owner.key = '{OWNER_ATTR}' \
         LEFT JOIN numeric_attributes expiry \
           ON expiry.entity_key = p.entity_key \
          AND expiry.from_block = p.from_block \
          AND expiry.key = '{EXPIRATION_ATTR}'"
    )
}

/// Compile sorted conditions into a plan template.
///
/// Conditions must already be in structural order (see
/// [`crate::query::filter::sort_conditions`]); `Slot::Key(i)` /
/// `Slot::Value(i)` index into that order.
pub fn compile(conditions: &[Condition]) -> PlanTemplate {
    if conditions.is_empty() {
        return compile_unconditional();
    }

    let mut sql = String::from("WITH ");
    let mut slots = Vec::new();

    // One candidate relation per condition.
    for (i, condition) in conditions.iter().enumerate() {
        let table = match condition {
            Condition::StringEq { .. } => "string_attributes",
            Condition::Numeric { .. } => "numeric_attributes",
        };
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&format!(
            "cond_{i} AS (\
               SELECT a.entity_key, a.from_block \
               FROM {table} a \
               JOIN payloads p \
                 ON p.entity_key = a.entity_key AND p.from_block = a.from_block \
               WHERE p.from_block <= ? AND p.to_block > ? \
                 AND a.key = ? AND a.value {op} ?)",
            op = condition.op_token(),
        ));
        slots.push(Slot::CurrentBlock);
        slots.push(Slot::CurrentBlock);
        slots.push(Slot::Key(i));
        slots.push(Slot::Value(i));
    }

    // Fold candidate relations left-to-right with pairwise INTERSECT.
    let mut current = "cond_0".to_string();
    for i in 1..conditions.len() {
        let stage = format!("isect_{i}");
        sql.push_str(&format!(
            ", {stage} AS (\
               SELECT entity_key, from_block FROM {current} \
               INTERSECT \
               SELECT entity_key, from_block FROM cond_{i})"
        ));
        current = stage;
    }

    // The final stage guarantees a distinct key set before the join back.
    sql.push_str(&format!(
        ", matched AS (SELECT DISTINCT entity_key, from_block FROM {current}) "
    ));

    sql.push_str(&format!(
        "SELECT {ENTITY_COLUMNS} \
         FROM matched m \
         JOIN payloads p \
           ON p.entity_key = m.entity_key AND p.from_block = m.from_block \
         {joins} \
         WHERE p.from_block <= ? AND p.to_block > ? \
         ORDER BY p.from_block, p.entity_key \
         LIMIT ? OFFSET ?",
        joins = synthetic_joins(),
    ));
    slots.extend([Slot::CurrentBlock, Slot::CurrentBlock, Slot::Limit, Slot::Offset]);

    PlanTemplate { sql, slots }
}

/// The zero-condition "list everything" plan. Its validity window is
/// expressed with `to_block - 1`, one block tighter than the conditioned
/// path; preserved as-is from the original behavior.
fn compile_unconditional() -> PlanTemplate {
    let sql = format!(
        "SELECT {ENTITY_COLUMNS} \
         FROM payloads p \
         {joins} \
         WHERE p.from_block <= ? AND p.to_block - 1 > ? \
         ORDER BY p.from_block, p.entity_key \
         LIMIT ? OFFSET ?",
        joins = synthetic_joins(),
    );
    PlanTemplate {
        sql,
        slots: vec![Slot::CurrentBlock, Slot::CurrentBlock, Slot::Limit, Slot::Offset],
    }
}

/// Bind a template's slots to concrete parameter values.
pub fn bind(
    template: &PlanTemplate,
    current_block: BlockNumber,
    conditions: &[Condition],
    limit: u64,
    offset: u64,
) -> Vec<rusqlite::types::Value> {
    use rusqlite::types::Value;

    template
        .slots
        .iter()
        .map(|slot| match *slot {
            Slot::CurrentBlock => Value::Integer(current_block as i64),
            Slot::Key(i) => Value::Text(conditions[i].key().to_string()),
            Slot::Value(i) => match &conditions[i] {
                Condition::StringEq { value, .. } => Value::Text(value.clone()),
                Condition::Numeric { value, .. } => Value::Real(*value),
            },
            Slot::Limit => Value::Integer(limit as i64),
            Slot::Offset => Value::Integer(offset as i64),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::filter::{ConditionParser, NumericOp};

    fn conditions(input: &str) -> Vec<Condition> {
        ConditionParser::new().parse(input)
    }

    #[test]
    fn test_unconditional_plan_shape() {
        let plan = compile(&[]);
        assert!(plan.sql.contains("FROM payloads p"));
        assert!(!plan.sql.contains("INTERSECT"));
        // The lone zero-condition path keeps its off-by-one validity window.
        assert!(plan.sql.contains("p.to_block - 1 > ?"));
        assert_eq!(
            plan.slots,
            vec![Slot::CurrentBlock, Slot::CurrentBlock, Slot::Limit, Slot::Offset]
        );
    }

    #[test]
    fn test_single_condition_has_no_intersect() {
        let plan = compile(&conditions(r#"tag = "x""#));
        assert!(plan.sql.contains("cond_0"));
        assert!(!plan.sql.contains("INTERSECT"));
        assert!(plan.sql.contains("SELECT DISTINCT entity_key, from_block FROM cond_0"));
        assert!(plan.sql.contains("string_attributes a"));
    }

    #[test]
    fn test_intersections_chain_pairwise() {
        let plan = compile(&conditions(r#"tag = "x" AND pri = 1 AND size >= 8"#));
        assert_eq!(plan.sql.matches("INTERSECT").count(), 2);
        assert!(plan.sql.contains("isect_1"));
        assert!(plan.sql.contains("isect_2"));
        assert!(plan.sql.contains("FROM isect_1 "));
        assert!(plan.sql.contains("SELECT DISTINCT entity_key, from_block FROM isect_2"));
    }

    #[test]
    fn test_operator_lands_in_sql() {
        let plan = compile(&conditions("size >= 8"));
        assert!(plan.sql.contains("a.value >= ?"));
        assert!(plan.sql.contains("numeric_attributes a"));
        // Conditioned validity has no off-by-one.
        assert!(plan.sql.contains("p.to_block > ?"));
        assert!(!plan.sql.contains("p.to_block - 1"));
    }

    #[test]
    fn test_slot_count_matches_placeholders() {
        for input in ["", r#"tag = "x""#, r#"tag = "x" AND pri >= 2"#] {
            let conds = conditions(input);
            let plan = compile(&conds);
            assert_eq!(plan.sql.matches('?').count(), plan.slots.len());

            let params = bind(&plan, 42, &conds, 10, 0);
            assert_eq!(params.len(), plan.slots.len());
        }
    }

    #[test]
    fn test_bind_values_follow_condition_order() {
        let conds = vec![
            Condition::StringEq {
                key: "tag".to_string(),
                value: "x".to_string(),
            },
            Condition::Numeric {
                key: "pri".to_string(),
                op: NumericOp::Ge,
                value: 2.0,
            },
        ];
        let plan = compile(&conds);
        let params = bind(&plan, 9, &conds, 5, 1);

        use rusqlite::types::Value;
        assert!(params.contains(&Value::Text("tag".to_string())));
        assert!(params.contains(&Value::Text("x".to_string())));
        assert!(params.contains(&Value::Text("pri".to_string())));
        assert!(params.contains(&Value::Real(2.0)));
        assert_eq!(params.last(), Some(&Value::Integer(1)));
    }
}

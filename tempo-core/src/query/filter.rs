//! The filter language: structured filters rendered to their textual wire
//! form, and the permissive parser turning that text back into conditions.
//!
//! The language is deliberately flat: clauses joined by literal ` AND `, no
//! OR, no parentheses, no nesting. Unparseable clauses are dropped, not
//! surfaced as errors.

use crate::types::{NumericValue, OWNER_ATTR};
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

/// Numeric comparison operators supported by the filter language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NumericOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl NumericOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            NumericOp::Eq => "=",
            NumericOp::Ne => "!=",
            NumericOp::Gt => ">",
            NumericOp::Ge => ">=",
            NumericOp::Lt => "<",
            NumericOp::Le => "<=",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "=" => Some(NumericOp::Eq),
            "!=" => Some(NumericOp::Ne),
            ">" => Some(NumericOp::Gt),
            ">=" => Some(NumericOp::Ge),
            "<" => Some(NumericOp::Lt),
            "<=" => Some(NumericOp::Le),
            _ => None,
        }
    }
}

/// One parsed filter clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    StringEq { key: String, value: String },
    Numeric { key: String, op: NumericOp, value: f64 },
}

impl Condition {
    /// Attribute table discriminator, part of the structural cache key.
    pub fn kind(&self) -> u8 {
        match self {
            Condition::StringEq { .. } => b's',
            Condition::Numeric { .. } => b'n',
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Condition::StringEq { key, .. } => key,
            Condition::Numeric { key, .. } => key,
        }
    }

    /// Operator token, part of the structural cache key.
    pub fn op_token(&self) -> &'static str {
        match self {
            Condition::StringEq { .. } => "=",
            Condition::Numeric { op, .. } => op.as_sql(),
        }
    }
}

/// Sort conditions by structure: kind, then attribute name, then operator.
///
/// The plan cache keys on this order, and compiled templates bind values in
/// this order, so attribute order in the caller's filter never affects
/// either.
pub fn sort_conditions(conditions: &mut [Condition]) {
    conditions.sort_by(|a, b| {
        (a.kind(), a.key(), a.op_token()).cmp(&(b.kind(), b.key(), b.op_token()))
    });
}

/// A structured attribute filter as accepted at the store boundary.
///
/// The owner filter is an equality on the reserved `$owner` string
/// attribute. Numeric values may be literal numbers (equality) or
/// operator-prefixed expression strings such as `">=8"`.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub owner_address: Option<String>,
    pub string_annotations: HashMap<String, String>,
    pub numeric_annotations: HashMap<String, NumericValue>,
}

impl Filter {
    /// Render the filter into its textual wire form, e.g.
    /// `$owner = "0xabc" AND tag = "x" AND pri >= 8`.
    ///
    /// Clauses are emitted in sorted attribute order so the same filter
    /// always renders the same string.
    pub fn to_query_string(&self) -> String {
        let mut clauses = Vec::new();

        if let Some(owner) = &self.owner_address {
            if !owner.is_empty() {
                clauses.push(format!("{} = \"{}\"", OWNER_ATTR, escape(owner)));
            }
        }

        let mut string_keys: Vec<&String> = self.string_annotations.keys().collect();
        string_keys.sort();
        for key in string_keys {
            let value = &self.string_annotations[key];
            clauses.push(format!("{} = \"{}\"", key, escape(value)));
        }

        let mut numeric_keys: Vec<&String> = self.numeric_annotations.keys().collect();
        numeric_keys.sort();
        for key in numeric_keys {
            match &self.numeric_annotations[key] {
                NumericValue::Number(n) => clauses.push(format!("{} = {}", key, n)),
                NumericValue::Expr(expr) => {
                    let expr = expr.trim();
                    if expr.starts_with(['>', '<', '!']) {
                        clauses.push(format!("{} {}", key, expr));
                    } else if let Ok(n) = expr.parse::<f64>() {
                        // Bare numeric expressions fall back to equality.
                        clauses.push(format!("{} = {}", key, n));
                    } else if !expr.is_empty() {
                        // Anything else passes through; the parser decides
                        // whether it survives.
                        clauses.push(format!("{} {}", key, expr));
                    }
                }
            }
        }

        clauses.join(" AND ")
    }

    pub fn is_empty(&self) -> bool {
        self.owner_address.as_deref().map_or(true, str::is_empty)
            && self.string_annotations.is_empty()
            && self.numeric_annotations.is_empty()
    }
}

/// Permissive parser for the textual filter form.
pub struct ConditionParser {
    equality: Regex,
    range: Regex,
}

impl ConditionParser {
    pub fn new() -> Self {
        Self {
            // key = "string" | key = number
            equality: Regex::new(
                r#"^\s*([^\s=<>!]+)\s*=\s*(?:"((?:[^"\\]|\\.)*)"|(-?[0-9]+(?:\.[0-9]+)?))\s*$"#,
            )
            .expect("equality pattern is valid"),
            // key <op> number
            range: Regex::new(
                r"^\s*([^\s=<>!]+)\s*(>=|<=|!=|>|<)\s*(-?[0-9]+(?:\.[0-9]+)?)\s*$",
            )
            .expect("range pattern is valid"),
        }
    }

    /// Split on literal ` AND ` and parse each clause; clauses matching
    /// neither form are silently dropped.
    pub fn parse(&self, input: &str) -> Vec<Condition> {
        let input = input.trim();
        if input.is_empty() {
            return Vec::new();
        }

        let mut conditions = Vec::new();
        for clause in input.split(" AND ") {
            if let Some(condition) = self.parse_clause(clause) {
                conditions.push(condition);
            } else {
                debug!(clause, "dropping unparseable filter clause");
            }
        }
        conditions
    }

    fn parse_clause(&self, clause: &str) -> Option<Condition> {
        if let Some(caps) = self.equality.captures(clause) {
            let key = caps[1].to_string();
            if let Some(quoted) = caps.get(2) {
                return Some(Condition::StringEq {
                    key,
                    value: unescape(quoted.as_str()),
                });
            }
            if let Some(number) = caps.get(3) {
                let value = number.as_str().parse().ok()?;
                return Some(Condition::Numeric {
                    key,
                    op: NumericOp::Eq,
                    value,
                });
            }
        }

        if let Some(caps) = self.range.captures(clause) {
            let key = caps[1].to_string();
            let op = NumericOp::parse(&caps[2])?;
            let value = caps[3].parse().ok()?;
            return Some(Condition::Numeric { key, op, value });
        }

        None
    }
}

impl Default for ConditionParser {
    fn default() -> Self {
        Self::new()
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

//! Query builder for attribute filters.
//!
//! Provides a high-level API for querying entities by owner and annotations.

use tempo_core::query::Filter;
use tempo_core::NumericValue;

const DEFAULT_LIMIT: u64 = 100;

/// Query builder.
///
/// ```no_run
/// use tempo_api::Query;
///
/// let query = Query::new()
///     .owner("0xabc")
///     .string_eq("status", "open")
///     .number_gte("amount", 50.0)
///     .limit(20);
/// ```
#[derive(Debug, Clone)]
pub struct Query {
    filter: Filter,
    limit: u64,
    offset: u64,
}

impl Query {
    pub fn new() -> Self {
        Self {
            filter: Filter::default(),
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }

    /// Restrict results to entities owned by this address.
    pub fn owner(mut self, owner_address: impl Into<String>) -> Self {
        self.filter.owner_address = Some(owner_address.into());
        self
    }

    /// Require a string annotation to equal `value`.
    pub fn string_eq(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter
            .string_annotations
            .insert(key.into(), value.into());
        self
    }

    /// Require a numeric annotation to equal `value`.
    pub fn number_eq(mut self, key: impl Into<String>, value: f64) -> Self {
        self.filter
            .numeric_annotations
            .insert(key.into(), NumericValue::Number(value));
        self
    }

    pub fn number_gt(self, key: impl Into<String>, value: f64) -> Self {
        self.number_expr(key, format!(">{}", value))
    }

    pub fn number_gte(self, key: impl Into<String>, value: f64) -> Self {
        self.number_expr(key, format!(">={}", value))
    }

    pub fn number_lt(self, key: impl Into<String>, value: f64) -> Self {
        self.number_expr(key, format!("<{}", value))
    }

    pub fn number_lte(self, key: impl Into<String>, value: f64) -> Self {
        self.number_expr(key, format!("<={}", value))
    }

    pub fn number_ne(self, key: impl Into<String>, value: f64) -> Self {
        self.number_expr(key, format!("!={}", value))
    }

    /// Attach a raw operator expression such as `">=8"`. Expressions that
    /// fail to parse downstream are dropped from the filter, not rejected.
    pub fn number_expr(mut self, key: impl Into<String>, expr: impl Into<String>) -> Self {
        self.filter
            .numeric_annotations
            .insert(key.into(), NumericValue::Expr(expr.into()));
        self
    }

    /// Maximum number of results (default 100).
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Number of results to skip.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub(crate) fn into_parts(self) -> (Filter, u64, u64) {
        (self.filter, self.limit, self.offset)
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_renders_expected_filter() {
        let query = Query::new()
            .owner("0xabc")
            .string_eq("tag", "x")
            .number_gte("pri", 2.0);

        let text = query.filter().to_query_string();
        assert_eq!(text, "$owner = \"0xabc\" AND tag = \"x\" AND pri >=2");
    }

    #[test]
    fn test_defaults() {
        let (filter, limit, offset) = Query::new().into_parts();
        assert!(filter.is_empty());
        assert_eq!(limit, DEFAULT_LIMIT);
        assert_eq!(offset, 0);
    }
}

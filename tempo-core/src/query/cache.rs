//! Structural query plan cache.
//!
//! Keys are built from the filter's shape only: sorted
//! `(type, attribute, operator)` triples plus limit and offset, never
//! literal values. Structurally identical queries with different literals
//! reuse one template and only rebuild the parameter list.

use crate::query::filter::Condition;
use crate::query::plan::{self, PlanTemplate};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PlanKey {
    shape: Vec<(u8, String, &'static str)>,
    limit: u64,
    offset: u64,
}

impl PlanKey {
    /// Conditions are expected in structural order already.
    fn new(conditions: &[Condition], limit: u64, offset: u64) -> Self {
        Self {
            shape: conditions
                .iter()
                .map(|c| (c.kind(), c.key().to_string(), c.op_token()))
                .collect(),
            limit,
            offset,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

pub struct PlanCache {
    enabled: AtomicBool,
    plans: RwLock<HashMap<PlanKey, Arc<PlanTemplate>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PlanCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            plans: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Fetch the cached template for this filter structure, compiling and
    /// inserting on miss. With the cache disabled every call compiles fresh.
    pub fn get_or_compile(
        &self,
        conditions: &[Condition],
        limit: u64,
        offset: u64,
    ) -> Arc<PlanTemplate> {
        if !self.enabled.load(Ordering::Relaxed) {
            return Arc::new(plan::compile(conditions));
        }

        let key = PlanKey::new(conditions, limit, offset);
        if let Some(template) = self.plans.read().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(template);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let template = Arc::new(plan::compile(conditions));
        self.plans
            .write()
            .entry(key)
            .or_insert_with(|| Arc::clone(&template));
        template
    }

    /// Enable or disable the cache; disabling clears it.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        if !enabled {
            self.clear();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Drop every cached plan. Called on bulk-clean: stale templates are a
    /// safety concern, not a correctness one, since plan shape depends only
    /// on filter structure.
    pub fn clear(&self) {
        let mut plans = self.plans.write();
        if !plans.is_empty() {
            debug!(entries = plans.len(), "clearing query plan cache");
        }
        plans.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.plans.read().len(),
        }
    }
}

//! The query compiler: a flat `AND`-only attribute filter language parsed
//! into conditions, compiled into an intersection plan over the attribute
//! tables, and cached by filter structure.

pub mod filter;
pub mod plan;
pub mod cache;

pub use cache::{CacheStats, PlanCache};
pub use filter::{Condition, ConditionParser, Filter, NumericOp};
pub use plan::{PlanTemplate, Slot};

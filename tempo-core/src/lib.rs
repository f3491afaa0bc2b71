pub mod error;
pub mod types;
pub mod config;
pub mod schema;
pub mod pool;
pub mod queue;
pub mod query;
pub mod store;
pub mod processor;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use store::EntityStore;
pub use types::*;

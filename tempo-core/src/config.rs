use std::time::Duration;

/// Store configuration for connection, commit cadence and cache behavior
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Number of pooled read connections (round-robin)
    pub read_pool_size: usize,

    /// Lock acquisition timeout applied to every connection
    pub busy_timeout: Duration,

    /// SQLite page cache size in KiB (applied as a negative cache_size pragma)
    pub cache_size_kib: i64,

    /// Interval between block processor ticks
    pub block_interval: Duration,

    /// Commits slower than this are logged as warnings
    pub slow_block_threshold: Duration,

    /// Operations per transaction within a block; the operation ordinal rolls
    /// over to the next transaction ordinal at this count
    pub ops_per_transaction: u32,

    /// Enable the structural query plan cache
    pub plan_cache_enabled: bool,

    /// Optional schema bootstrap DDL executed before the built-in DDL.
    /// The receipt-table DDL is always appended regardless.
    pub bootstrap_ddl: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            read_pool_size: 4,
            busy_timeout: Duration::from_secs(5),
            cache_size_kib: 64_000,
            block_interval: Duration::from_secs(2),
            slow_block_threshold: Duration::from_millis(1000),
            ops_per_transaction: 10,
            plan_cache_enabled: true,
            bootstrap_ddl: None,
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of pooled read connections
    pub fn with_read_pool_size(mut self, size: usize) -> Self {
        self.read_pool_size = size;
        self
    }

    /// Set the lock acquisition busy timeout
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Set the page cache size in KiB
    pub fn with_cache_size_kib(mut self, kib: i64) -> Self {
        self.cache_size_kib = kib;
        self
    }

    /// Set the block processor tick interval
    pub fn with_block_interval(mut self, interval: Duration) -> Self {
        self.block_interval = interval;
        self
    }

    /// Set the slow-block warning threshold
    pub fn with_slow_block_threshold(mut self, threshold: Duration) -> Self {
        self.slow_block_threshold = threshold;
        self
    }

    /// Enable or disable the query plan cache
    pub fn with_plan_cache(mut self, enabled: bool) -> Self {
        self.plan_cache_enabled = enabled;
        self
    }

    /// Set schema bootstrap DDL executed ahead of the built-in DDL
    pub fn with_bootstrap_ddl(mut self, ddl: impl Into<String>) -> Self {
        self.bootstrap_ddl = Some(ddl.into());
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.read_pool_size == 0 {
            return Err("read_pool_size must be greater than 0".to_string());
        }

        if self.ops_per_transaction == 0 {
            return Err("ops_per_transaction must be greater than 0".to_string());
        }

        if self.block_interval.is_zero() {
            return Err("block_interval must be greater than 0".to_string());
        }

        if self.cache_size_kib <= 0 {
            return Err("cache_size_kib must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.read_pool_size, 4);
        assert_eq!(config.ops_per_transaction, 10);
        assert_eq!(config.block_interval, Duration::from_secs(2));
        assert!(config.plan_cache_enabled);
        assert!(config.bootstrap_ddl.is_none());
    }

    #[test]
    fn test_builder_methods() {
        let config = StoreConfig::new()
            .with_read_pool_size(8)
            .with_busy_timeout(Duration::from_secs(10))
            .with_block_interval(Duration::from_millis(50))
            .with_plan_cache(false);

        assert_eq!(config.read_pool_size, 8);
        assert_eq!(config.busy_timeout, Duration::from_secs(10));
        assert_eq!(config.block_interval, Duration::from_millis(50));
        assert!(!config.plan_cache_enabled);
    }

    #[test]
    fn test_validate_success() {
        assert!(StoreConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_pool() {
        let config = StoreConfig::new().with_read_pool_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_interval() {
        let config = StoreConfig::new().with_block_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}

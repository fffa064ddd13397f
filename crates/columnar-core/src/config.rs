//! Storage configuration.

use std::env;
use std::time::Duration;

/// Configuration for the storage driver and manager.
///
/// All knobs are driven by environment variables with sensible defaults for
/// local development.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Keyspace holding the system table-info table.
    pub system_keyspace: String,
    /// Per-statement query timeout.
    pub query_timeout: Duration,
    /// How many times a transient connectivity error is retried before the
    /// operation fails with a backend error.
    pub transient_retries: u32,
    /// Upper bound on conditional-write attempts under concurrent
    /// modification. The source system retried without bound; the bound is
    /// explicit here.
    pub write_retry_limit: u32,
    /// Cap on in-flight storage operations in the manager.
    pub concurrent_tasks: usize,
}

impl StorageConfig {
    /// Creates configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            system_keyspace: env::var("COLUMNAR_SYSTEM_KEYSPACE")
                .unwrap_or(defaults.system_keyspace),
            query_timeout: env_u64("COLUMNAR_QUERY_TIMEOUT_MS")
                .map_or(defaults.query_timeout, Duration::from_millis),
            transient_retries: env_u64("COLUMNAR_TRANSIENT_RETRIES")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(defaults.transient_retries),
            write_retry_limit: env_u64("COLUMNAR_WRITE_RETRY_LIMIT")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(defaults.write_retry_limit),
            concurrent_tasks: env_u64("COLUMNAR_CONCURRENT_TASKS")
                .and_then(|v| usize::try_from(v).ok())
                .unwrap_or(defaults.concurrent_tasks),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            system_keyspace: "columnar".to_owned(),
            query_timeout: Duration::from_secs(2),
            transient_retries: 3,
            write_retry_limit: 64,
            concurrent_tasks: 1000,
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_create_default_config() {
        let config = StorageConfig::default();
        assert_eq!(config.system_keyspace, "columnar");
        assert_eq!(config.query_timeout, Duration::from_secs(2));
        assert_eq!(config.transient_retries, 3);
        assert_eq!(config.write_retry_limit, 64);
        assert_eq!(config.concurrent_tasks, 1000);
    }
}

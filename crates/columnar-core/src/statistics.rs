//! Table statistics sourced from store-engine management telemetry.
//!
//! The telemetry endpoint is an external collaborator; the driver only
//! knows this trait.

use crate::session::StoreError;

/// Metric key for the number of items in a table.
pub const METRIC_ITEM_COUNT: &str = "item_count";
/// Metric key for the approximate storage size of a table, in bytes.
pub const METRIC_SIZE_BYTES: &str = "size_bytes";

/// All metric keys the driver understands.
pub const SUPPORTED_METRICS: [&str; 2] = [METRIC_ITEM_COUNT, METRIC_SIZE_BYTES];

/// Access to the store engine's management telemetry.
pub trait StoreTelemetry: Send + Sync {
    /// Reads one metric for a physical table.
    fn table_metric(&self, keyspace: &str, table: &str, metric_key: &str)
    -> Result<u64, StoreError>;
}

//! Store session layer.
//!
//! The wide-column engine itself is an external collaborator. It is modeled
//! by the [`StoreConnection`] trait: statement execution with per-statement
//! consistency, lightweight-transaction "apply if" semantics reported via
//! the `[applied]` result column, and batch execution (batches are plain
//! statements here; the engine treats `BEGIN ... APPLY BATCH` text as one
//! submission).
//!
//! [`Session`] wraps a connection with the cross-cutting behavior every
//! call site needs: a fixed query timeout and a small bounded retry for
//! *transient connectivity* errors. This retry is distinct from the
//! driver's conditional-write retry loop, which is driven by
//! application-level conflict detection.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bigdecimal::BigDecimal;
use bytes::Bytes;
use tracing::{debug, warn};

use crate::config::StorageConfig;

/// Name of the pseudo-column the engine reports lightweight-transaction
/// outcomes in.
pub const APPLIED_COLUMN: &str = "[applied]";

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

/// A single statement to execute against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    text: String,
    consistent: bool,
}

impl Statement {
    /// Creates a statement. `consistent` selects the quorum consistency
    /// level instead of the cheap default.
    pub fn new(text: impl Into<String>, consistent: bool) -> Self {
        Self {
            text: text.into(),
            consistent,
        }
    }

    /// The statement text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the statement requests quorum consistency.
    #[must_use]
    pub fn consistent(&self) -> bool {
        self.consistent
    }
}

// ---------------------------------------------------------------------------
// Result cells
// ---------------------------------------------------------------------------

/// A primitive cell value returned by the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum StoreScalar {
    /// Text cell.
    Text(String),
    /// Integer cell (counts).
    Int(i64),
    /// Decimal cell.
    Decimal(BigDecimal),
    /// Blob cell.
    Blob(Bytes),
    /// Boolean cell (the `[applied]` flag).
    Bool(bool),
}

/// A cell value returned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreValue {
    /// A primitive cell.
    Scalar(StoreScalar),
    /// A set cell.
    Set(BTreeSet<StoreScalar>),
    /// A map cell.
    Map(BTreeMap<StoreScalar, StoreScalar>),
    /// An absent / null cell.
    Null,
}

impl StoreValue {
    /// Whether the cell is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the text if this is a text cell.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Scalar(StoreScalar::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer if this is an integer cell.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Scalar(StoreScalar::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// Returns the boolean if this is a boolean cell.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Scalar(StoreScalar::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Returns the map entries if this is a map cell.
    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<StoreScalar, StoreScalar>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }
}

/// One result row: column name to cell value.
#[derive(Debug, Clone, Default)]
pub struct Row {
    columns: BTreeMap<String, StoreValue>,
}

impl Row {
    /// Creates a row from column/value pairs.
    #[must_use]
    pub fn new(columns: BTreeMap<String, StoreValue>) -> Self {
        Self { columns }
    }

    /// Looks up a cell by column name.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&StoreValue> {
        self.columns.get(column)
    }

    /// Iterates over all columns.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &StoreValue)> {
        self.columns.iter()
    }

    /// The lightweight-transaction outcome of this row. Rows of plain
    /// statements carry no `[applied]` column and count as applied.
    #[must_use]
    pub fn applied(&self) -> bool {
        self.get(APPLIED_COLUMN)
            .and_then(StoreValue::as_bool)
            .unwrap_or(true)
    }
}

impl FromIterator<(String, StoreValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, StoreValue)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Errors reported by the store connection.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No store host could be reached.
    #[error("no store host available: {0}")]
    Unavailable(String),

    /// The statement did not complete within the timeout.
    #[error("store request timed out after {0:?}")]
    Timeout(Duration),

    /// The store rejected the statement.
    #[error("store protocol error: {0}")]
    Protocol(String),

    /// Any other connection-level failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    /// Whether retrying the statement may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// The store engine: a shared, thread-safe connection executing statements.
///
/// Every call is a blocking network round trip; the async manager runs them
/// on pool worker threads.
pub trait StoreConnection: Send + Sync {
    /// Executes a statement and returns its result rows.
    fn execute(&self, statement: &Statement, timeout: Duration) -> Result<Vec<Row>, StoreError>;

    /// Blocks until the cluster agrees on the (non-)existence of a table,
    /// after DDL.
    fn schema_settled(
        &self,
        keyspace: &str,
        table: &str,
        expect_exists: bool,
        timeout: Duration,
    ) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A store connection plus retry/timeout policy, injected into the driver
/// and repositories.
pub struct Session {
    connection: Arc<dyn StoreConnection>,
    query_timeout: Duration,
    transient_retries: u32,
}

impl Session {
    /// Creates a session over the given connection.
    #[must_use]
    pub fn new(connection: Arc<dyn StoreConnection>, config: &StorageConfig) -> Self {
        Self {
            connection,
            query_timeout: config.query_timeout,
            transient_retries: config.transient_retries,
        }
    }

    /// Executes a statement, retrying transient connectivity errors up to
    /// the configured count.
    pub fn execute(
        &self,
        text: impl Into<String>,
        consistent: bool,
    ) -> Result<Vec<Row>, StoreError> {
        let statement = Statement::new(text, consistent);
        debug!(statement = statement.text(), consistent, "executing statement");
        let mut attempt = 0;
        loop {
            match self.connection.execute(&statement, self.query_timeout) {
                Ok(rows) => return Ok(rows),
                Err(e) if e.is_transient() && attempt < self.transient_retries => {
                    attempt += 1;
                    warn!(error = %e, attempt, "transient store error, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Waits for cluster schema agreement on a table after DDL.
    pub fn schema_settled(
        &self,
        keyspace: &str,
        table: &str,
        expect_exists: bool,
    ) -> Result<(), StoreError> {
        self.connection
            .schema_settled(keyspace, table, expect_exists, self.query_timeout)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("query_timeout", &self.query_timeout)
            .field("transient_retries", &self.transient_retries)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedConnection;

    #[test]
    fn test_should_report_applied_by_default() {
        let row = Row::default();
        assert!(row.applied());
    }

    #[test]
    fn test_should_report_not_applied_flag() {
        let row: Row = [(
            APPLIED_COLUMN.to_owned(),
            StoreValue::Scalar(StoreScalar::Bool(false)),
        )]
        .into_iter()
        .collect();
        assert!(!row.applied());
    }

    #[test]
    fn test_should_retry_transient_errors() {
        let connection = Arc::new(ScriptedConnection::new());
        connection.push_error(StoreError::Unavailable("host down".to_owned()));
        connection.push_error(StoreError::Unavailable("host down".to_owned()));
        connection.push_rows(Vec::new());

        let session = Session::new(connection.clone(), &StorageConfig::default());
        let result = session.execute("SELECT x", false);
        assert!(result.is_ok());
        assert_eq!(connection.executed().len(), 3);
    }

    #[test]
    fn test_should_surface_transient_error_after_retries_exhaust() {
        let config = StorageConfig {
            transient_retries: 1,
            ..StorageConfig::default()
        };
        let connection = Arc::new(ScriptedConnection::new());
        connection.push_error(StoreError::Unavailable("down".to_owned()));
        connection.push_error(StoreError::Unavailable("down".to_owned()));

        let session = Session::new(connection, &config);
        let result = session.execute("SELECT x", false);
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[test]
    fn test_should_not_retry_protocol_errors() {
        let connection = Arc::new(ScriptedConnection::new());
        connection.push_error(StoreError::Protocol("bad syntax".to_owned()));

        let session = Session::new(connection.clone(), &StorageConfig::default());
        let result = session.execute("SELEC x", false);
        assert!(matches!(result, Err(StoreError::Protocol(_))));
        assert_eq!(connection.executed().len(), 1);
    }
}

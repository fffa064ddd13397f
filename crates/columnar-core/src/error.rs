//! Error taxonomy for storage operations.
//!
//! Callers only ever observe success, a conditional-check failure, a
//! not-found / already-exists lifecycle error, or a backend failure.
//! Transient connectivity errors and index-consistency conflicts are
//! retried internally and never surface below the configured bounds.

use columnar_model::ModelError;

use crate::session::StoreError;

/// Errors surfaced by the storage driver and manager.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Malformed schema, condition or attribute input. Detected before any
    /// store call and never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// An expected-condition precondition failed. Never retried.
    #[error("the conditional request failed")]
    ConditionalCheckFailed,

    /// The named table does not exist.
    #[error("table '{0}' does not exist")]
    TableNotFound(String),

    /// The named table already exists.
    #[error("table '{0}' already exists")]
    TableAlreadyExists(String),

    /// The table is in a lifecycle state that forbids the operation.
    #[error("resource in use: {0}")]
    ResourceInUse(String),

    /// Interaction with the store failed after exhausting retries.
    #[error("backend interaction failed: {0}")]
    Backend(String),
}

impl From<ModelError> for CoreError {
    fn from(e: ModelError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        Self::Backend(e.to_string())
    }
}

/// Convenience result type for storage operations.
pub type CoreResult<T> = Result<T, CoreError>;

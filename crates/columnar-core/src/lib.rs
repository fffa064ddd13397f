//! Core of the Columnar item store: the statement compiler, condition
//! evaluator, storage driver and storage manager that map a
//! document-style item model onto a wide-column storage engine.
//!
//! The engine itself is an external collaborator behind
//! [`session::StoreConnection`]; this crate compiles item operations into
//! store statements, maintains emulated local secondary indexes through
//! shadow rows, and keeps them consistent under concurrent conditional
//! writes with a read-modify-write retry protocol.

pub mod config;
pub mod context;
pub mod driver;
pub mod encoding;
pub mod error;
pub mod filter;
pub mod manager;
pub mod notifier;
pub mod session;
pub mod statement;
pub mod statistics;
pub mod table_info;

#[cfg(test)]
pub(crate) mod testing;

pub use config::StorageConfig;
pub use context::RequestContext;
pub use driver::{ColumnStoreDriver, StorageDriver};
pub use error::{CoreError, CoreResult};
pub use manager::SimpleStorageManager;
pub use notifier::{Event, Notifier, TracingNotifier};
pub use session::{Session, StoreConnection};
pub use table_info::{TableInfo, TableInfoRepository};

//! Data model for the Columnar item store.
//!
//! Items are maps of named attributes with dynamic typing. This crate holds
//! the value types shared by the statement compiler, the condition evaluator
//! and the storage driver: attribute types and values, conditions, table
//! schemas and index definitions, request/result carriers. It performs no
//! I/O.

pub mod attribute;
pub mod condition;
pub mod error;
pub mod request;
pub mod result;
pub mod schema;

use std::collections::BTreeMap;

pub use attribute::{AttributeType, AttributeValue, DecodedValue, ElementType, ScalarValue};
pub use condition::{Condition, ConditionContext, ConditionOperator};
pub use error::ModelError;
pub use request::{
    DeleteItemRequest, GetItemRequest, PutItemRequest, ReturnValues, UpdateAction,
    UpdateActionKind, WriteRequest,
};
pub use result::{OrderType, ScanResult, SelectResult, SelectType, TableMeta, TableStatus};
pub use schema::{IndexDefinition, TableSchema};

/// An item: attribute name to attribute value.
///
/// Ordered map so that compiled statements are deterministic for a given
/// item.
pub type Item = BTreeMap<String, AttributeValue>;

/// A map of per-attribute condition lists, as supplied to select, scan and
/// conditional write operations.
pub type ConditionMap = BTreeMap<String, Vec<Condition>>;

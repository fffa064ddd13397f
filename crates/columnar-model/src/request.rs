//! Write and read request carriers.

use crate::Item;
use crate::attribute::AttributeValue;

/// Which values a write operation should hand back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnValues {
    /// Return nothing.
    #[default]
    None,
    /// Return the full previous item, if one existed.
    AllOld,
}

/// A put-item request.
#[derive(Debug, Clone)]
pub struct PutItemRequest {
    /// Target table (user-facing name).
    pub table_name: String,
    /// The full item to write, key attributes included.
    pub attribute_map: Item,
    /// Old-value return semantics.
    pub return_values: ReturnValues,
}

impl PutItemRequest {
    /// Creates a put request with no return-value requirement.
    #[must_use]
    pub fn new(table_name: impl Into<String>, attribute_map: Item) -> Self {
        Self {
            table_name: table_name.into(),
            attribute_map,
            return_values: ReturnValues::None,
        }
    }

    /// Requests the previous item back.
    #[must_use]
    pub fn returning_old(mut self) -> Self {
        self.return_values = ReturnValues::AllOld;
        self
    }
}

/// A delete-item request.
#[derive(Debug, Clone)]
pub struct DeleteItemRequest {
    /// Target table (user-facing name).
    pub table_name: String,
    /// Key attribute name → value identifying the row to delete.
    pub key_attribute_map: Item,
}

impl DeleteItemRequest {
    /// Creates a delete request.
    #[must_use]
    pub fn new(table_name: impl Into<String>, key_attribute_map: Item) -> Self {
        Self {
            table_name: table_name.into(),
            key_attribute_map,
        }
    }
}

/// A get-item request, used by batch reads.
#[derive(Debug, Clone)]
pub struct GetItemRequest {
    /// Target table (user-facing name).
    pub table_name: String,
    /// Key attribute name → value identifying the row to read.
    pub key_attribute_map: Item,
    /// Attributes to include in the result; `None` includes everything.
    pub attributes_to_get: Option<Vec<String>>,
    /// Whether to read at the consistent level.
    pub consistent: bool,
}

/// A batchable write: either a put or a delete.
#[derive(Debug, Clone)]
pub enum WriteRequest {
    /// Put an item.
    Put(PutItemRequest),
    /// Delete an item.
    Delete(DeleteItemRequest),
}

impl WriteRequest {
    /// The table this request targets.
    #[must_use]
    pub fn table_name(&self) -> &str {
        match self {
            Self::Put(r) => &r.table_name,
            Self::Delete(r) => &r.table_name,
        }
    }
}

/// The kind of per-attribute mutation an update applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateActionKind {
    /// Replace the attribute with the given value.
    Put,
    /// Numeric addition, set union or map merge with the existing value.
    Add,
    /// Remove the attribute, or subtract elements/keys from a collection.
    Delete,
}

/// A single attribute mutation within an update-item operation.
#[derive(Debug, Clone)]
pub struct UpdateAction {
    /// What to do with the attribute.
    pub kind: UpdateActionKind,
    /// The operand; absent for plain removal.
    pub value: Option<AttributeValue>,
}

impl UpdateAction {
    /// Replace the attribute.
    #[must_use]
    pub fn put(value: AttributeValue) -> Self {
        Self {
            kind: UpdateActionKind::Put,
            value: Some(value),
        }
    }

    /// Add to the attribute.
    #[must_use]
    pub fn add(value: AttributeValue) -> Self {
        Self {
            kind: UpdateActionKind::Add,
            value: Some(value),
        }
    }

    /// Remove the attribute entirely.
    #[must_use]
    pub fn delete() -> Self {
        Self {
            kind: UpdateActionKind::Delete,
            value: None,
        }
    }

    /// Remove the given elements or keys from a collection attribute.
    #[must_use]
    pub fn delete_elements(value: AttributeValue) -> Self {
        Self {
            kind: UpdateActionKind::Delete,
            value: Some(value),
        }
    }
}

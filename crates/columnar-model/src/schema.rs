//! Table schemas and local secondary index definitions.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::attribute::AttributeType;
use crate::error::ModelError;

/// A local secondary index over a single non-key attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// The alternate (non-key) attribute this index orders by.
    pub attribute_to_index: String,
    /// Attributes projected into the index: `None` projects everything,
    /// an empty set projects keys only.
    pub projected_attributes: Option<BTreeSet<String>>,
}

impl IndexDefinition {
    /// Creates an index over the given attribute projecting all attributes.
    #[must_use]
    pub fn projecting_all(attribute_to_index: impl Into<String>) -> Self {
        Self {
            attribute_to_index: attribute_to_index.into(),
            projected_attributes: None,
        }
    }
}

/// The schema of a table: predefined attribute types, key attributes and
/// index definitions.
///
/// Attributes not present in the type map are "dynamic" (schemaless) and
/// are stored in an auxiliary map column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    attribute_type_map: BTreeMap<String, AttributeType>,
    key_attributes: Vec<String>,
    index_def_map: BTreeMap<String, IndexDefinition>,
}

impl TableSchema {
    /// Creates a schema, validating its structural invariants: one or two
    /// key attributes, keys and indexed attributes predefined as scalars,
    /// exactly one non-key attribute indexed per local secondary index.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidSchema` on any violation.
    pub fn new(
        attribute_type_map: BTreeMap<String, AttributeType>,
        key_attributes: Vec<String>,
        index_def_map: BTreeMap<String, IndexDefinition>,
    ) -> Result<Self, ModelError> {
        if key_attributes.is_empty() || key_attributes.len() > 2 {
            return Err(ModelError::InvalidSchema(format!(
                "expected 1 or 2 key attributes, got {}",
                key_attributes.len()
            )));
        }
        for key in &key_attributes {
            match attribute_type_map.get(key) {
                None => {
                    return Err(ModelError::InvalidSchema(format!(
                        "key attribute '{key}' is not defined"
                    )));
                }
                Some(attr_type) if !attr_type.is_scalar() => {
                    return Err(ModelError::InvalidSchema(format!(
                        "key attribute '{key}' must be a scalar, got {attr_type}"
                    )));
                }
                Some(_) => {}
            }
        }
        for (index_name, index_def) in &index_def_map {
            let attr = &index_def.attribute_to_index;
            if key_attributes.contains(attr) {
                return Err(ModelError::InvalidSchema(format!(
                    "index '{index_name}' must target a non-key attribute, got key '{attr}'"
                )));
            }
            match attribute_type_map.get(attr) {
                None => {
                    return Err(ModelError::InvalidSchema(format!(
                        "index '{index_name}' targets undefined attribute '{attr}'"
                    )));
                }
                Some(attr_type) if !attr_type.is_scalar() => {
                    return Err(ModelError::InvalidSchema(format!(
                        "index '{index_name}' must target a scalar attribute, got {attr_type}"
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(Self {
            attribute_type_map,
            key_attributes,
            index_def_map,
        })
    }

    /// Predefined attribute name → type.
    #[must_use]
    pub fn attribute_type_map(&self) -> &BTreeMap<String, AttributeType> {
        &self.attribute_type_map
    }

    /// The type of a predefined attribute, if declared.
    #[must_use]
    pub fn attribute_type(&self, name: &str) -> Option<AttributeType> {
        self.attribute_type_map.get(name).copied()
    }

    /// Ordered key attributes: hash key first, then the optional range key.
    #[must_use]
    pub fn key_attributes(&self) -> &[String] {
        &self.key_attributes
    }

    /// The hash (partition) key attribute name.
    #[must_use]
    pub fn hash_key_name(&self) -> &str {
        &self.key_attributes[0]
    }

    /// The range (sort) key attribute name, when the table has one.
    #[must_use]
    pub fn range_key_name(&self) -> Option<&str> {
        self.key_attributes.get(1).map(String::as_str)
    }

    /// Whether the given attribute is a key attribute.
    #[must_use]
    pub fn is_key_attribute(&self, name: &str) -> bool {
        self.key_attributes.iter().any(|k| k == name)
    }

    /// Index name → definition.
    #[must_use]
    pub fn index_def_map(&self) -> &BTreeMap<String, IndexDefinition> {
        &self.index_def_map
    }

    /// Whether the table defines any local secondary index.
    #[must_use]
    pub fn has_indexes(&self) -> bool {
        !self.index_def_map.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Result carriers and table metadata.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Item;
use crate::schema::TableSchema;

/// Row ordering of a select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    /// Ascending by sort attribute.
    Asc,
    /// Descending by sort attribute.
    Desc,
}

/// What a select operation returns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SelectType {
    /// All attributes of each matching item.
    #[default]
    All,
    /// Attributes projected into the queried index.
    AllProjected,
    /// Only the number of matching items.
    Count,
    /// The named attributes of each matching item.
    SpecificAttributes(Vec<String>),
}

impl SelectType {
    /// Whether this is a count-only select.
    #[must_use]
    pub fn is_count(&self) -> bool {
        matches!(self, Self::Count)
    }
}

/// The result of a select operation.
#[derive(Debug, Clone, Default)]
pub struct SelectResult {
    /// Matching items, in select order.
    pub items: Vec<Item>,
    /// Number of matching items.
    pub count: usize,
    /// Pagination cursor, present when the result was truncated by a limit.
    pub last_evaluated_key: Option<Item>,
}

impl SelectResult {
    /// A result with the given items and no further pages.
    #[must_use]
    pub fn with_items(items: Vec<Item>) -> Self {
        Self {
            count: items.len(),
            items,
            last_evaluated_key: None,
        }
    }
}

/// The result of a scan operation.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Items that passed the scan filter.
    pub items: Vec<Item>,
    /// Number of items that passed the filter.
    pub count: usize,
    /// Number of rows examined before filtering.
    pub scanned_count: usize,
    /// Pagination cursor, present when the scan was truncated by a limit.
    pub last_evaluated_key: Option<Item>,
}

/// Lifecycle status of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableStatus {
    /// The physical table is being created.
    Creating,
    /// The table is ready for traffic.
    Active,
    /// The physical table is being dropped.
    Deleting,
    /// Creation failed; the table is unusable.
    CreateFailed,
    /// Deletion failed; the table is unusable.
    DeleteFailed,
}

impl TableStatus {
    /// The wire string for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "CREATING",
            Self::Active => "ACTIVE",
            Self::Deleting => "DELETING",
            Self::CreateFailed => "CREATE_FAILED",
            Self::DeleteFailed => "DELETE_FAILED",
        }
    }
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATING" => Ok(Self::Creating),
            "ACTIVE" => Ok(Self::Active),
            "DELETING" => Ok(Self::Deleting),
            "CREATE_FAILED" => Ok(Self::CreateFailed),
            "DELETE_FAILED" => Ok(Self::DeleteFailed),
            other => Err(format!("unknown table status: {other}")),
        }
    }
}

/// Table metadata handed back by lifecycle operations.
#[derive(Debug, Clone)]
pub struct TableMeta {
    /// The table's schema.
    pub schema: TableSchema,
    /// The table's lifecycle status.
    pub status: TableStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_roundtrip_status_strings() {
        for status in [
            TableStatus::Creating,
            TableStatus::Active,
            TableStatus::Deleting,
            TableStatus::CreateFailed,
            TableStatus::DeleteFailed,
        ] {
            assert_eq!(status.as_str().parse::<TableStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_should_count_items_in_select_result() {
        let result = SelectResult::with_items(vec![Item::new(), Item::new()]);
        assert_eq!(result.count, 2);
        assert!(result.last_evaluated_key.is_none());
    }
}

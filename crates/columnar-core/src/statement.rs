//! Statement compiler.
//!
//! Compiles item-level operations into store statements, including the
//! local-secondary-index emulation scheme: four hidden columns
//! (`index_name`, `index_value_string`, `index_value_number`,
//! `index_value_blob`) are appended to the primary key of every row in an
//! indexed table. Each defined index contributes one extra physical
//! "shadow" row per base row, keyed by the index name and the indexed
//! attribute's value in the matching typed column. Rows that are not part
//! of an index carry default values in the hidden columns, so plain
//! primary-key access always pins the implicit default index.
//!
//! Multi-statement writes are wrapped in an unlogged batch. The batch only
//! guarantees that the statements are submitted together; it is NOT
//! atomic across the physical index rows. The driver's read-modify-write
//! retry protocol exists precisely because a batch can land partially.

use std::collections::BTreeMap;

use columnar_model::{
    AttributeType, AttributeValue, Condition, ConditionMap, ConditionOperator, Item, OrderType,
    SelectType, TableSchema,
};

use crate::encoding::{
    cql_quote, encode_dynamic_attr_value, encode_predefined_attr_value, store_type,
};
use crate::error::{CoreError, CoreResult};

/// Prefix applied to every user-defined column and keyspace, so user names
/// can never collide with system columns.
pub const USER_PREFIX: &str = "user_";

/// Hidden column holding the index name of a shadow row.
pub const SYSTEM_COLUMN_INDEX_NAME: &str = "index_name";
/// Hidden column holding a string-typed indexed value.
pub const SYSTEM_COLUMN_INDEX_VALUE_STRING: &str = "index_value_string";
/// Hidden column holding a number-typed indexed value.
pub const SYSTEM_COLUMN_INDEX_VALUE_NUMBER: &str = "index_value_number";
/// Hidden column holding a blob-typed indexed value.
pub const SYSTEM_COLUMN_INDEX_VALUE_BLOB: &str = "index_value_blob";
/// Auxiliary column holding dynamic attribute payloads.
pub const SYSTEM_COLUMN_EXTRA_ATTR_DATA: &str = "extra_attr_data";
/// Auxiliary column holding dynamic attribute type tags.
pub const SYSTEM_COLUMN_EXTRA_ATTR_TYPES: &str = "extra_attr_types";
/// Auxiliary column holding the set of present attribute names.
pub const SYSTEM_COLUMN_ATTR_EXIST: &str = "attr_exist";

/// The four hidden index columns, in primary-key order.
pub const LOCAL_INDEX_FIELDS: [&str; 4] = [
    SYSTEM_COLUMN_INDEX_NAME,
    SYSTEM_COLUMN_INDEX_VALUE_STRING,
    SYSTEM_COLUMN_INDEX_VALUE_NUMBER,
    SYSTEM_COLUMN_INDEX_VALUE_BLOB,
];

/// Attribute changes applied by a merge (non-rewrite) update. `None`
/// removes the attribute.
pub type UpdateMap = BTreeMap<String, Option<AttributeValue>>;

/// The physical coordinates and schema of a table, as the compiler needs
/// them.
#[derive(Debug, Clone, Copy)]
pub struct TableRef<'a> {
    /// Physical keyspace.
    pub keyspace: &'a str,
    /// Physical table name.
    pub table: &'a str,
    /// Logical schema.
    pub schema: &'a TableSchema,
}

impl TableRef<'_> {
    fn qualified(&self) -> String {
        format!("\"{}\".\"{}\"", self.keyspace, self.table)
    }
}

// ---------------------------------------------------------------------------
// Hidden index columns
// ---------------------------------------------------------------------------

/// Encoded literals for the hidden index columns of a row: defaults for a
/// base row, the index coordinates for a shadow row.
fn encoded_index_values(index: Option<(&str, &AttributeValue)>) -> [String; 4] {
    let mut values = [
        "''".to_owned(),
        "''".to_owned(),
        "0".to_owned(),
        "0x".to_owned(),
    ];
    if let Some((index_name, index_value)) = index {
        values[0] = cql_quote(index_name);
        let position = match index_value.attr_type() {
            AttributeType::Scalar(e) => match e {
                columnar_model::ElementType::String => 1,
                columnar_model::ElementType::Number => 2,
                columnar_model::ElementType::Blob => 3,
            },
            // Index definitions only admit scalar attributes.
            other => unreachable!("indexed attribute has collection type {other}"),
        };
        values[position] = encode_predefined_attr_value(Some(index_value));
    }
    values
}

fn append_index_extra_pk(
    out: &mut String,
    index: Option<(&str, &AttributeValue)>,
    mut prefix: &str,
) {
    let values = encoded_index_values(index);
    for (column, value) in LOCAL_INDEX_FIELDS.iter().zip(values) {
        out.push_str(prefix);
        out.push_str(column);
        out.push('=');
        out.push_str(&value);
        prefix = " AND ";
    }
}

fn append_primary_key(out: &mut String, schema: &TableSchema, key_source: &Item) {
    let mut prefix = " WHERE ";
    for key_attr in schema.key_attributes() {
        out.push_str(prefix);
        out.push('"');
        out.push_str(USER_PREFIX);
        out.push_str(key_attr);
        out.push_str("\"=");
        out.push_str(&encode_predefined_attr_value(key_source.get(key_attr)));
        prefix = " AND ";
    }
}

// ---------------------------------------------------------------------------
// DDL
// ---------------------------------------------------------------------------

/// Compiles the `CREATE TABLE` statement for a logical table.
#[must_use]
pub fn create_table_statement(keyspace: &str, table: &str, schema: &TableSchema) -> String {
    let mut out = format!("CREATE TABLE \"{keyspace}\".\"{table}\" (");

    if schema.has_indexes() {
        out.push_str(&format!(
            "{SYSTEM_COLUMN_INDEX_NAME} text,{SYSTEM_COLUMN_INDEX_VALUE_STRING} text,\
             {SYSTEM_COLUMN_INDEX_VALUE_NUMBER} decimal,{SYSTEM_COLUMN_INDEX_VALUE_BLOB} blob,"
        ));
    }

    for (name, attr_type) in schema.attribute_type_map() {
        out.push_str(&format!(
            "\"{USER_PREFIX}{name}\" {},",
            store_type(*attr_type)
        ));
    }

    out.push_str(&format!(
        "{SYSTEM_COLUMN_EXTRA_ATTR_DATA} map<text,blob>,\
         {SYSTEM_COLUMN_EXTRA_ATTR_TYPES} map<text,text>,\
         {SYSTEM_COLUMN_ATTR_EXIST} set<text>,\
         PRIMARY KEY (\"{USER_PREFIX}{}\"",
        schema.hash_key_name()
    ));

    if schema.has_indexes() {
        for field in LOCAL_INDEX_FIELDS {
            out.push(',');
            out.push_str(field);
        }
    }

    if let Some(range) = schema.range_key_name() {
        out.push_str(&format!(",\"{USER_PREFIX}{range}\""));
    }

    out.push_str("))");
    out
}

/// Compiles the `DROP TABLE` statement for a physical table.
#[must_use]
pub fn drop_table_statement(keyspace: &str, table: &str) -> String {
    format!("DROP TABLE \"{keyspace}\".\"{table}\"")
}

// ---------------------------------------------------------------------------
// Write statement building blocks
// ---------------------------------------------------------------------------

fn split_attrs<'a>(
    schema: &TableSchema,
    item: &'a Item,
) -> (
    Vec<(&'a String, &'a AttributeValue)>,
    Vec<(&'a String, &'a AttributeValue)>,
) {
    item.iter()
        .partition(|(name, _)| schema.attribute_type(name).is_some())
}

fn types_map_literal<'a>(
    dynamic_attrs: impl Iterator<Item = (&'a String, &'a AttributeValue)>,
) -> String {
    let entries: Vec<String> = dynamic_attrs
        .map(|(name, value)| format!("{}:{}", cql_quote(name), cql_quote(&store_type(value.attr_type()))))
        .collect();
    format!("{{{}}}", entries.join(","))
}

fn exists_set_literal<'a>(names: impl Iterator<Item = &'a String>) -> String {
    let entries: Vec<String> = names.map(|name| cql_quote(name)).collect();
    format!("{{{}}}", entries.join(","))
}

fn append_insert(
    out: &mut String,
    t: &TableRef<'_>,
    item: &Item,
    index: Option<(&str, &AttributeValue)>,
    if_not_exists: bool,
) {
    let (predefined, dynamic) = split_attrs(t.schema, item);

    out.push_str("INSERT INTO ");
    out.push_str(&t.qualified());
    out.push_str(" (");

    if t.schema.has_indexes() {
        for field in LOCAL_INDEX_FIELDS {
            out.push_str(field);
            out.push(',');
        }
    }
    for (name, _) in &predefined {
        out.push_str(&format!("\"{USER_PREFIX}{name}\","));
    }
    out.push_str(&format!(
        "{SYSTEM_COLUMN_EXTRA_ATTR_DATA},{SYSTEM_COLUMN_EXTRA_ATTR_TYPES},\
         {SYSTEM_COLUMN_ATTR_EXIST}) VALUES("
    ));

    if t.schema.has_indexes() {
        for value in encoded_index_values(index) {
            out.push_str(&value);
            out.push(',');
        }
    }
    for (_, value) in &predefined {
        out.push_str(&encode_predefined_attr_value(Some(value)));
        out.push(',');
    }

    let data_entries: Vec<String> = dynamic
        .iter()
        .map(|(name, value)| {
            format!("{}:{}", cql_quote(name), encode_dynamic_attr_value(Some(value)))
        })
        .collect();
    out.push_str(&format!("{{{}}},", data_entries.join(",")));
    out.push_str(&types_map_literal(dynamic.iter().copied()));
    out.push(',');
    out.push_str(&exists_set_literal(item.keys()));
    out.push(')');

    if if_not_exists {
        out.push_str(" IF NOT EXISTS");
    }
}

/// A full-row rewrite: sets every predefined non-key column (null when
/// absent from the item) and replaces the dynamic-attribute columns
/// wholesale.
fn rewrite_update_with_pk(t: &TableRef<'_>, item: &Item) -> String {
    let schema = t.schema;
    let (predefined, dynamic) = split_attrs(schema, item);

    let mut parts: Vec<String> = Vec::new();
    for (name, value) in &predefined {
        if !schema.is_key_attribute(name) {
            parts.push(format!(
                "\"{USER_PREFIX}{name}\"={}",
                encode_predefined_attr_value(Some(value))
            ));
        }
    }
    let data_entries: Vec<String> = dynamic
        .iter()
        .map(|(name, value)| {
            format!("{}:{}", cql_quote(name), encode_dynamic_attr_value(Some(value)))
        })
        .collect();
    parts.push(format!(
        "{SYSTEM_COLUMN_EXTRA_ATTR_DATA}={{{}}}",
        data_entries.join(",")
    ));
    for name in schema.attribute_type_map().keys() {
        if !schema.is_key_attribute(name) && !item.contains_key(name) {
            parts.push(format!("\"{USER_PREFIX}{name}\"=null"));
        }
    }
    parts.push(format!(
        "{SYSTEM_COLUMN_EXTRA_ATTR_TYPES}={}",
        types_map_literal(dynamic.iter().copied())
    ));
    parts.push(format!(
        "{SYSTEM_COLUMN_ATTR_EXIST}={}",
        exists_set_literal(item.keys())
    ));

    let mut out = format!("UPDATE {} SET {}", t.qualified(), parts.join(","));
    append_primary_key(&mut out, schema, item);
    out
}

/// A merge update: touches only the listed attributes, adding to or
/// subtracting from the dynamic-attribute columns.
fn merge_update_with_pk(t: &TableRef<'_>, key_map: &Item, changes: &UpdateMap) -> String {
    let schema = t.schema;

    let mut parts: Vec<String> = Vec::new();
    let mut dynamic_set: Vec<(&String, &AttributeValue)> = Vec::new();
    let mut dynamic_delete: Vec<&String> = Vec::new();

    for (name, value) in changes {
        if schema.attribute_type(name).is_some() {
            parts.push(format!(
                "\"{USER_PREFIX}{name}\"={}",
                encode_predefined_attr_value(value.as_ref())
            ));
        } else if let Some(value) = value {
            dynamic_set.push((name, value));
        } else {
            dynamic_delete.push(name);
        }
    }

    if !dynamic_set.is_empty() {
        let data_entries: Vec<String> = dynamic_set
            .iter()
            .map(|(name, value)| {
                format!("{}:{}", cql_quote(name), encode_dynamic_attr_value(Some(value)))
            })
            .collect();
        parts.push(format!(
            "{SYSTEM_COLUMN_EXTRA_ATTR_DATA}={SYSTEM_COLUMN_EXTRA_ATTR_DATA}+{{{}}}",
            data_entries.join(",")
        ));
        parts.push(format!(
            "{SYSTEM_COLUMN_EXTRA_ATTR_TYPES}={SYSTEM_COLUMN_EXTRA_ATTR_TYPES}+{}",
            types_map_literal(dynamic_set.iter().copied())
        ));
        parts.push(format!(
            "{SYSTEM_COLUMN_ATTR_EXIST}={SYSTEM_COLUMN_ATTR_EXIST}+{}",
            exists_set_literal(dynamic_set.iter().map(|(name, _)| *name))
        ));
    }
    if !dynamic_delete.is_empty() {
        for name in &dynamic_delete {
            parts.push(format!(
                "{SYSTEM_COLUMN_EXTRA_ATTR_DATA}[{}]=null",
                cql_quote(name)
            ));
            parts.push(format!(
                "{SYSTEM_COLUMN_EXTRA_ATTR_TYPES}[{}]=null",
                cql_quote(name)
            ));
        }
        parts.push(format!(
            "{SYSTEM_COLUMN_ATTR_EXIST}={SYSTEM_COLUMN_ATTR_EXIST}-{}",
            exists_set_literal(dynamic_delete.iter().copied())
        ));
    }

    let mut out = format!("UPDATE {} SET {}", t.qualified(), parts.join(","));
    append_primary_key(&mut out, schema, key_map);
    out
}

fn delete_with_pk(t: &TableRef<'_>, key_map: &Item) -> String {
    let mut out = format!("DELETE FROM {}", t.qualified());
    append_primary_key(&mut out, t.schema, key_map);
    out
}

// ---------------------------------------------------------------------------
// IF clauses
// ---------------------------------------------------------------------------

fn if_prefix(first: &mut bool) -> &'static str {
    if *first {
        *first = false;
        " IF "
    } else {
        " AND "
    }
}

/// Appends the optimistic-concurrency token: an equality on every
/// predefined non-key column (null when absent) plus every dynamic
/// attribute of the old row. The full old row is the token, not a version
/// counter.
fn append_snapshot_if(out: &mut String, t: &TableRef<'_>, old_item: &Item, first: &mut bool) {
    let schema = t.schema;
    for name in schema.attribute_type_map().keys() {
        if schema.is_key_attribute(name) {
            continue;
        }
        out.push_str(if_prefix(first));
        out.push_str(&format!(
            "\"{USER_PREFIX}{name}\"={}",
            encode_predefined_attr_value(old_item.get(name))
        ));
    }
    for (name, value) in old_item {
        if schema.attribute_type(name).is_none() {
            out.push_str(if_prefix(first));
            out.push_str(&format!(
                "{SYSTEM_COLUMN_EXTRA_ATTR_DATA}[{}]={}",
                cql_quote(name),
                encode_dynamic_attr_value(Some(value))
            ));
        }
    }
}

fn append_expected_if(
    out: &mut String,
    t: &TableRef<'_>,
    expected: &ConditionMap,
    first: &mut bool,
) {
    for (attr, conditions) in expected {
        let is_predefined = t.schema.attribute_type(attr).is_some();
        for condition in conditions {
            out.push_str(if_prefix(first));
            match condition.op() {
                ConditionOperator::Exists => {
                    out.push_str(&format!(
                        "{SYSTEM_COLUMN_ATTR_EXIST}={{{}}}",
                        cql_quote(attr)
                    ));
                }
                ConditionOperator::NotExists => {
                    if is_predefined {
                        out.push_str(&format!("\"{USER_PREFIX}{attr}\"=null"));
                    } else {
                        out.push_str(&format!(
                            "{SYSTEM_COLUMN_EXTRA_ATTR_DATA}[{}]=null",
                            cql_quote(attr)
                        ));
                    }
                }
                ConditionOperator::Eq => {
                    if is_predefined {
                        out.push_str(&format!(
                            "\"{USER_PREFIX}{attr}\"={}",
                            encode_predefined_attr_value(Some(condition.arg()))
                        ));
                    } else {
                        out.push_str(&format!(
                            "{SYSTEM_COLUMN_EXTRA_ATTR_DATA}[{}]={}",
                            cql_quote(attr),
                            encode_dynamic_attr_value(Some(condition.arg()))
                        ));
                    }
                }
                // Expected conditions are validated upstream.
                other => unreachable!("operator {other} in an expected condition"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Shadow-row maintenance
// ---------------------------------------------------------------------------

/// Appends per-index shadow-row statements: an update placing the row
/// under its (new) indexed value, and a delete removing the stale shadow
/// row when the old value differs.
fn append_index_maintenance<'a>(
    out: &mut String,
    t: &TableRef<'_>,
    base_update: &str,
    base_delete: &str,
    old_item: Option<&'a Item>,
    new_value_of: &dyn Fn(&str) -> Option<&'a AttributeValue>,
) {
    for (index_name, index_def) in t.schema.index_def_map() {
        let attr = index_def.attribute_to_index.as_str();
        let new_value = new_value_of(attr);
        let old_value = old_item.and_then(|old| old.get(attr));

        if let Some(new_value) = new_value {
            out.push(' ');
            out.push_str(base_update);
            append_index_extra_pk(out, Some((index_name, new_value)), " AND ");
        }
        if let Some(old_value) = old_value {
            if new_value != Some(old_value) {
                out.push(' ');
                out.push_str(base_delete);
                append_index_extra_pk(out, Some((index_name, old_value)), " AND ");
            }
        }
    }
}

fn wrap_batch(main: String, extra: String) -> String {
    if extra.is_empty() {
        main
    } else {
        format!("BEGIN UNLOGGED BATCH {main}{extra} APPLY BATCH")
    }
}

// ---------------------------------------------------------------------------
// Top-level write statements
// ---------------------------------------------------------------------------

/// Compiles a put.
///
/// With neither an old-row snapshot nor expected conditions this is a
/// plain `INSERT` (optionally `IF NOT EXISTS`). Otherwise the put becomes
/// a full-row rewrite `UPDATE ... IF <snapshot + expected>`, because the
/// hidden index columns are part of the primary key and can only be
/// addressed by an `UPDATE`. Shadow-row maintenance statements are
/// appended and the whole write is wrapped in an unlogged batch.
#[must_use]
pub fn put_statement(
    t: &TableRef<'_>,
    item: &Item,
    old_item: Option<&Item>,
    if_not_exist: bool,
    expected: Option<&ConditionMap>,
) -> String {
    if old_item.is_none() && expected.is_none() {
        let mut main = String::new();
        append_insert(&mut main, t, item, None, if_not_exist);
        if !t.schema.has_indexes() {
            return main;
        }
        let base_update = rewrite_update_with_pk(t, item);
        let base_delete = delete_with_pk(t, item);
        let mut extra = String::new();
        append_index_maintenance(&mut extra, t, &base_update, &base_delete, None, &|attr| {
            item.get(attr)
        });
        return wrap_batch(main, extra);
    }

    let mut main = rewrite_update_with_pk(t, item);
    if t.schema.has_indexes() {
        append_index_extra_pk(&mut main, None, " AND ");
    }
    let mut first = true;
    if let Some(old_item) = old_item {
        append_snapshot_if(&mut main, t, old_item, &mut first);
    }
    if let Some(expected) = expected {
        append_expected_if(&mut main, t, expected, &mut first);
    }

    if !t.schema.has_indexes() {
        return main;
    }
    let base_update = rewrite_update_with_pk(t, item);
    let base_delete = delete_with_pk(t, item);
    let mut extra = String::new();
    append_index_maintenance(&mut extra, t, &base_update, &base_delete, old_item, &|attr| {
        item.get(attr)
    });
    wrap_batch(main, extra)
}

/// Compiles a delete, with optional snapshot and expected-condition `IF`
/// clauses and shadow-row cleanup for the old indexed values.
#[must_use]
pub fn delete_statement(
    t: &TableRef<'_>,
    key_map: &Item,
    old_item: Option<&Item>,
    expected: Option<&ConditionMap>,
) -> String {
    let base_delete = delete_with_pk(t, key_map);

    let mut main = base_delete.clone();
    if t.schema.has_indexes() {
        append_index_extra_pk(&mut main, None, " AND ");
    }
    let mut first = true;
    if let Some(old_item) = old_item {
        append_snapshot_if(&mut main, t, old_item, &mut first);
    }
    if let Some(expected) = expected {
        append_expected_if(&mut main, t, expected, &mut first);
    }

    if !t.schema.has_indexes() {
        return main;
    }
    let mut extra = String::new();
    append_index_maintenance(&mut extra, t, "", &base_delete, old_item, &|_| None);
    wrap_batch(main, extra)
}

/// Compiles an update: a merge `UPDATE` over the changed attributes with
/// the old-row snapshot as its `IF` token, recomputing shadow-row
/// placement for indexed attributes.
#[must_use]
pub fn update_statement(
    t: &TableRef<'_>,
    key_map: &Item,
    changes: &UpdateMap,
    old_item: Option<&Item>,
    expected: Option<&ConditionMap>,
) -> String {
    let base_update = merge_update_with_pk(t, key_map, changes);

    let mut main = base_update.clone();
    if t.schema.has_indexes() {
        append_index_extra_pk(&mut main, None, " AND ");
    }
    let mut first = true;
    if let Some(old_item) = old_item {
        append_snapshot_if(&mut main, t, old_item, &mut first);
    }
    if let Some(expected) = expected {
        append_expected_if(&mut main, t, expected, &mut first);
    }

    if !t.schema.has_indexes() {
        return main;
    }
    let base_delete = delete_with_pk(t, key_map);
    let mut extra = String::new();
    append_index_maintenance(&mut extra, t, &base_update, &base_delete, old_item, &|attr| {
        match changes.get(attr) {
            Some(change) => change.as_ref(),
            None => old_item.and_then(|old| old.get(attr)),
        }
    });
    wrap_batch(main, extra)
}

/// Compiles the consistent read of the current base row, used as step one
/// of the read-modify-write protocol.
#[must_use]
pub fn select_current_row_statement(t: &TableRef<'_>, key_map: &Item) -> String {
    let mut out = format!("SELECT * FROM {}", t.qualified());
    append_primary_key(&mut out, t.schema, key_map);
    if t.schema.has_indexes() {
        append_index_extra_pk(&mut out, None, " AND ");
    }
    out
}

// ---------------------------------------------------------------------------
// Condition compaction
// ---------------------------------------------------------------------------

/// Collapses a list of conditions on one column into at most an equality,
/// a `[lower, upper]` pair, or a single bound. Returns `None` when the
/// conditions can never match, so the caller can skip the store round trip
/// entirely.
#[must_use]
pub fn compact_conditions(conditions: Vec<Condition>) -> Option<Vec<Condition>> {
    let mut exact: Option<Condition> = None;
    let mut lower: Option<Condition> = None;
    let mut upper: Option<Condition> = None;

    for condition in conditions {
        match condition.op() {
            ConditionOperator::Eq => {
                if let Some(existing) = &exact {
                    if existing.arg() != condition.arg() {
                        return None;
                    }
                }
                exact = Some(condition);
            }
            ConditionOperator::Gt | ConditionOperator::Ge => {
                let replace = match &lower {
                    None => true,
                    Some(current) if condition.is_strict() => condition.arg() >= current.arg(),
                    Some(current) => condition.arg() > current.arg(),
                };
                if replace {
                    lower = Some(condition);
                }
            }
            ConditionOperator::Lt | ConditionOperator::Le => {
                let replace = match &upper {
                    None => true,
                    Some(current) if condition.is_strict() => condition.arg() <= current.arg(),
                    Some(current) => condition.arg() < current.arg(),
                };
                if replace {
                    upper = Some(condition);
                }
            }
            // Between and BeginsWith are expanded before compaction; other
            // operators never reach a key condition list.
            other => unreachable!("operator {other} in an indexed condition"),
        }
    }

    if let Some(exact) = exact {
        if let Some(lower) = &lower {
            let impossible = if lower.is_strict() {
                lower.arg() >= exact.arg()
            } else {
                lower.arg() > exact.arg()
            };
            if impossible {
                return None;
            }
        }
        if let Some(upper) = &upper {
            let impossible = if upper.is_strict() {
                upper.arg() <= exact.arg()
            } else {
                upper.arg() < exact.arg()
            };
            if impossible {
                return None;
            }
        }
        return Some(vec![exact]);
    }

    match (lower, upper) {
        (Some(lower), Some(upper)) => {
            let impossible = if lower.is_strict() || upper.is_strict() {
                lower.arg() >= upper.arg()
            } else {
                lower.arg() > upper.arg()
            };
            if impossible {
                None
            } else {
                Some(vec![lower, upper])
            }
        }
        (Some(lower), None) => Some(vec![lower]),
        (None, Some(upper)) => Some(vec![upper]),
        (None, None) => Some(Vec::new()),
    }
}

/// Computes the exclusive upper bound for a prefix condition by
/// incrementing the last byte of the prefix. Trailing `0xFF` bytes cannot
/// be incremented and are dropped first; an all-`0xFF` prefix has no upper
/// bound.
#[must_use]
pub fn begins_with_upper_bound(prefix: &AttributeValue) -> Option<AttributeValue> {
    fn increment(mut bytes: Vec<u8>) -> Option<Vec<u8>> {
        while bytes.last() == Some(&0xFF) {
            bytes.pop();
        }
        let last = bytes.last_mut()?;
        *last += 1;
        Some(bytes)
    }

    if let Some(s) = prefix.as_str() {
        let bytes = increment(s.as_bytes().to_vec())?;
        return Some(AttributeValue::str(String::from_utf8_lossy(&bytes).into_owned()));
    }
    if let Some(b) = prefix.as_blob() {
        let bytes = increment(b.to_vec())?;
        return Some(AttributeValue::blob(bytes::Bytes::from(bytes)));
    }
    None
}

/// Rewrites a condition into the primitive comparison operators the store
/// understands: `Between` becomes `Ge + Le`, `BeginsWith` becomes
/// `Ge(prefix) + Lt(upper)`.
fn expand_condition(condition: &Condition) -> Vec<Condition> {
    match condition.op() {
        ConditionOperator::Between => {
            let args = condition.args();
            vec![Condition::ge(args[0].clone()), Condition::le(args[1].clone())]
        }
        ConditionOperator::BeginsWith => {
            let prefix = condition.arg().clone();
            let upper = begins_with_upper_bound(&prefix);
            let mut expanded = vec![Condition::ge(prefix)];
            if let Some(upper) = upper {
                expanded.push(Condition::lt(upper));
            }
            expanded
        }
        _ => vec![condition.clone()],
    }
}

// ---------------------------------------------------------------------------
// Select
// ---------------------------------------------------------------------------

/// Parameters of a select compilation.
#[derive(Debug)]
pub struct SelectParams<'a> {
    /// Key conditions: hash key, optional range key, optional indexed
    /// attribute.
    pub conditions: &'a ConditionMap,
    /// What to return.
    pub select_type: &'a SelectType,
    /// Index to query through, when any.
    pub index_name: Option<&'a str>,
    /// Maximum row count.
    pub limit: Option<usize>,
    /// Pagination cursor from a previous page.
    pub exclusive_start_key: Option<&'a Item>,
    /// Requested ordering over the sort attribute.
    pub order_type: Option<OrderType>,
}

/// Compiles a select. Returns `Ok(None)` when condition compaction proves
/// the result empty, in which case no statement should be executed.
pub fn select_statement(t: &TableRef<'_>, params: &SelectParams<'_>) -> CoreResult<Option<String>> {
    let schema = t.schema;
    let hash_name = schema.hash_key_name();
    let range_name = schema.range_key_name();

    let indexed_attr = match params.index_name {
        Some(index_name) => Some(
            schema
                .index_def_map()
                .get(index_name)
                .map(|def| def.attribute_to_index.as_str())
                .ok_or_else(|| {
                    CoreError::Validation(format!("index '{index_name}' is not defined"))
                })?,
        ),
        None => None,
    };

    // Split the condition map into per-column lists, expanding composite
    // operators on the way.
    let mut hash_conditions: Vec<Condition> = Vec::new();
    let mut range_conditions: Vec<Condition> = Vec::new();
    let mut index_conditions: Vec<Condition> = Vec::new();
    for (attr, conditions) in params.conditions {
        let expanded: Vec<Condition> = conditions.iter().flat_map(expand_condition).collect();
        if attr == hash_name {
            hash_conditions.extend(expanded);
        } else if indexed_attr == Some(attr.as_str()) {
            index_conditions.extend(expanded);
        } else if range_name == Some(attr.as_str()) {
            range_conditions.extend(expanded);
        } else {
            return Err(CoreError::Validation(format!(
                "attribute '{attr}' cannot be used in a key condition"
            )));
        }
    }

    // The pagination cursor becomes an extra strict inequality (or an
    // equality on the hash plus an inequality on the sort attribute),
    // consistent with the requested order.
    if let Some(start_key) = params.exclusive_start_key {
        let descending = params.order_type == Some(OrderType::Desc);
        if let Some(hash_value) = start_key.get(hash_name) {
            hash_conditions.push(if range_name.is_some() || indexed_attr.is_some() {
                Condition::eq(hash_value.clone())
            } else {
                Condition::gt(hash_value.clone())
            });
        }
        if let Some(attr) = indexed_attr {
            if let Some(value) = start_key.get(attr) {
                index_conditions.push(if descending {
                    Condition::le(value.clone())
                } else {
                    Condition::ge(value.clone())
                });
            }
        }
        if let Some(range) = range_name {
            if let Some(value) = start_key.get(range) {
                range_conditions.push(if descending {
                    Condition::lt(value.clone())
                } else {
                    Condition::gt(value.clone())
                });
            }
        }
    }

    let hash_conditions = match compact(hash_conditions) {
        Some(conditions) => conditions,
        None => return Ok(None),
    };
    let range_conditions = match compact(range_conditions) {
        Some(conditions) => conditions,
        None => return Ok(None),
    };
    let index_conditions = match compact(index_conditions) {
        Some(conditions) => conditions,
        None => return Ok(None),
    };

    let mut out = format!(
        "SELECT {} FROM {}",
        if params.select_type.is_count() {
            "COUNT(*)"
        } else {
            "*"
        },
        t.qualified()
    );

    let mut prefix = " WHERE ";
    for condition in &hash_conditions {
        out.push_str(prefix);
        append_hash_condition(&mut out, hash_name, condition);
        prefix = " AND ";
    }

    if schema.has_indexes() {
        append_hidden_column_conditions(
            &mut out,
            &mut prefix,
            params.index_name,
            indexed_attr.and_then(|attr| schema.attribute_type(attr)),
            &index_conditions,
            !range_conditions.is_empty(),
            params.order_type,
        );
    }

    if let Some(range) = range_name {
        for condition in &range_conditions {
            out.push_str(prefix);
            append_column_condition(&mut out, &format!("\"{USER_PREFIX}{range}\""), condition);
            prefix = " AND ";
        }
    }

    if let Some(order) = params.order_type {
        let direction = match order {
            OrderType::Asc => "ASC",
            OrderType::Desc => "DESC",
        };
        if schema.has_indexes() {
            out.push_str(&format!(" ORDER BY {SYSTEM_COLUMN_INDEX_NAME} {direction}"));
        } else if let Some(range) = range_name {
            out.push_str(&format!(" ORDER BY \"{USER_PREFIX}{range}\" {direction}"));
        } else {
            return Err(CoreError::Validation(
                "ordering requires a range key or an index".to_owned(),
            ));
        }
    }

    if let Some(limit) = params.limit {
        out.push_str(&format!(" LIMIT {limit}"));
    }

    let hash_pinned = hash_conditions
        .first()
        .is_some_and(|c| c.op() == ConditionOperator::Eq);
    if !hash_pinned {
        out.push_str(" ALLOW FILTERING");
    }

    Ok(Some(out))
}

fn compact(conditions: Vec<Condition>) -> Option<Vec<Condition>> {
    if conditions.is_empty() {
        Some(conditions)
    } else {
        compact_conditions(conditions)
    }
}

fn append_hash_condition(out: &mut String, hash_name: &str, condition: &Condition) {
    if condition.op() == ConditionOperator::Eq {
        append_column_condition(out, &format!("\"{USER_PREFIX}{hash_name}\""), condition);
    } else {
        // Hash placement is token-ordered; bounds over the raw value make
        // no sense to the partitioner.
        out.push_str(&format!(
            "token(\"{USER_PREFIX}{hash_name}\"){}token({})",
            operator_symbol(condition.op()),
            encode_predefined_attr_value(Some(condition.arg()))
        ));
    }
}

fn append_column_condition(out: &mut String, column: &str, condition: &Condition) {
    out.push_str(&format!(
        "{column}{}{}",
        operator_symbol(condition.op()),
        encode_predefined_attr_value(Some(condition.arg()))
    ));
}

fn operator_symbol(op: ConditionOperator) -> &'static str {
    match op {
        ConditionOperator::Eq => "=",
        ConditionOperator::Lt => "<",
        ConditionOperator::Le => "<=",
        ConditionOperator::Gt => ">",
        ConditionOperator::Ge => ">=",
        other => unreachable!("operator {other} has no store symbol"),
    }
}

/// Positions the index conditions on the hidden columns. Columns ahead of
/// the indexed value column are pinned to their defaults; columns behind
/// it get an open bound so range conditions on the sort key can still
/// apply within the shadow rows.
fn append_hidden_column_conditions(
    out: &mut String,
    prefix: &mut &str,
    index_name: Option<&str>,
    indexed_attr_type: Option<AttributeType>,
    index_conditions: &[Condition],
    has_range_conditions: bool,
    order_type: Option<OrderType>,
) {
    let defaults = [
        AttributeValue::str(""),
        AttributeValue::number(0),
        AttributeValue::blob(bytes::Bytes::new()),
    ];

    let mut hidden: Vec<(usize, Condition)> = vec![(
        0,
        Condition::eq(AttributeValue::str(index_name.unwrap_or(""))),
    )];

    if index_conditions.is_empty() {
        if has_range_conditions {
            for (position, default) in defaults.iter().enumerate() {
                hidden.push((position + 1, Condition::eq(default.clone())));
            }
        }
    } else {
        let position = match indexed_attr_type {
            Some(AttributeType::Scalar(columnar_model::ElementType::String)) => 1,
            Some(AttributeType::Scalar(columnar_model::ElementType::Number)) => 2,
            Some(AttributeType::Scalar(columnar_model::ElementType::Blob)) => 3,
            // Schema validation only admits scalar indexed attributes.
            other => unreachable!("indexed attribute type {other:?}"),
        };
        for i in 1..position {
            hidden.push((i, Condition::eq(defaults[i - 1].clone())));
        }
        for condition in index_conditions {
            hidden.push((position, condition.clone()));
        }
        if has_range_conditions {
            for i in (position + 1)..LOCAL_INDEX_FIELDS.len() {
                let default = defaults[i - 1].clone();
                hidden.push((
                    i,
                    if order_type == Some(OrderType::Desc) {
                        Condition::lt(default)
                    } else {
                        Condition::gt(default)
                    },
                ));
            }
        }
    }

    for (position, condition) in hidden {
        out.push_str(prefix);
        append_column_condition(out, LOCAL_INDEX_FIELDS[position], &condition);
        *prefix = " AND ";
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

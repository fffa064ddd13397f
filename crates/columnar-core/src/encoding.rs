//! Literal encoding and row decoding.
//!
//! Predefined (schema-declared) attributes are stored in typed columns and
//! encoded as native store literals. Dynamic (schemaless) attributes are
//! stored uniformly in a `map<text, blob>` column as hex-encoded JSON of
//! the wire-level value, with a companion `map<text, text>` column tracking
//! each dynamic attribute's logical type.
//!
//! An unsupported type combination in here is a data-model invariant
//! violation, never a user-facing error.

use columnar_model::attribute::DecodedValue;
use columnar_model::{AttributeType, AttributeValue, ElementType, Item, ScalarValue, TableSchema};

use crate::error::{CoreError, CoreResult};
use crate::session::{Row, StoreScalar, StoreValue};
use crate::statement::{
    SYSTEM_COLUMN_EXTRA_ATTR_DATA, SYSTEM_COLUMN_EXTRA_ATTR_TYPES, USER_PREFIX,
};

// ---------------------------------------------------------------------------
// Literal encoding
// ---------------------------------------------------------------------------

/// Quotes a string literal, doubling embedded quotes.
#[must_use]
pub fn cql_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn encode_scalar_literal(value: &ScalarValue) -> String {
    match value {
        ScalarValue::Str(s) => cql_quote(s),
        ScalarValue::Number(n) => n.to_string(),
        ScalarValue::Blob(b) => format!("0x{}", hex::encode(b)),
    }
}

/// Encodes a predefined attribute value as a store literal. `None`
/// encodes as `null`.
#[must_use]
pub fn encode_predefined_attr_value(value: Option<&AttributeValue>) -> String {
    let Some(value) = value else {
        return "null".to_owned();
    };
    match value.value() {
        DecodedValue::Scalar(s) => encode_scalar_literal(s),
        DecodedValue::Set(set) => {
            let elements: Vec<String> = set.iter().map(encode_scalar_literal).collect();
            format!("{{{}}}", elements.join(","))
        }
        DecodedValue::Map(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}:{}", encode_scalar_literal(k), encode_scalar_literal(v)))
                .collect();
            format!("{{{}}}", entries.join(","))
        }
    }
}

/// Encodes a dynamic attribute value as a hex blob literal of its
/// JSON-serialized wire form. `None` encodes as `null`.
#[must_use]
pub fn encode_dynamic_attr_value(value: Option<&AttributeValue>) -> String {
    let Some(value) = value else {
        return "null".to_owned();
    };
    let json = serde_json::to_vec(&value.encoded_form())
        .unwrap_or_else(|_| unreachable!("encoded form is always serializable"));
    format!("0x{}", hex::encode(json))
}

// ---------------------------------------------------------------------------
// Store types
// ---------------------------------------------------------------------------

fn element_store_type(element: ElementType) -> &'static str {
    match element {
        ElementType::String => "text",
        ElementType::Number => "decimal",
        ElementType::Blob => "blob",
    }
}

/// The store column type for an attribute type, also used as the type tag
/// in the dynamic-attribute types column.
#[must_use]
pub fn store_type(attr_type: AttributeType) -> String {
    match attr_type {
        AttributeType::Scalar(e) => element_store_type(e).to_owned(),
        AttributeType::Set(e) => format!("set<{}>", element_store_type(e)),
        AttributeType::Map(k, v) => {
            format!("map<{},{}>", element_store_type(k), element_store_type(v))
        }
    }
}

fn element_from_store_type(name: &str) -> Option<ElementType> {
    match name {
        "text" => Some(ElementType::String),
        "decimal" => Some(ElementType::Number),
        "blob" => Some(ElementType::Blob),
        _ => None,
    }
}

/// Parses a store type tag back into an attribute type.
pub fn attr_type_from_store_type(tag: &str) -> CoreResult<AttributeType> {
    let unknown = || CoreError::Backend(format!("unknown store type tag: {tag:?}"));
    if let Some(inner) = tag.strip_prefix("set<").and_then(|s| s.strip_suffix('>')) {
        return element_from_store_type(inner)
            .map(AttributeType::Set)
            .ok_or_else(unknown);
    }
    if let Some(inner) = tag.strip_prefix("map<").and_then(|s| s.strip_suffix('>')) {
        let (key, value) = inner.split_once(',').ok_or_else(unknown)?;
        let key = element_from_store_type(key.trim()).ok_or_else(unknown)?;
        let value = element_from_store_type(value.trim()).ok_or_else(unknown)?;
        return Ok(AttributeType::Map(key, value));
    }
    element_from_store_type(tag)
        .map(AttributeType::Scalar)
        .ok_or_else(unknown)
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

fn scalar_from_cell(element: ElementType, cell: &StoreScalar) -> CoreResult<ScalarValue> {
    match (element, cell) {
        (ElementType::String, StoreScalar::Text(s)) => Ok(ScalarValue::Str(s.clone())),
        (ElementType::Number, StoreScalar::Decimal(n)) => Ok(ScalarValue::Number(n.clone())),
        (ElementType::Number, StoreScalar::Int(i)) => {
            Ok(ScalarValue::Number(bigdecimal::BigDecimal::from(*i)))
        }
        (ElementType::Blob, StoreScalar::Blob(b)) => Ok(ScalarValue::Blob(b.clone())),
        _ => Err(CoreError::Backend(format!(
            "cell {cell:?} does not decode as {element:?}"
        ))),
    }
}

/// Decodes a predefined attribute cell using its schema-declared type.
pub fn decode_predefined_attr(
    attr_type: AttributeType,
    cell: &StoreValue,
) -> CoreResult<AttributeValue> {
    let decoded = match (attr_type, cell) {
        (AttributeType::Scalar(e), StoreValue::Scalar(s)) => {
            DecodedValue::Scalar(scalar_from_cell(e, s)?)
        }
        (AttributeType::Set(e), StoreValue::Set(set)) => DecodedValue::Set(
            set.iter()
                .map(|s| scalar_from_cell(e, s))
                .collect::<CoreResult<_>>()?,
        ),
        (AttributeType::Map(k, v), StoreValue::Map(map)) => DecodedValue::Map(
            map.iter()
                .map(|(mk, mv)| Ok((scalar_from_cell(k, mk)?, scalar_from_cell(v, mv)?)))
                .collect::<CoreResult<_>>()?,
        ),
        _ => {
            return Err(CoreError::Backend(format!(
                "cell {cell:?} does not decode as {attr_type}"
            )));
        }
    };
    AttributeValue::new(attr_type, decoded).map_err(|e| CoreError::Backend(e.to_string()))
}

/// Decodes a dynamic attribute blob using its companion type tag.
pub fn decode_dynamic_value(blob: &[u8], type_tag: &str) -> CoreResult<AttributeValue> {
    let attr_type = attr_type_from_store_type(type_tag)?;
    let encoded: serde_json::Value = serde_json::from_slice(blob)
        .map_err(|e| CoreError::Backend(format!("dynamic attribute blob is not JSON: {e}")))?;
    AttributeValue::from_encoded(attr_type, &encoded)
        .map_err(|e| CoreError::Backend(e.to_string()))
}

/// Decodes a result row into an item: predefined attributes from their
/// typed columns, dynamic attributes from the auxiliary map columns.
/// System columns are skipped.
pub fn decode_row(schema: &TableSchema, row: &Row) -> CoreResult<Item> {
    let mut item = Item::new();

    for (column, cell) in row.iter() {
        if cell.is_null() {
            continue;
        }
        if let Some(name) = column.strip_prefix(USER_PREFIX) {
            if let Some(attr_type) = schema.attribute_type(name) {
                item.insert(name.to_owned(), decode_predefined_attr(attr_type, cell)?);
            }
        }
    }

    let types = row
        .get(SYSTEM_COLUMN_EXTRA_ATTR_TYPES)
        .and_then(StoreValue::as_map);
    if let Some(data) = row
        .get(SYSTEM_COLUMN_EXTRA_ATTR_DATA)
        .and_then(StoreValue::as_map)
    {
        for (key, value) in data {
            let (StoreScalar::Text(name), StoreScalar::Blob(blob)) = (key, value) else {
                return Err(CoreError::Backend(
                    "malformed dynamic attribute data column".to_owned(),
                ));
            };
            let tag = types
                .and_then(|m| m.get(&StoreScalar::Text(name.clone())))
                .and_then(|v| match v {
                    StoreScalar::Text(t) => Some(t.as_str()),
                    _ => None,
                })
                .ok_or_else(|| {
                    CoreError::Backend(format!("dynamic attribute '{name}' has no type tag"))
                })?;
            item.insert(name.clone(), decode_dynamic_value(blob, tag)?);
        }
    }

    Ok(item)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use bytes::Bytes;
    use columnar_model::attribute::DecodedValue;

    use super::*;

    #[test]
    fn test_should_encode_null() {
        assert_eq!(encode_predefined_attr_value(None), "null");
        assert_eq!(encode_dynamic_attr_value(None), "null");
    }

    #[test]
    fn test_should_encode_scalar_literals() {
        assert_eq!(
            encode_predefined_attr_value(Some(&AttributeValue::str("a'b"))),
            "'a''b'"
        );
        assert_eq!(
            encode_predefined_attr_value(Some(
                &AttributeValue::number_from_str("-1.5").unwrap()
            )),
            "-1.5"
        );
        assert_eq!(
            encode_predefined_attr_value(Some(&AttributeValue::blob(Bytes::from_static(
                b"\x01\xff"
            )))),
            "0x01ff"
        );
    }

    #[test]
    fn test_should_encode_set_literals() {
        assert_eq!(
            encode_predefined_attr_value(Some(&AttributeValue::str_set(["b", "a"]))),
            "{'a','b'}"
        );
        assert_eq!(
            encode_predefined_attr_value(Some(&AttributeValue::number_set([2, 1]))),
            "{1,2}"
        );
    }

    #[test]
    fn test_should_encode_map_literal() {
        let map_type = AttributeType::Map(ElementType::String, ElementType::Number);
        let mut entries = BTreeMap::new();
        entries.insert(
            ScalarValue::Str("k".to_owned()),
            ScalarValue::Number(bigdecimal::BigDecimal::from(3)),
        );
        let value = AttributeValue::new(map_type, DecodedValue::Map(entries)).unwrap();
        assert_eq!(encode_predefined_attr_value(Some(&value)), "{'k':3}");
    }

    #[test]
    fn test_should_roundtrip_dynamic_encoding() {
        let cases = [
            AttributeValue::str("hello"),
            AttributeValue::number_from_str("42.5").unwrap(),
            AttributeValue::blob(Bytes::from_static(b"\x00\x01")),
            AttributeValue::str_set(["x", "y"]),
            AttributeValue::number_set([7]),
            AttributeValue::blob_set([Bytes::from_static(b"z")]),
        ];
        for value in cases {
            let literal = encode_dynamic_attr_value(Some(&value));
            let hex_body = literal.strip_prefix("0x").unwrap();
            let blob = hex::decode(hex_body).unwrap();
            let tag = store_type(value.attr_type());
            let back = decode_dynamic_value(&blob, &tag).unwrap();
            assert_eq!(value, back);
        }
    }

    #[test]
    fn test_should_map_store_types_both_ways() {
        let cases = [
            (AttributeType::STRING, "text"),
            (AttributeType::NUMBER, "decimal"),
            (AttributeType::BLOB, "blob"),
            (AttributeType::STRING_SET, "set<text>"),
            (AttributeType::NUMBER_SET, "set<decimal>"),
            (AttributeType::BLOB_SET, "set<blob>"),
            (
                AttributeType::Map(ElementType::String, ElementType::Number),
                "map<text,decimal>",
            ),
        ];
        for (attr_type, name) in cases {
            assert_eq!(store_type(attr_type), name);
            assert_eq!(attr_type_from_store_type(name).unwrap(), attr_type);
        }
    }

    #[test]
    fn test_should_decode_predefined_cells() {
        let value = decode_predefined_attr(
            AttributeType::STRING,
            &StoreValue::Scalar(StoreScalar::Text("v".to_owned())),
        )
        .unwrap();
        assert_eq!(value, AttributeValue::str("v"));

        let set_cell = StoreValue::Set(BTreeSet::from([
            StoreScalar::Text("a".to_owned()),
            StoreScalar::Text("b".to_owned()),
        ]));
        let value = decode_predefined_attr(AttributeType::STRING_SET, &set_cell).unwrap();
        assert_eq!(value, AttributeValue::str_set(["a", "b"]));
    }

    #[test]
    fn test_should_reject_mismatched_cell() {
        let result = decode_predefined_attr(
            AttributeType::NUMBER,
            &StoreValue::Scalar(StoreScalar::Text("v".to_owned())),
        );
        assert!(matches!(result, Err(CoreError::Backend(_))));
    }

    #[test]
    fn test_should_decode_row_with_dynamic_attrs() {
        let schema = TableSchema::new(
            BTreeMap::from([("id".to_owned(), AttributeType::STRING)]),
            vec!["id".to_owned()],
            BTreeMap::new(),
        )
        .unwrap();

        let dynamic = AttributeValue::number_from_str("5").unwrap();
        let literal = encode_dynamic_attr_value(Some(&dynamic));
        let blob = hex::decode(literal.strip_prefix("0x").unwrap()).unwrap();

        let row: Row = [
            (
                "user_id".to_owned(),
                StoreValue::Scalar(StoreScalar::Text("k1".to_owned())),
            ),
            (
                SYSTEM_COLUMN_EXTRA_ATTR_DATA.to_owned(),
                StoreValue::Map(BTreeMap::from([(
                    StoreScalar::Text("extra".to_owned()),
                    StoreScalar::Blob(Bytes::from(blob)),
                )])),
            ),
            (
                SYSTEM_COLUMN_EXTRA_ATTR_TYPES.to_owned(),
                StoreValue::Map(BTreeMap::from([(
                    StoreScalar::Text("extra".to_owned()),
                    StoreScalar::Text("decimal".to_owned()),
                )])),
            ),
        ]
        .into_iter()
        .collect();

        let item = decode_row(&schema, &row).unwrap();
        assert_eq!(item.get("id"), Some(&AttributeValue::str("k1")));
        assert_eq!(item.get("extra"), Some(&dynamic));
    }
}

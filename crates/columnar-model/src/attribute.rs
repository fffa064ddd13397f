//! Attribute types and values.
//!
//! An [`AttributeType`] is a primitive element type (`String`, `Number`,
//! `Blob`) optionally wrapped as a set or map collection over primitives.
//! Collection-of-collection is unrepresentable by construction.
//!
//! An [`AttributeValue`] pairs a type with its decoded value. Decoding
//! converts wire-level encoded values (strings / base64 strings / lists)
//! into native forms: numbers become arbitrary-precision decimals with a
//! fixed precision of 38 significant digits, blobs become raw bytes, sets
//! become ordered unique element collections. Equality and ordering are
//! defined on `(type, decoded value)`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use base64::Engine;
use bigdecimal::BigDecimal;
use bytes::Bytes;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::ModelError;

/// Maximum number of significant digits a stored number may carry.
pub const MAX_SIGNIFICANT_DIGITS: u64 = 38;

// ---------------------------------------------------------------------------
// AttributeType
// ---------------------------------------------------------------------------

/// Primitive element type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElementType {
    /// UTF-8 string.
    String,
    /// Arbitrary-precision decimal number.
    Number,
    /// Raw bytes.
    Blob,
}

impl ElementType {
    /// Single-letter wire code (`S`, `N`, `B`).
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::String => "S",
            Self::Number => "N",
            Self::Blob => "B",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "S" => Some(Self::String),
            "N" => Some(Self::Number),
            "B" => Some(Self::Blob),
            _ => None,
        }
    }
}

/// The type of an attribute: a primitive, a set of primitives, or a map
/// from primitive keys to primitive values.
///
/// Immutable value type. Invalid type codes fail validation at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttributeType {
    /// A single primitive value.
    Scalar(ElementType),
    /// An unordered collection of unique primitives.
    Set(ElementType),
    /// A map from primitive keys to primitive values.
    Map(ElementType, ElementType),
}

impl AttributeType {
    /// Shorthand for the scalar string type.
    pub const STRING: Self = Self::Scalar(ElementType::String);
    /// Shorthand for the scalar number type.
    pub const NUMBER: Self = Self::Scalar(ElementType::Number);
    /// Shorthand for the scalar blob type.
    pub const BLOB: Self = Self::Scalar(ElementType::Blob);
    /// Shorthand for the string set type.
    pub const STRING_SET: Self = Self::Set(ElementType::String);
    /// Shorthand for the number set type.
    pub const NUMBER_SET: Self = Self::Set(ElementType::Number);
    /// Shorthand for the blob set type.
    pub const BLOB_SET: Self = Self::Set(ElementType::Blob);

    /// The element type: the primitive itself for scalars, the element for
    /// sets, the value type for maps.
    #[must_use]
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::Scalar(e) | Self::Set(e) | Self::Map(_, e) => *e,
        }
    }

    /// Returns `true` for set and map types.
    #[must_use]
    pub fn is_collection(&self) -> bool {
        !matches!(self, Self::Scalar(_))
    }

    /// Returns `true` for scalar types.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar(_))
    }

    /// The wire code: `S`/`N`/`B` for scalars, `SS`/`NS`/`BS` for sets,
    /// `<key><value>M` (e.g. `SNM`) for maps.
    #[must_use]
    pub fn code(&self) -> String {
        match self {
            Self::Scalar(e) => e.code().to_owned(),
            Self::Set(e) => format!("{}S", e.code()),
            Self::Map(k, v) => format!("{}{}M", k.code(), v.code()),
        }
    }

    /// Parses a wire code into an attribute type.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidTypeCode` for unknown codes.
    pub fn parse(code: &str) -> Result<Self, ModelError> {
        let invalid = || ModelError::InvalidTypeCode(code.to_owned());
        match code.len() {
            1 => ElementType::from_code(code)
                .map(Self::Scalar)
                .ok_or_else(invalid),
            2 if code.ends_with('S') => ElementType::from_code(&code[..1])
                .map(Self::Set)
                .ok_or_else(invalid),
            3 if code.ends_with('M') => {
                let key = ElementType::from_code(&code[..1]).ok_or_else(invalid)?;
                let value = ElementType::from_code(&code[1..2]).ok_or_else(invalid)?;
                Ok(Self::Map(key, value))
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

impl Serialize for AttributeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.code())
    }
}

impl<'de> Deserialize<'de> for AttributeType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Self::parse(&code).map_err(de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Decoded values
// ---------------------------------------------------------------------------

/// A decoded primitive value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScalarValue {
    /// String.
    Str(String),
    /// Arbitrary-precision decimal.
    Number(BigDecimal),
    /// Raw bytes.
    Blob(Bytes),
}

impl ScalarValue {
    fn element_type(&self) -> ElementType {
        match self {
            Self::Str(_) => ElementType::String,
            Self::Number(_) => ElementType::Number,
            Self::Blob(_) => ElementType::Blob,
        }
    }
}

/// The decoded value of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum DecodedValue {
    /// A single primitive.
    Scalar(ScalarValue),
    /// A set of primitives, ordered for determinism.
    Set(BTreeSet<ScalarValue>),
    /// A map of primitive keys to primitive values.
    Map(BTreeMap<ScalarValue, ScalarValue>),
}

// ---------------------------------------------------------------------------
// AttributeValue
// ---------------------------------------------------------------------------

/// A typed attribute value.
///
/// Instances are immutable and freely shared. Ordering is defined on
/// `(type, decoded value)`; comparisons are only meaningful between values
/// of the same attribute type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AttributeValue {
    attr_type: AttributeType,
    value: DecodedValue,
}

impl AttributeValue {
    /// Creates a value, validating that the decoded value agrees with the
    /// declared type.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidValue` on type/value disagreement.
    pub fn new(attr_type: AttributeType, value: DecodedValue) -> Result<Self, ModelError> {
        let agrees = match (&attr_type, &value) {
            (AttributeType::Scalar(e), DecodedValue::Scalar(s)) => s.element_type() == *e,
            (AttributeType::Set(e), DecodedValue::Set(set)) => {
                set.iter().all(|s| s.element_type() == *e)
            }
            (AttributeType::Map(k, v), DecodedValue::Map(map)) => map
                .iter()
                .all(|(mk, mv)| mk.element_type() == *k && mv.element_type() == *v),
            _ => false,
        };
        if !agrees {
            return Err(ModelError::InvalidValue(format!(
                "decoded value does not match declared type {attr_type}"
            )));
        }
        Ok(Self { attr_type, value })
    }

    /// Creates a string value.
    pub fn str(value: impl Into<String>) -> Self {
        Self {
            attr_type: AttributeType::STRING,
            value: DecodedValue::Scalar(ScalarValue::Str(value.into())),
        }
    }

    /// Creates a number value from anything convertible to a decimal.
    pub fn number(value: impl Into<BigDecimal>) -> Self {
        Self {
            attr_type: AttributeType::NUMBER,
            value: DecodedValue::Scalar(ScalarValue::Number(value.into())),
        }
    }

    /// Parses a number value from its wire string, enforcing the precision
    /// limit.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidValue` for unparsable input and
    /// `ModelError::NumberPrecision` when the number carries more than
    /// [`MAX_SIGNIFICANT_DIGITS`] significant digits.
    pub fn number_from_str(value: &str) -> Result<Self, ModelError> {
        let decimal = BigDecimal::from_str(value)
            .map_err(|_| ModelError::InvalidValue(format!("not a number: {value:?}")))?;
        check_precision(&decimal)?;
        Ok(Self::number(decimal))
    }

    /// Creates a blob value.
    pub fn blob(value: impl Into<Bytes>) -> Self {
        Self {
            attr_type: AttributeType::BLOB,
            value: DecodedValue::Scalar(ScalarValue::Blob(value.into())),
        }
    }

    /// Creates a string set value.
    pub fn str_set<I: IntoIterator<Item = S>, S: Into<String>>(values: I) -> Self {
        Self {
            attr_type: AttributeType::STRING_SET,
            value: DecodedValue::Set(
                values
                    .into_iter()
                    .map(|s| ScalarValue::Str(s.into()))
                    .collect(),
            ),
        }
    }

    /// Creates a number set value.
    pub fn number_set<I: IntoIterator<Item = N>, N: Into<BigDecimal>>(values: I) -> Self {
        Self {
            attr_type: AttributeType::NUMBER_SET,
            value: DecodedValue::Set(
                values
                    .into_iter()
                    .map(|n| ScalarValue::Number(n.into()))
                    .collect(),
            ),
        }
    }

    /// Creates a blob set value.
    pub fn blob_set<I: IntoIterator<Item = B>, B: Into<Bytes>>(values: I) -> Self {
        Self {
            attr_type: AttributeType::BLOB_SET,
            value: DecodedValue::Set(
                values
                    .into_iter()
                    .map(|b| ScalarValue::Blob(b.into()))
                    .collect(),
            ),
        }
    }

    /// The declared type.
    #[must_use]
    pub fn attr_type(&self) -> AttributeType {
        self.attr_type
    }

    /// The decoded value.
    #[must_use]
    pub fn value(&self) -> &DecodedValue {
        &self.value
    }

    /// Returns the string if this is a scalar string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            DecodedValue::Scalar(ScalarValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Returns the decimal if this is a scalar number value.
    #[must_use]
    pub fn as_number(&self) -> Option<&BigDecimal> {
        match &self.value {
            DecodedValue::Scalar(ScalarValue::Number(n)) => Some(n),
            _ => None,
        }
    }

    /// Returns the bytes if this is a scalar blob value.
    #[must_use]
    pub fn as_blob(&self) -> Option<&Bytes> {
        match &self.value {
            DecodedValue::Scalar(ScalarValue::Blob(b)) => Some(b),
            _ => None,
        }
    }

    /// Returns the element set if this is a set value.
    #[must_use]
    pub fn as_set(&self) -> Option<&BTreeSet<ScalarValue>> {
        match &self.value {
            DecodedValue::Set(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the entry map if this is a map value.
    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<ScalarValue, ScalarValue>> {
        match &self.value {
            DecodedValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Decodes a wire-level encoded value (JSON shape: string for scalars,
    /// array for sets, object for maps) into a typed value.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidValue` when the JSON shape or element
    /// encoding does not match the declared type, and
    /// `ModelError::NumberPrecision` for over-precise numbers.
    pub fn from_encoded(
        attr_type: AttributeType,
        encoded: &serde_json::Value,
    ) -> Result<Self, ModelError> {
        let value = match attr_type {
            AttributeType::Scalar(element) => {
                DecodedValue::Scalar(decode_scalar(element, encoded)?)
            }
            AttributeType::Set(element) => {
                let list = encoded.as_array().ok_or_else(|| {
                    ModelError::InvalidValue(format!("expected a list for {attr_type}"))
                })?;
                DecodedValue::Set(
                    list.iter()
                        .map(|e| decode_scalar(element, e))
                        .collect::<Result<_, _>>()?,
                )
            }
            AttributeType::Map(key, val) => {
                let object = encoded.as_object().ok_or_else(|| {
                    ModelError::InvalidValue(format!("expected an object for {attr_type}"))
                })?;
                DecodedValue::Map(
                    object
                        .iter()
                        .map(|(k, v)| {
                            Ok((
                                decode_scalar(key, &serde_json::Value::String(k.clone()))?,
                                decode_scalar(val, v)?,
                            ))
                        })
                        .collect::<Result<_, ModelError>>()?,
                )
            }
        };
        Ok(Self { attr_type, value })
    }

    /// The wire-level encoded form of this value, suitable for JSON
    /// serialization. Inverse of [`AttributeValue::from_encoded`].
    #[must_use]
    pub fn encoded_form(&self) -> serde_json::Value {
        match &self.value {
            DecodedValue::Scalar(s) => encode_scalar(s),
            DecodedValue::Set(set) => {
                serde_json::Value::Array(set.iter().map(encode_scalar).collect())
            }
            DecodedValue::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (encode_scalar_as_string(k), encode_scalar(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            DecodedValue::Scalar(ScalarValue::Str(s)) => write!(f, "{{S: {s}}}"),
            DecodedValue::Scalar(ScalarValue::Number(n)) => write!(f, "{{N: {n}}}"),
            DecodedValue::Scalar(ScalarValue::Blob(b)) => write!(f, "{{B: {} bytes}}", b.len()),
            DecodedValue::Set(s) => write!(f, "{{{}: {} items}}", self.attr_type, s.len()),
            DecodedValue::Map(m) => write!(f, "{{{}: {} keys}}", self.attr_type, m.len()),
        }
    }
}

fn decode_scalar(element: ElementType, encoded: &serde_json::Value) -> Result<ScalarValue, ModelError> {
    let text = encoded
        .as_str()
        .ok_or_else(|| ModelError::InvalidValue(format!("expected a string, got {encoded}")))?;
    match element {
        ElementType::String => Ok(ScalarValue::Str(text.to_owned())),
        ElementType::Number => {
            let decimal = BigDecimal::from_str(text)
                .map_err(|_| ModelError::InvalidValue(format!("not a number: {text:?}")))?;
            check_precision(&decimal)?;
            Ok(ScalarValue::Number(decimal))
        }
        ElementType::Blob => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(text)
                .map_err(|e| ModelError::InvalidValue(format!("invalid base64: {e}")))?;
            Ok(ScalarValue::Blob(Bytes::from(bytes)))
        }
    }
}

fn encode_scalar(value: &ScalarValue) -> serde_json::Value {
    serde_json::Value::String(encode_scalar_as_string(value))
}

fn encode_scalar_as_string(value: &ScalarValue) -> String {
    match value {
        ScalarValue::Str(s) => s.clone(),
        ScalarValue::Number(n) => n.to_string(),
        ScalarValue::Blob(b) => base64::engine::general_purpose::STANDARD.encode(b),
    }
}

fn check_precision(decimal: &BigDecimal) -> Result<(), ModelError> {
    if decimal.clone().normalized().digits() > MAX_SIGNIFICANT_DIGITS {
        return Err(ModelError::NumberPrecision(MAX_SIGNIFICANT_DIGITS));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_parse_scalar_type_codes() {
        assert_eq!(AttributeType::parse("S").unwrap(), AttributeType::STRING);
        assert_eq!(AttributeType::parse("N").unwrap(), AttributeType::NUMBER);
        assert_eq!(AttributeType::parse("B").unwrap(), AttributeType::BLOB);
    }

    #[test]
    fn test_should_parse_collection_type_codes() {
        assert_eq!(
            AttributeType::parse("SS").unwrap(),
            AttributeType::STRING_SET
        );
        assert_eq!(
            AttributeType::parse("NS").unwrap(),
            AttributeType::NUMBER_SET
        );
        assert_eq!(
            AttributeType::parse("SNM").unwrap(),
            AttributeType::Map(ElementType::String, ElementType::Number)
        );
    }

    #[test]
    fn test_should_reject_invalid_type_codes() {
        for code in ["", "X", "SX", "XXM", "SSS", "SSMM"] {
            assert!(matches!(
                AttributeType::parse(code),
                Err(ModelError::InvalidTypeCode(_))
            ));
        }
    }

    #[test]
    fn test_should_roundtrip_type_codes() {
        for code in ["S", "N", "B", "SS", "NS", "BS", "SNM", "BBM", "NSM"] {
            let parsed = AttributeType::parse(code).unwrap();
            assert_eq!(parsed.code(), code);
        }
    }

    #[test]
    fn test_should_serialize_type_as_code_string() {
        let json = serde_json::to_string(&AttributeType::STRING_SET).unwrap();
        assert_eq!(json, r#""SS""#);
        let back: AttributeType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AttributeType::STRING_SET);
    }

    #[test]
    fn test_should_roundtrip_encoded_string() {
        let val = AttributeValue::str("hello");
        let encoded = val.encoded_form();
        let back = AttributeValue::from_encoded(AttributeType::STRING, &encoded).unwrap();
        assert_eq!(val, back);
    }

    #[test]
    fn test_should_roundtrip_encoded_number() {
        let val = AttributeValue::number_from_str("-12.345").unwrap();
        let encoded = val.encoded_form();
        let back = AttributeValue::from_encoded(AttributeType::NUMBER, &encoded).unwrap();
        assert_eq!(val, back);
    }

    #[test]
    fn test_should_roundtrip_encoded_blob() {
        let val = AttributeValue::blob(Bytes::from_static(b"\x00\x01\xff"));
        let encoded = val.encoded_form();
        let back = AttributeValue::from_encoded(AttributeType::BLOB, &encoded).unwrap();
        assert_eq!(val, back);
    }

    #[test]
    fn test_should_roundtrip_encoded_sets() {
        let cases = [
            AttributeValue::str_set(["a", "b", "c"]),
            AttributeValue::number_set([1, 2, 3]),
            AttributeValue::blob_set([Bytes::from_static(b"x"), Bytes::from_static(b"y")]),
        ];
        for val in cases {
            let encoded = val.encoded_form();
            let back = AttributeValue::from_encoded(val.attr_type(), &encoded).unwrap();
            assert_eq!(val, back);
        }
    }

    #[test]
    fn test_should_roundtrip_encoded_map() {
        let map_type = AttributeType::Map(ElementType::String, ElementType::Number);
        let mut entries = BTreeMap::new();
        entries.insert(
            ScalarValue::Str("k".to_owned()),
            ScalarValue::Number(BigDecimal::from(7)),
        );
        let val = AttributeValue::new(map_type, DecodedValue::Map(entries)).unwrap();
        let encoded = val.encoded_form();
        let back = AttributeValue::from_encoded(map_type, &encoded).unwrap();
        assert_eq!(val, back);
    }

    #[test]
    fn test_should_reject_over_precise_number() {
        let forty_digits = "1".repeat(40);
        assert!(matches!(
            AttributeValue::number_from_str(&forty_digits),
            Err(ModelError::NumberPrecision(_))
        ));
    }

    #[test]
    fn test_should_accept_38_digit_number() {
        let thirty_eight = "9".repeat(38);
        assert!(AttributeValue::number_from_str(&thirty_eight).is_ok());
    }

    #[test]
    fn test_should_reject_value_type_disagreement() {
        let result = AttributeValue::new(
            AttributeType::NUMBER,
            DecodedValue::Scalar(ScalarValue::Str("oops".to_owned())),
        );
        assert!(matches!(result, Err(ModelError::InvalidValue(_))));
    }

    #[test]
    fn test_should_order_numbers_numerically() {
        let two = AttributeValue::number_from_str("2").unwrap();
        let ten = AttributeValue::number_from_str("10").unwrap();
        assert!(two < ten);

        let neg = AttributeValue::number_from_str("-5").unwrap();
        assert!(neg < two);
    }

    #[test]
    fn test_should_order_strings_bytewise() {
        assert!(AttributeValue::str("abc") < AttributeValue::str("abd"));
        assert!(AttributeValue::str("a") < AttributeValue::str("aa"));
    }

    #[test]
    fn test_should_dedupe_set_elements() {
        let set = AttributeValue::str_set(["a", "a", "b"]);
        assert_eq!(set.as_set().map(BTreeSet::len), Some(2));
    }
}

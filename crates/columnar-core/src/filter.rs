//! Client-side condition evaluation.
//!
//! Evaluates a map of per-attribute condition lists against an in-memory
//! row. Used for scan post-filtering and for checking write preconditions
//! against the row read by the retry protocol, where the store round trip
//! cannot express the exact predicate.
//!
//! A type mismatch between the operand and the row value means the
//! condition is not satisfied, never an error. The one exception:
//! `Contains`/`NotContains` with a collection-typed *argument* is a
//! programming error, since membership is only defined for scalar
//! operands.

use columnar_model::attribute::DecodedValue;
use columnar_model::{
    AttributeValue, Condition, ConditionMap, ConditionOperator, Item, ScalarValue,
};

/// Whether the row satisfies every condition in the map (logical AND).
#[must_use]
pub fn conditions_satisfied(row: Option<&Item>, condition_map: &ConditionMap) -> bool {
    condition_map.iter().all(|(attr_name, conditions)| {
        let attr_value = row.and_then(|item| item.get(attr_name));
        conditions
            .iter()
            .all(|condition| condition_satisfied(attr_value, condition))
    })
}

/// Whether a single attribute value satisfies a condition.
#[must_use]
pub fn condition_satisfied(attr_value: Option<&AttributeValue>, condition: &Condition) -> bool {
    match condition.op() {
        ConditionOperator::Exists => return attr_value.is_some(),
        ConditionOperator::NotExists => return attr_value.is_none(),
        _ => {}
    }

    let Some(value) = attr_value else {
        return false;
    };

    match condition.op() {
        ConditionOperator::Eq => value == condition.arg(),
        ConditionOperator::Ne => value != condition.arg(),
        ConditionOperator::Lt => same_type(value, condition.arg()) && value < condition.arg(),
        ConditionOperator::Le => same_type(value, condition.arg()) && value <= condition.arg(),
        ConditionOperator::Gt => same_type(value, condition.arg()) && value > condition.arg(),
        ConditionOperator::Ge => same_type(value, condition.arg()) && value >= condition.arg(),
        ConditionOperator::Between => {
            let args = condition.args();
            same_type(value, &args[0])
                && same_type(value, &args[1])
                && *value >= args[0]
                && *value <= args[1]
        }
        ConditionOperator::BeginsWith => begins_with(value, condition.arg()),
        ConditionOperator::Contains => contains(value, condition.arg()),
        ConditionOperator::NotContains => {
            contains_applicable(value, condition.arg()) && !contains(value, condition.arg())
        }
        ConditionOperator::In => condition.args().contains(value),
        ConditionOperator::Exists | ConditionOperator::NotExists => unreachable!(),
    }
}

fn same_type(a: &AttributeValue, b: &AttributeValue) -> bool {
    a.attr_type() == b.attr_type()
}

fn begins_with(value: &AttributeValue, prefix: &AttributeValue) -> bool {
    if let (Some(v), Some(p)) = (value.as_str(), prefix.as_str()) {
        return v.starts_with(p);
    }
    if let (Some(v), Some(p)) = (value.as_blob(), prefix.as_blob()) {
        return v.starts_with(p);
    }
    false
}

fn contains_argument_scalar(argument: &AttributeValue) -> &ScalarValue {
    match argument.value() {
        DecodedValue::Scalar(scalar) => scalar,
        // The argument of a containment test must be a scalar; a
        // collection argument is a bug in the caller, not a runtime
        // condition.
        _ => unreachable!("containment argument must be a scalar"),
    }
}

fn contains_applicable(value: &AttributeValue, argument: &AttributeValue) -> bool {
    let scalar = contains_argument_scalar(argument);
    match value.value() {
        DecodedValue::Scalar(ScalarValue::Str(_)) => matches!(scalar, ScalarValue::Str(_)),
        DecodedValue::Scalar(ScalarValue::Blob(_)) => matches!(scalar, ScalarValue::Blob(_)),
        DecodedValue::Scalar(ScalarValue::Number(_)) => false,
        DecodedValue::Set(_) => value.attr_type().element_type() == argument.attr_type().element_type(),
        DecodedValue::Map(_) => false,
    }
}

fn contains(value: &AttributeValue, argument: &AttributeValue) -> bool {
    let scalar = contains_argument_scalar(argument);
    match value.value() {
        DecodedValue::Scalar(ScalarValue::Str(haystack)) => match scalar {
            ScalarValue::Str(needle) => haystack.contains(needle.as_str()),
            _ => false,
        },
        DecodedValue::Scalar(ScalarValue::Blob(haystack)) => match scalar {
            ScalarValue::Blob(needle) => {
                needle.is_empty()
                    || haystack
                        .windows(needle.len())
                        .any(|window| window == &needle[..])
            }
            _ => false,
        },
        DecodedValue::Set(elements) => {
            value.attr_type().element_type() == argument.attr_type().element_type()
                && elements.contains(scalar)
        }
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use bytes::Bytes;
    use columnar_model::Condition;

    use super::*;

    fn item(pairs: &[(&str, AttributeValue)]) -> Item {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    fn condition_map(attr: &str, conditions: Vec<Condition>) -> ConditionMap {
        BTreeMap::from([(attr.to_owned(), conditions)])
    }

    #[test]
    fn test_should_satisfy_equality() {
        let row = item(&[("a", AttributeValue::str("x"))]);
        assert!(conditions_satisfied(
            Some(&row),
            &condition_map("a", vec![Condition::eq(AttributeValue::str("x"))])
        ));
        assert!(!conditions_satisfied(
            Some(&row),
            &condition_map("a", vec![Condition::eq(AttributeValue::str("y"))])
        ));
    }

    #[test]
    fn test_should_treat_type_mismatch_as_unsatisfied() {
        let row = item(&[("a", AttributeValue::str("5"))]);
        assert!(!conditions_satisfied(
            Some(&row),
            &condition_map("a", vec![Condition::lt(AttributeValue::number(9))])
        ));
        // NE is satisfied on type mismatch: the values differ.
        assert!(conditions_satisfied(
            Some(&row),
            &condition_map("a", vec![Condition::ne(AttributeValue::number(5))])
        ));
    }

    #[test]
    fn test_should_evaluate_range_operators() {
        let row = item(&[("n", AttributeValue::number(5))]);
        let checks = [
            (Condition::lt(AttributeValue::number(6)), true),
            (Condition::lt(AttributeValue::number(5)), false),
            (Condition::le(AttributeValue::number(5)), true),
            (Condition::gt(AttributeValue::number(4)), true),
            (Condition::ge(AttributeValue::number(6)), false),
            (
                Condition::between(AttributeValue::number(4), AttributeValue::number(6)),
                true,
            ),
            (
                Condition::between(AttributeValue::number(6), AttributeValue::number(7)),
                false,
            ),
        ];
        for (condition, expected) in checks {
            assert_eq!(
                conditions_satisfied(Some(&row), &condition_map("n", vec![condition.clone()])),
                expected,
                "condition {condition:?}"
            );
        }
    }

    #[test]
    fn test_should_evaluate_existence() {
        let row = item(&[("a", AttributeValue::str("x"))]);
        assert!(condition_satisfied(row.get("a"), &Condition::exists()));
        assert!(condition_satisfied(row.get("missing"), &Condition::not_exists()));
        assert!(!condition_satisfied(row.get("missing"), &Condition::exists()));
        assert!(!conditions_satisfied(
            None,
            &condition_map("a", vec![Condition::exists()])
        ));
    }

    #[test]
    fn test_should_evaluate_string_containment() {
        let value = AttributeValue::str("22");
        assert!(condition_satisfied(
            Some(&value),
            &Condition::contains(AttributeValue::str("2"))
        ));
        assert!(!condition_satisfied(
            Some(&value),
            &Condition::not_contains(AttributeValue::str("2"))
        ));

        let other = AttributeValue::str("1");
        assert!(condition_satisfied(
            Some(&other),
            &Condition::not_contains(AttributeValue::str("2"))
        ));
    }

    #[test]
    fn test_should_evaluate_set_membership() {
        let value = AttributeValue::str_set(["a", "b"]);
        assert!(condition_satisfied(
            Some(&value),
            &Condition::contains(AttributeValue::str("a"))
        ));
        assert!(condition_satisfied(
            Some(&value),
            &Condition::not_contains(AttributeValue::str("c"))
        ));
        // Element type mismatch: not satisfied either way.
        assert!(!condition_satisfied(
            Some(&value),
            &Condition::contains(AttributeValue::number(1))
        ));
        assert!(!condition_satisfied(
            Some(&value),
            &Condition::not_contains(AttributeValue::number(1))
        ));
    }

    #[test]
    fn test_should_evaluate_blob_containment() {
        let value = AttributeValue::blob(Bytes::from_static(b"\x01\x02\x03"));
        assert!(condition_satisfied(
            Some(&value),
            &Condition::contains(AttributeValue::blob(Bytes::from_static(b"\x02\x03")))
        ));
        assert!(!condition_satisfied(
            Some(&value),
            &Condition::contains(AttributeValue::blob(Bytes::from_static(b"\x04")))
        ));
    }

    #[test]
    fn test_should_evaluate_in_and_begins_with() {
        let value = AttributeValue::str("user#42");
        assert!(condition_satisfied(
            Some(&value),
            &Condition::begins_with(AttributeValue::str("user#"))
        ));
        assert!(!condition_satisfied(
            Some(&value),
            &Condition::begins_with(AttributeValue::str("order#"))
        ));
        assert!(condition_satisfied(
            Some(&value),
            &Condition::is_in(vec![
                AttributeValue::str("user#41"),
                AttributeValue::str("user#42"),
            ])
        ));
    }

    #[test]
    fn test_should_require_all_conditions_across_attributes() {
        let row = item(&[
            ("a", AttributeValue::str("x")),
            ("n", AttributeValue::number(3)),
        ]);
        let mut map = condition_map("a", vec![Condition::eq(AttributeValue::str("x"))]);
        map.insert(
            "n".to_owned(),
            vec![Condition::gt(AttributeValue::number(5))],
        );
        assert!(!conditions_satisfied(Some(&row), &map));
    }
}

//! Conditions on attribute values.
//!
//! A condition is a tagged pair of an operator and its argument values,
//! validated against an operator → arity table at construction. Different
//! call sites accept different operator subsets; the subset is checked with
//! [`Condition::check_allowed`] parameterized by [`ConditionContext`]
//! rather than encoded in the type hierarchy.

use std::fmt;

use crate::attribute::AttributeValue;
use crate::error::ModelError;

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

/// Condition operator codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionOperator {
    /// Attribute equals the argument.
    Eq,
    /// Attribute differs from the argument (in type or value).
    Ne,
    /// Attribute is less than the argument.
    Lt,
    /// Attribute is less than or equal to the argument.
    Le,
    /// Attribute is greater than the argument.
    Gt,
    /// Attribute is greater than or equal to the argument.
    Ge,
    /// Attribute is present.
    Exists,
    /// Attribute is absent.
    NotExists,
    /// Attribute contains the scalar argument (substring or set membership).
    Contains,
    /// Attribute does not contain the scalar argument.
    NotContains,
    /// Attribute equals one of the arguments.
    In,
    /// Attribute lies in the inclusive range of the two arguments.
    Between,
    /// Attribute starts with the argument prefix.
    BeginsWith,
}

impl ConditionOperator {
    /// Short name for diagnostics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "EQ",
            Self::Ne => "NE",
            Self::Lt => "LT",
            Self::Le => "LE",
            Self::Gt => "GT",
            Self::Ge => "GE",
            Self::Exists => "NOT_NULL",
            Self::NotExists => "NULL",
            Self::Contains => "CONTAINS",
            Self::NotContains => "NOT_CONTAINS",
            Self::In => "IN",
            Self::Between => "BETWEEN",
            Self::BeginsWith => "BEGINS_WITH",
        }
    }

    /// Inclusive argument-count bounds for this operator.
    fn arity(self) -> (usize, usize) {
        match self {
            Self::Exists | Self::NotExists => (0, 0),
            Self::In => (1, usize::MAX),
            Self::Between => (2, 2),
            _ => (1, 1),
        }
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The call site a condition is used at. Each context admits a different
/// operator subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionContext {
    /// Hash/range/index conditions compiled into a statement `WHERE` clause.
    Key,
    /// Client-side scan filtering.
    Scan,
    /// Write preconditions compiled into an `IF` clause.
    Expected,
}

impl ConditionContext {
    fn allows(self, op: ConditionOperator) -> bool {
        use ConditionOperator::{
            BeginsWith, Between, Eq, Exists, Ge, Gt, Le, Lt, NotExists,
        };
        match self {
            Self::Key => matches!(op, Eq | Lt | Le | Gt | Ge | Between | BeginsWith),
            Self::Scan => true,
            Self::Expected => matches!(op, Eq | Exists | NotExists),
        }
    }
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// An operator with its argument values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    op: ConditionOperator,
    args: Vec<AttributeValue>,
}

impl Condition {
    /// Creates a condition, validating the operator's arity.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidCondition` when the argument count is
    /// outside the operator's allowed range.
    pub fn new(op: ConditionOperator, args: Vec<AttributeValue>) -> Result<Self, ModelError> {
        let (min, max) = op.arity();
        if args.len() < min || args.len() > max {
            return Err(ModelError::InvalidCondition(format!(
                "{op} takes between {min} and {max} arguments, got {}",
                args.len()
            )));
        }
        Ok(Self { op, args })
    }

    /// Equality condition.
    #[must_use]
    pub fn eq(arg: AttributeValue) -> Self {
        Self {
            op: ConditionOperator::Eq,
            args: vec![arg],
        }
    }

    /// Inequality condition.
    #[must_use]
    pub fn ne(arg: AttributeValue) -> Self {
        Self {
            op: ConditionOperator::Ne,
            args: vec![arg],
        }
    }

    /// Less-than condition.
    #[must_use]
    pub fn lt(arg: AttributeValue) -> Self {
        Self {
            op: ConditionOperator::Lt,
            args: vec![arg],
        }
    }

    /// Less-than-or-equal condition.
    #[must_use]
    pub fn le(arg: AttributeValue) -> Self {
        Self {
            op: ConditionOperator::Le,
            args: vec![arg],
        }
    }

    /// Greater-than condition.
    #[must_use]
    pub fn gt(arg: AttributeValue) -> Self {
        Self {
            op: ConditionOperator::Gt,
            args: vec![arg],
        }
    }

    /// Greater-than-or-equal condition.
    #[must_use]
    pub fn ge(arg: AttributeValue) -> Self {
        Self {
            op: ConditionOperator::Ge,
            args: vec![arg],
        }
    }

    /// Attribute-present condition.
    #[must_use]
    pub fn exists() -> Self {
        Self {
            op: ConditionOperator::Exists,
            args: Vec::new(),
        }
    }

    /// Attribute-absent condition.
    #[must_use]
    pub fn not_exists() -> Self {
        Self {
            op: ConditionOperator::NotExists,
            args: Vec::new(),
        }
    }

    /// Containment condition.
    #[must_use]
    pub fn contains(arg: AttributeValue) -> Self {
        Self {
            op: ConditionOperator::Contains,
            args: vec![arg],
        }
    }

    /// Negated containment condition.
    #[must_use]
    pub fn not_contains(arg: AttributeValue) -> Self {
        Self {
            op: ConditionOperator::NotContains,
            args: vec![arg],
        }
    }

    /// Membership condition over the argument list.
    #[must_use]
    pub fn is_in(args: Vec<AttributeValue>) -> Self {
        Self {
            op: ConditionOperator::In,
            args,
        }
    }

    /// Inclusive range condition.
    #[must_use]
    pub fn between(low: AttributeValue, high: AttributeValue) -> Self {
        Self {
            op: ConditionOperator::Between,
            args: vec![low, high],
        }
    }

    /// Prefix condition.
    #[must_use]
    pub fn begins_with(prefix: AttributeValue) -> Self {
        Self {
            op: ConditionOperator::BeginsWith,
            args: vec![prefix],
        }
    }

    /// The operator.
    #[must_use]
    pub fn op(&self) -> ConditionOperator {
        self.op
    }

    /// All argument values.
    #[must_use]
    pub fn args(&self) -> &[AttributeValue] {
        &self.args
    }

    /// The single argument of a unary condition.
    ///
    /// # Panics
    ///
    /// Panics when called on a nullary condition; that is a caller bug.
    #[must_use]
    pub fn arg(&self) -> &AttributeValue {
        &self.args[0]
    }

    /// Validates that this condition is legal at the given call site.
    ///
    /// Key conditions additionally forbid composite argument types, since
    /// range comparisons over sets and maps are undefined.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidCondition` on an operator or argument
    /// type the context does not admit.
    pub fn check_allowed(&self, context: ConditionContext) -> Result<(), ModelError> {
        if !context.allows(self.op) {
            return Err(ModelError::InvalidCondition(format!(
                "{} is not allowed in a {context:?} condition",
                self.op
            )));
        }
        if context == ConditionContext::Key {
            for arg in &self.args {
                if arg.attr_type().is_collection() {
                    return Err(ModelError::InvalidCondition(format!(
                        "{} does not accept a {} argument in a key condition",
                        self.op,
                        arg.attr_type()
                    )));
                }
            }
            if self.op == ConditionOperator::BeginsWith
                && self.args[0].as_str().is_none()
                && self.args[0].as_blob().is_none()
            {
                return Err(ModelError::InvalidCondition(
                    "BEGINS_WITH requires a string or blob prefix".to_owned(),
                ));
            }
        }
        Ok(())
    }

    /// Whether this condition bounds the column from below (`Gt`/`Ge`).
    #[must_use]
    pub fn is_lower_bound(&self) -> bool {
        matches!(self.op, ConditionOperator::Gt | ConditionOperator::Ge)
    }

    /// Whether this condition bounds the column from above (`Lt`/`Le`).
    #[must_use]
    pub fn is_upper_bound(&self) -> bool {
        matches!(self.op, ConditionOperator::Lt | ConditionOperator::Le)
    }

    /// Whether this bound excludes its own argument (`Lt`/`Gt`).
    #[must_use]
    pub fn is_strict(&self) -> bool {
        matches!(self.op, ConditionOperator::Lt | ConditionOperator::Gt)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeValue;

    #[test]
    fn test_should_validate_arity() {
        assert!(Condition::new(ConditionOperator::Eq, vec![]).is_err());
        assert!(
            Condition::new(ConditionOperator::Eq, vec![AttributeValue::str("a")]).is_ok()
        );
        assert!(Condition::new(ConditionOperator::Exists, vec![]).is_ok());
        assert!(
            Condition::new(
                ConditionOperator::Between,
                vec![AttributeValue::str("a")]
            )
            .is_err()
        );
    }

    #[test]
    fn test_should_allow_range_operators_in_key_context() {
        for cond in [
            Condition::eq(AttributeValue::str("a")),
            Condition::lt(AttributeValue::str("a")),
            Condition::between(AttributeValue::str("a"), AttributeValue::str("b")),
            Condition::begins_with(AttributeValue::str("a")),
        ] {
            assert!(cond.check_allowed(ConditionContext::Key).is_ok());
        }
    }

    #[test]
    fn test_should_reject_scan_operators_in_key_context() {
        for cond in [
            Condition::ne(AttributeValue::str("a")),
            Condition::contains(AttributeValue::str("a")),
            Condition::exists(),
        ] {
            assert!(cond.check_allowed(ConditionContext::Key).is_err());
        }
    }

    #[test]
    fn test_should_reject_composite_argument_in_key_context() {
        let cond = Condition::eq(AttributeValue::str_set(["a"]));
        assert!(cond.check_allowed(ConditionContext::Key).is_err());
    }

    #[test]
    fn test_should_restrict_expected_context_operators() {
        assert!(
            Condition::eq(AttributeValue::str("a"))
                .check_allowed(ConditionContext::Expected)
                .is_ok()
        );
        assert!(
            Condition::exists()
                .check_allowed(ConditionContext::Expected)
                .is_ok()
        );
        assert!(
            Condition::gt(AttributeValue::str("a"))
                .check_allowed(ConditionContext::Expected)
                .is_err()
        );
    }

    #[test]
    fn test_should_allow_everything_in_scan_context() {
        for cond in [
            Condition::ne(AttributeValue::str("a")),
            Condition::not_contains(AttributeValue::str("a")),
            Condition::is_in(vec![AttributeValue::str("a")]),
            Condition::not_exists(),
        ] {
            assert!(cond.check_allowed(ConditionContext::Scan).is_ok());
        }
    }

    #[test]
    fn test_should_classify_bounds() {
        assert!(Condition::gt(AttributeValue::number(1)).is_lower_bound());
        assert!(Condition::ge(AttributeValue::number(1)).is_lower_bound());
        assert!(Condition::lt(AttributeValue::number(1)).is_upper_bound());
        assert!(Condition::lt(AttributeValue::number(1)).is_strict());
        assert!(!Condition::le(AttributeValue::number(1)).is_strict());
    }
}

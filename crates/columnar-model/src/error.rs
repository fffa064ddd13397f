//! Model-level validation errors.

/// Errors raised while constructing or decoding model values.
///
/// All of these indicate malformed input and are detected before any store
/// interaction.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// An attribute type code that does not name a supported type.
    #[error("invalid attribute type code: {0}")]
    InvalidTypeCode(String),

    /// A wire value that cannot be decoded as the declared type.
    #[error("invalid attribute value: {0}")]
    InvalidValue(String),

    /// A number with more significant digits than the store supports.
    #[error("number exceeds the maximum of {0} significant digits")]
    NumberPrecision(u64),

    /// A condition with a wrong operator, arity or argument type.
    #[error("invalid condition: {0}")]
    InvalidCondition(String),

    /// A table schema violating a structural invariant.
    #[error("invalid table schema: {0}")]
    InvalidSchema(String),
}

use thiserror::Error;

/// Errors produced while building or validating foundation types.
///
/// All of these are detected locally; none of them is ever the result of a
/// repository round-trip.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown property: {0}")]
    UnknownProperty(String),

    #[error("property {id} is {expected:?} but got a {actual} value")]
    TypeMismatch {
        id: String,
        expected: crate::property::PropertyType,
        actual: &'static str,
    },

    #[error("property {id} is single-valued but got {count} values")]
    Cardinality { id: String, count: usize },
}

/// Result alias for type operations.
pub type TypeResult<T> = Result<T, TypeError>;

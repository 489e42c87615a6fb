use thiserror::Error;

/// Errors reported by a repository through the binding layer.
///
/// The client passes these through unchanged; it never retries or masks
/// them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindingError {
    /// The object, path, type, or version does not exist.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// A repository business rule was violated.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// The supplied change token is stale.
    #[error("update conflict: {0}")]
    UpdateConflict(String),

    /// A sibling with the same name already exists.
    #[error("name constraint violation: {0}")]
    NameConstraintViolation(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The repository rejected a malformed argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The repository or binding does not implement the operation.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Any other repository-side failure.
    #[error("repository runtime error: {0}")]
    Runtime(String),
}

/// Result alias for binding operations.
pub type BindingResult<T> = Result<T, BindingError>;

use cmis_binding::BindingError;
use cmis_cache::CacheError;
use cmis_paging::PagingError;
use cmis_types::TypeError;
use thiserror::Error;

/// Errors surfaced by the client.
///
/// Local validation failures are raised before any repository call.
/// Repository failures pass through unchanged in [`ClientError::Repository`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Malformed local input: empty property map, unknown property id,
    /// wrong cardinality or type, non-updatable property, bad filter.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The object is in no state to perform the operation, e.g. it was
    /// deleted by a transient save or its session is gone.
    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    /// A rule violation detected by the client, such as a partially
    /// deleted folder tree.
    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error(transparent)]
    Repository(#[from] BindingError),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Repository(BindingError::ObjectNotFound(_)))
    }

    /// Local or repository-reported constraint violation.
    pub fn is_constraint(&self) -> bool {
        matches!(
            self,
            ClientError::Constraint(_) | ClientError::Repository(BindingError::Constraint(_))
        )
    }
}

impl From<TypeError> for ClientError {
    fn from(err: TypeError) -> Self {
        ClientError::InvalidArgument(err.to_string())
    }
}

impl From<PagingError> for ClientError {
    fn from(err: PagingError) -> Self {
        match err {
            PagingError::NotSupported(what) => ClientError::NotSupported(what.to_string()),
        }
    }
}

impl From<CacheError> for ClientError {
    fn from(err: CacheError) -> Self {
        ClientError::InvalidArgument(err.to_string())
    }
}

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

use thiserror::Error;

/// Errors raised by the paging layer itself (as opposed to the fetch
/// function, whose error type is generic).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PagingError {
    /// The iterable does not support this access pattern.
    #[error("not supported: {0}")]
    NotSupported(&'static str),
}

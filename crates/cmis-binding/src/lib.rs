//! The repository service boundary.
//!
//! The client never speaks a wire protocol itself. Every repository access
//! goes through the [`RepositoryService`] trait, which any binding can
//! implement. Two implementations ship with this crate:
//!
//! - [`InMemoryRepository`]: a complete repository held in memory, used by
//!   tests and short-lived tools
//! - [`RecordingService`]: a decorator that records each call for
//!   round-trip assertions

pub mod error;
pub mod memory;
pub mod recording;
pub mod traits;
pub mod types;

pub use error::{BindingError, BindingResult};
pub use memory::{InMemoryConfig, InMemoryRepository, CHANGE_LINK_PREFIX};
pub use recording::{Operation, RecordingService, ServiceCall};
pub use traits::RepositoryService;
pub use types::{
    CheckIn, CreateObject, RelationshipDirection, UnfileObject, UpdatedObject, VersioningState,
};

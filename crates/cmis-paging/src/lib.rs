//! Lazy paging over server-side result sets.
//!
//! Repositories return listings (folder children, query results,
//! relationships, change events) one page at a time. This crate wraps a page
//! fetch function in iterables that:
//!
//! - fetch nothing until iterated,
//! - restart from the beginning every time they are iterated again,
//! - support seeking (`skip_to`) and single-page reads (`get_page`).
//!
//! The change-log feed is the exception: it continues by token or link rather
//! than by offset, so it can only be iterated front to back.

pub mod changes;
pub mod error;
pub mod iterable;
pub mod page;

pub use changes::{ChangeCursor, ChangeLogIter, ChangeLogIterable, ChangePage};
pub use error::PagingError;
pub use iterable::{ItemIter, ItemIterable};
pub use page::{Page, PageFetcher};

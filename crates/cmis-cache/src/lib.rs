//! Session object cache.
//!
//! Fetched objects are cached under `(object id, cache key)` and, when they
//! were fetched by path, under `(path, cache key)`. The cache key comes from
//! the operation context and identifies the payload shape, so an object
//! fetched with ACLs is never served to a caller that asked without them.
//!
//! # Design Rules
//!
//! 1. The id index and the path index are independent: a hit in one never
//!    implies a hit in the other.
//! 2. Removing an id also drops every path that resolves to it.
//! 3. Both indices are LRU-bounded; capacities come from [`CacheConfig`].
//! 4. Entries are replaced, never mutated in place.

pub mod config;
pub mod error;
pub mod object_cache;

pub use config::CacheConfig;
pub use error::{CacheError, CacheResult};
pub use object_cache::{CacheStats, ObjectCache};

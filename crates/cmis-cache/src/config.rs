use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

/// Capacity limits for the two cache indices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of distinct object ids held.
    pub object_capacity: usize,
    /// Maximum number of distinct paths held.
    pub path_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            object_capacity: 1000,
            path_capacity: 1000,
        }
    }
}

impl CacheConfig {
    pub fn new(object_capacity: usize, path_capacity: usize) -> Self {
        Self {
            object_capacity,
            path_capacity,
        }
    }

    pub(crate) fn capacities(&self) -> CacheResult<(NonZeroUsize, NonZeroUsize)> {
        let objects = NonZeroUsize::new(self.object_capacity).ok_or_else(|| {
            CacheError::InvalidConfig("object_capacity must be at least 1".into())
        })?;
        let paths = NonZeroUsize::new(self.path_capacity)
            .ok_or_else(|| CacheError::InvalidConfig("path_capacity must be at least 1".into()))?;
        Ok((objects, paths))
    }
}

//! Session-scoped type-definition cache, keyed by type id.

use std::collections::HashMap;
use std::sync::Arc;

use cmis_types::TypeDefinition;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::ClientResult;

/// Type definitions fetched by a session.
///
/// Entries live until [`TypeCache::invalidate`] or [`TypeCache::clear`];
/// type mutations through the session invalidate the affected id. A
/// disabled cache fetches on every lookup.
#[derive(Debug)]
pub struct TypeCache {
    enabled: bool,
    types: RwLock<HashMap<String, Arc<TypeDefinition>>>,
}

impl TypeCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            types: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, type_id: &str) -> Option<Arc<TypeDefinition>> {
        self.types.read().get(type_id).cloned()
    }

    /// Return the cached definition or fetch and remember it.
    pub fn get_or_fetch<F>(&self, type_id: &str, fetch: F) -> ClientResult<Arc<TypeDefinition>>
    where
        F: FnOnce() -> ClientResult<TypeDefinition>,
    {
        if let Some(hit) = self.get(type_id) {
            return Ok(hit);
        }
        debug!(type_id, "type definition cache miss");
        Ok(self.put(fetch()?))
    }

    pub fn put(&self, definition: TypeDefinition) -> Arc<TypeDefinition> {
        let definition = Arc::new(definition);
        if self.enabled {
            self.types
                .write()
                .insert(definition.id.clone(), Arc::clone(&definition));
        }
        definition
    }

    pub fn invalidate(&self, type_id: &str) {
        self.types.write().remove(type_id);
    }

    pub fn clear(&self) {
        self.types.write().clear();
    }

    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }
}

use std::collections::{HashMap, HashSet};
use std::fmt;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::CacheConfig;
use crate::error::CacheResult;

/// Entry counts across both indices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Distinct object ids held.
    pub objects: usize,
    /// `(id, cache key)` entries across all ids.
    pub entries: usize,
    /// Distinct paths held.
    pub paths: usize,
}

struct CacheState<E> {
    objects: LruCache<String, HashMap<String, E>>,
    paths: LruCache<String, String>,
    paths_by_id: HashMap<String, HashSet<String>>,
}

impl<E> CacheState<E> {
    fn forget_paths_of(&mut self, id: &str) {
        if let Some(paths) = self.paths_by_id.remove(id) {
            for path in paths {
                self.paths.pop(path.as_str());
            }
        }
    }

    fn unlink_path(&mut self, path: &str, id: &str) {
        if let Some(paths) = self.paths_by_id.get_mut(id) {
            paths.remove(path);
            if paths.is_empty() {
                self.paths_by_id.remove(id);
            }
        }
    }
}

/// Bounded cache of entity snapshots keyed by id and by path.
///
/// Internally synchronized; share it behind an `Arc`.
pub struct ObjectCache<E> {
    config: CacheConfig,
    state: Mutex<CacheState<E>>,
}

impl<E: Clone> ObjectCache<E> {
    pub fn new(config: CacheConfig) -> CacheResult<Self> {
        let (object_capacity, path_capacity) = config.capacities()?;
        Ok(Self {
            config,
            state: Mutex::new(CacheState {
                objects: LruCache::new(object_capacity),
                paths: LruCache::new(path_capacity),
                paths_by_id: HashMap::new(),
            }),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up an entity by id under a cache key.
    pub fn get(&self, id: &str, cache_key: &str) -> Option<E> {
        let mut state = self.state.lock();
        state
            .objects
            .get(id)
            .and_then(|by_key| by_key.get(cache_key))
            .cloned()
    }

    /// Look up an entity by path under a cache key.
    ///
    /// Only paths registered with [`ObjectCache::put_path`] can hit; an entity
    /// cached by id alone is never found by path.
    pub fn get_by_path(&self, path: &str, cache_key: &str) -> Option<E> {
        let mut state = self.state.lock();
        let id = state.paths.get(path)?.clone();
        let hit = state
            .objects
            .get(id.as_str())
            .and_then(|by_key| by_key.get(cache_key))
            .cloned();
        if hit.is_none() && !state.objects.contains(id.as_str()) {
            // The id was evicted; the mapping is dead weight.
            state.paths.pop(path);
            state.unlink_path(path, &id);
        }
        hit
    }

    pub fn contains(&self, id: &str, cache_key: &str) -> bool {
        let state = self.state.lock();
        state
            .objects
            .peek(id)
            .is_some_and(|by_key| by_key.contains_key(cache_key))
    }

    /// Insert or replace the entity for `(id, cache_key)`.
    pub fn put(&self, id: &str, cache_key: &str, entity: E) {
        let mut state = self.state.lock();
        Self::put_locked(&mut state, id, cache_key, entity);
    }

    /// Insert the entity by id and register `path` as resolving to it.
    pub fn put_path(&self, path: &str, id: &str, cache_key: &str, entity: E) {
        let mut state = self.state.lock();
        Self::put_locked(&mut state, id, cache_key, entity);

        if let Some((old_path, old_id)) = state.paths.push(path.to_string(), id.to_string()) {
            // Either the same path pointed elsewhere, or an older path was evicted.
            if old_path != path || old_id != id {
                state.unlink_path(&old_path, &old_id);
            }
        }
        state
            .paths_by_id
            .entry(id.to_string())
            .or_default()
            .insert(path.to_string());
    }

    fn put_locked(state: &mut CacheState<E>, id: &str, cache_key: &str, entity: E) {
        if let Some(by_key) = state.objects.get_mut(id) {
            by_key.insert(cache_key.to_string(), entity);
            return;
        }
        let by_key = HashMap::from([(cache_key.to_string(), entity)]);
        if let Some((evicted, _)) = state.objects.push(id.to_string(), by_key) {
            debug!(id = %evicted, "evicted object from cache");
            state.forget_paths_of(&evicted);
        }
    }

    /// Drop every entry for `id` under all cache keys, including paths that
    /// resolve to it.
    pub fn remove(&self, id: &str) {
        let mut state = self.state.lock();
        state.objects.pop(id);
        state.forget_paths_of(id);
        debug!(id, "removed object from cache");
    }

    /// Drop a single path mapping, leaving the id index untouched.
    pub fn remove_path(&self, path: &str) {
        let mut state = self.state.lock();
        if let Some(id) = state.paths.pop(path) {
            state.unlink_path(path, &id);
        }
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.objects.clear();
        state.paths.clear();
        state.paths_by_id.clear();
        debug!("cleared object cache");
    }

    /// Number of distinct object ids held.
    pub fn len(&self) -> usize {
        self.state.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            objects: state.objects.len(),
            entries: state.objects.iter().map(|(_, by_key)| by_key.len()).sum(),
            paths: state.paths.len(),
        }
    }
}

impl<E> fmt::Debug for ObjectCache<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ObjectCache")
            .field("config", &self.config)
            .field("objects", &state.objects.len())
            .field("paths", &state.paths.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn cache(objects: usize, paths: usize) -> ObjectCache<Arc<String>> {
        ObjectCache::new(CacheConfig::new(objects, paths)).unwrap()
    }

    fn entity(name: &str) -> Arc<String> {
        Arc::new(name.to_string())
    }

    #[test]
    fn get_returns_same_instance() {
        let c = cache(10, 10);
        let e = entity("doc");
        c.put("id-1", "k1", Arc::clone(&e));
        let hit = c.get("id-1", "k1").unwrap();
        assert!(Arc::ptr_eq(&hit, &e));
    }

    #[test]
    fn cache_keys_are_separate() {
        let c = cache(10, 10);
        c.put("id-1", "k1", entity("with-acl"));
        assert!(c.get("id-1", "k2").is_none());
        c.put("id-1", "k2", entity("without-acl"));
        assert_eq!(c.get("id-1", "k1").unwrap().as_str(), "with-acl");
        assert_eq!(c.get("id-1", "k2").unwrap().as_str(), "without-acl");
        assert_eq!(c.stats().entries, 2);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn id_hit_does_not_imply_path_hit() {
        let c = cache(10, 10);
        c.put("id-1", "k", entity("doc"));
        assert!(c.get_by_path("/a/doc", "k").is_none());
        c.put_path("/a/doc", "id-1", "k", entity("doc"));
        assert!(c.get_by_path("/a/doc", "k").is_some());
    }

    #[test]
    fn remove_invalidates_all_keys_and_paths() {
        let c = cache(10, 10);
        c.put_path("/a", "id-1", "k1", entity("a"));
        c.put("id-1", "k2", entity("a"));
        c.put_path("/b", "id-1", "k1", entity("a"));
        c.put_path("/c", "id-2", "k1", entity("c"));

        c.remove("id-1");

        assert!(c.get("id-1", "k1").is_none());
        assert!(c.get("id-1", "k2").is_none());
        assert!(c.get_by_path("/a", "k1").is_none());
        assert!(c.get_by_path("/b", "k1").is_none());
        assert!(c.get_by_path("/c", "k1").is_some());
        assert_eq!(c.stats().paths, 1);
    }

    #[test]
    fn path_rebinding_moves_reverse_mapping() {
        let c = cache(10, 10);
        c.put_path("/x", "old", "k", entity("old"));
        c.put_path("/x", "new", "k", entity("new"));
        c.remove("old");
        assert_eq!(c.get_by_path("/x", "k").unwrap().as_str(), "new");
    }

    #[test]
    fn lru_eviction_respects_capacity() {
        let c = cache(2, 10);
        c.put("a", "k", entity("a"));
        c.put("b", "k", entity("b"));
        assert!(c.get("a", "k").is_some()); // a is now most recent
        c.put("c", "k", entity("c"));
        assert_eq!(c.len(), 2);
        assert!(c.get("b", "k").is_none());
        assert!(c.get("a", "k").is_some());
        assert!(c.get("c", "k").is_some());
    }

    #[test]
    fn evicting_an_id_drops_its_paths() {
        let c = cache(1, 10);
        c.put_path("/a", "a", "k", entity("a"));
        c.put("b", "k", entity("b"));
        assert!(c.get_by_path("/a", "k").is_none());
        assert_eq!(c.stats().paths, 0);
    }

    #[test]
    fn path_index_is_bounded() {
        let c = cache(10, 1);
        c.put_path("/a", "a", "k", entity("a"));
        c.put_path("/b", "b", "k", entity("b"));
        assert!(c.get_by_path("/a", "k").is_none());
        assert!(c.get("a", "k").is_some());
        assert_eq!(c.stats().paths, 1);
    }

    #[test]
    fn remove_path_keeps_id_entry() {
        let c = cache(10, 10);
        c.put_path("/a", "a", "k", entity("a"));
        c.remove_path("/a");
        assert!(c.get_by_path("/a", "k").is_none());
        assert!(c.contains("a", "k"));
    }

    #[test]
    fn clear_empties_everything() {
        let c = cache(10, 10);
        c.put_path("/a", "a", "k", entity("a"));
        c.clear();
        assert!(c.is_empty());
        assert_eq!(c.stats(), CacheStats::default());
    }

    #[test]
    fn zero_capacity_fails() {
        assert!(ObjectCache::<Arc<String>>::new(CacheConfig::new(0, 1)).is_err());
    }

    #[test]
    fn concurrent_access_is_safe() {
        use std::thread;

        let c = Arc::new(cache(64, 64));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let c = Arc::clone(&c);
                thread::spawn(move || {
                    for i in 0..50 {
                        let id = format!("{t}-{i}");
                        c.put_path(&format!("/{id}"), &id, "k", entity(&id));
                        let _ = c.get(&id, "k");
                        if i % 3 == 0 {
                            c.remove(&id);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }
        assert!(c.len() <= 64);
    }
}

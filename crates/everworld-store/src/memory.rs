//! In-memory reference implementations of the collaborator contracts.
//!
//! These back the test suites and the demo binary. Both carry a failure
//! switch so recovery paths can be exercised: while failing, every
//! operation returns a backend error without touching state.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use everworld_types::WorldId;

use crate::error::StoreError;
use crate::{CacheAdmin, TimelineDocument, WorldCache, WorldDocument, WorldStore, world_key_prefix};

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Keyed state behind the in-memory store's lock.
#[derive(Debug, Default)]
struct StoreInner {
    worlds: BTreeMap<WorldId, WorldDocument>,
    timelines: BTreeMap<(WorldId, String), TimelineDocument>,
}

/// An in-memory [`WorldStore`] with failure injection.
#[derive(Debug, Default)]
pub struct MemoryWorldStore {
    inner: Mutex<StoreInner>,
    failing: AtomicBool,
}

impl MemoryWorldStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle failure injection. While set, every operation returns a
    /// persistence error without touching state.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of persisted worlds.
    pub fn world_count(&self) -> usize {
        self.lock().worlds.len()
    }

    /// True when a document exists for the world.
    pub fn contains(&self, world_id: &WorldId) -> bool {
        self.lock().worlds.contains_key(world_id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_failing(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Persistence {
                message: "injected persistence failure".to_owned(),
            });
        }
        Ok(())
    }
}

impl WorldStore for MemoryWorldStore {
    fn save_world_state(&self, document: &WorldDocument) -> Result<(), StoreError> {
        self.check_failing()?;
        self.lock()
            .worlds
            .insert(document.world_id.clone(), document.clone());
        debug!(world_id = %document.world_id, "Saved world document");
        Ok(())
    }

    fn load_world_state(&self, world_id: &WorldId) -> Result<Option<WorldDocument>, StoreError> {
        self.check_failing()?;
        Ok(self.lock().worlds.get(world_id).cloned())
    }

    fn update_world_state(&self, document: &WorldDocument) -> Result<bool, StoreError> {
        self.check_failing()?;
        let mut inner = self.lock();
        if !inner.worlds.contains_key(&document.world_id) {
            return Ok(false);
        }
        inner
            .worlds
            .insert(document.world_id.clone(), document.clone());
        Ok(true)
    }

    fn save_timeline(&self, document: &TimelineDocument) -> Result<(), StoreError> {
        self.check_failing()?;
        let key = (
            document.world_id.clone(),
            document.entity_id.as_str().to_owned(),
        );
        self.lock().timelines.insert(key, document.clone());
        Ok(())
    }

    fn load_timelines(&self, world_id: &WorldId) -> Result<Vec<TimelineDocument>, StoreError> {
        self.check_failing()?;
        Ok(self
            .lock()
            .timelines
            .iter()
            .filter(|((owner, _), _)| owner == world_id)
            .map(|(_, doc)| doc.clone())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// One cached value and its optional expiry instant.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// An in-memory [`WorldCache`] honoring TTLs, with failure injection.
#[derive(Debug, Default)]
pub struct MemoryWorldCache {
    entries: Mutex<BTreeMap<String, CacheEntry>>,
    failing: AtomicBool,
}

impl MemoryWorldCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle failure injection. While set, every operation returns a
    /// cache error without touching state.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        self.lock().values().filter(|e| !e.expired()).count()
    }

    /// True when no live entries remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_failing(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Cache {
                message: "injected cache failure".to_owned(),
            });
        }
        Ok(())
    }
}

impl WorldCache for MemoryWorldCache {
    fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        self.check_failing()?;
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.check_failing()?;
        let expires_at = ttl.and_then(|d| Instant::now().checked_add(d));
        self.lock()
            .insert(key.to_owned(), CacheEntry { value, expires_at });
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check_failing()?;
        self.lock().remove(key);
        Ok(())
    }
}

impl CacheAdmin for MemoryWorldCache {
    fn invalidate_world(&self, world_id: &WorldId) -> Result<u64, StoreError> {
        self.check_failing()?;
        let prefix = world_key_prefix(world_id);
        let mut entries = self.lock();
        let doomed: Vec<String> = entries
            .keys()
            .filter(|key| key.starts_with(&prefix))
            .cloned()
            .collect();
        let removed = u64::try_from(doomed.len()).unwrap_or(u64::MAX);
        for key in doomed {
            entries.remove(&key);
        }
        debug!(world_id = %world_id, removed, "Invalidated cached world views");
        Ok(removed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use everworld_types::EntityKind;

    use super::*;
    use crate::world_state_key;

    fn world_doc(id: &str) -> WorldDocument {
        WorldDocument::new(WorldId::new(id), serde_json::json!({"name": id}))
    }

    #[test]
    fn save_then_load_round_trips() {
        let store = MemoryWorldStore::new();
        store.save_world_state(&world_doc("W1")).unwrap();
        let loaded = store.load_world_state(&WorldId::new("W1")).unwrap();
        assert_eq!(loaded.unwrap().full_state["name"], "W1");
    }

    #[test]
    fn load_missing_world_is_none_not_error() {
        let store = MemoryWorldStore::new();
        assert!(store.load_world_state(&WorldId::new("ghost")).unwrap().is_none());
    }

    #[test]
    fn update_missing_world_returns_false() {
        let store = MemoryWorldStore::new();
        assert!(!store.update_world_state(&world_doc("W1")).unwrap());
        store.save_world_state(&world_doc("W1")).unwrap();
        assert!(store.update_world_state(&world_doc("W1")).unwrap());
    }

    #[test]
    fn timelines_are_scoped_per_world() {
        let store = MemoryWorldStore::new();
        let doc = TimelineDocument {
            world_id: WorldId::new("W1"),
            entity_id: "elena".into(),
            entity_type: EntityKind::Character,
            events: Vec::new(),
        };
        store.save_timeline(&doc).unwrap();

        assert_eq!(store.load_timelines(&WorldId::new("W1")).unwrap().len(), 1);
        assert!(store.load_timelines(&WorldId::new("W2")).unwrap().is_empty());
    }

    #[test]
    fn failure_injection_blocks_all_store_operations() {
        let store = MemoryWorldStore::new();
        store.save_world_state(&world_doc("W1")).unwrap();
        store.set_failing(true);

        assert!(store.save_world_state(&world_doc("W2")).is_err());
        assert!(store.load_world_state(&WorldId::new("W1")).is_err());

        store.set_failing(false);
        assert!(store.load_world_state(&WorldId::new("W1")).is_ok());
        // The failed save left no partial state.
        assert_eq!(store.world_count(), 1);
    }

    #[test]
    fn cache_get_set_delete() {
        let cache = MemoryWorldCache::new();
        cache.set("k", serde_json::json!(1), None).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(serde_json::json!(1)));
        cache.delete("k").unwrap();
        assert_eq!(cache.get("k").unwrap(), None);
    }

    #[test]
    fn cache_ttl_expires_entries() {
        let cache = MemoryWorldCache::new();
        cache
            .set("fleeting", serde_json::json!(true), Some(Duration::from_nanos(1)))
            .unwrap();
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(cache.get("fleeting").unwrap(), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_world_removes_only_that_prefix() {
        let cache = MemoryWorldCache::new();
        let w1 = WorldId::new("W1");
        let w2 = WorldId::new("W2");
        cache.set(&world_state_key(&w1), serde_json::json!(1), None).unwrap();
        cache.set("world:W1:summary", serde_json::json!(2), None).unwrap();
        cache.set(&world_state_key(&w2), serde_json::json!(3), None).unwrap();

        let removed = cache.invalidate_world(&w1).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(cache.get(&world_state_key(&w2)).unwrap(), Some(serde_json::json!(3)));
    }
}

use crate::core::Clock;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Default freshness window for singleton collections.
pub const DEFAULT_ENTITY_TTL: Duration = Duration::from_secs(30 * 60);

/// Point-in-time view of a [`SingletonEntityCache`].
#[derive(Debug, Clone, PartialEq)]
pub struct EntityCacheState<T> {
    pub collection: Vec<T>,
    pub last_updated: Option<DateTime<Utc>>,
    pub is_fresh: bool,
}

/// Partial update merged into the cache by [`SingletonEntityCache::set_state`].
#[derive(Debug, Clone)]
pub struct EntityCachePatch<T> {
    pub collection: Option<Vec<T>>,
    pub last_updated: Option<Option<DateTime<Utc>>>,
}

impl<T> Default for EntityCachePatch<T> {
    fn default() -> Self {
        Self {
            collection: None,
            last_updated: None,
        }
    }
}

struct Stored<T> {
    collection: Vec<T>,
    last_updated: Option<DateTime<Utc>>,
    /// Bumped by `invalidate` and `reset`.
    generation: u64,
}

/// Time-boxed cache for one flat, unfiltered collection (e.g. all workers).
///
/// Owned by the composition root and shared with its consumers, so the cached
/// collection outlives any single consumer. Freshness is recomputed from the
/// injected clock on every read.
pub struct SingletonEntityCache<T> {
    stored: Mutex<Stored<T>>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl<T: Clone> SingletonEntityCache<T> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            stored: Mutex::new(Stored {
                collection: Vec::new(),
                last_updated: None,
                generation: 0,
            }),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            clock,
        }
    }

    fn stored(&self) -> MutexGuard<'_, Stored<T>> {
        self.stored.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn fresh_at(&self, last_updated: Option<DateTime<Utc>>) -> bool {
        match last_updated {
            Some(at) => self.clock.now() - at < self.ttl,
            None => false,
        }
    }

    pub fn get_state(&self) -> EntityCacheState<T> {
        let stored = self.stored();
        EntityCacheState {
            collection: stored.collection.clone(),
            last_updated: stored.last_updated,
            is_fresh: self.fresh_at(stored.last_updated),
        }
    }

    /// Shallow-merges `patch` into the cache.
    pub fn set_state(&self, patch: EntityCachePatch<T>) {
        let mut stored = self.stored();
        if let Some(collection) = patch.collection {
            stored.collection = collection;
        }
        if let Some(last_updated) = patch.last_updated {
            stored.last_updated = last_updated;
        }
    }

    /// Replaces the collection and stamps it with the current time.
    pub fn store(&self, collection: Vec<T>) {
        let now = self.clock.now();
        self.set_state(EntityCachePatch {
            collection: Some(collection),
            last_updated: Some(Some(now)),
        });
    }

    /// Current generation. A load should capture it before fetching and hand
    /// it back to [`SingletonEntityCache::store_if_current`].
    pub fn generation(&self) -> u64 {
        self.stored().generation
    }

    /// Stores `collection` only if no invalidation or reset happened since
    /// `generation` was read. Returns whether it was stored.
    pub fn store_if_current(&self, generation: u64, collection: Vec<T>) -> bool {
        let now = self.clock.now();
        let mut stored = self.stored();
        if stored.generation != generation {
            return false;
        }
        stored.collection = collection;
        stored.last_updated = Some(now);
        true
    }

    pub fn is_fresh(&self) -> bool {
        self.fresh_at(self.stored().last_updated)
    }

    pub fn is_expired(&self) -> bool {
        !self.is_fresh()
    }

    /// Keeps the collection but marks it stale.
    pub fn invalidate(&self) {
        let mut stored = self.stored();
        stored.last_updated = None;
        stored.generation += 1;
    }

    pub fn reset(&self) {
        let mut stored = self.stored();
        stored.collection.clear();
        stored.last_updated = None;
        stored.generation += 1;
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;

    fn cache_with_clock() -> (SingletonEntityCache<&'static str>, ManualClock) {
        let clock = ManualClock::default();
        let cache = SingletonEntityCache::new(DEFAULT_ENTITY_TTL, Arc::new(clock.clone()));
        (cache, clock)
    }

    #[test]
    fn empty_cache_is_not_fresh() {
        let (cache, _) = cache_with_clock();
        let state = cache.get_state();
        assert!(state.collection.is_empty());
        assert!(state.last_updated.is_none());
        assert!(!state.is_fresh);
    }

    #[test]
    fn freshness_expires_after_window() {
        let (cache, clock) = cache_with_clock();
        cache.store(vec!["ana", "luis"]);
        assert!(cache.get_state().is_fresh);

        clock.advance(chrono::Duration::minutes(29));
        assert!(cache.is_fresh());

        clock.advance(chrono::Duration::minutes(2));
        let state = cache.get_state();
        assert!(!state.is_fresh);
        assert_eq!(state.collection, vec!["ana", "luis"]);
    }

    #[test]
    fn set_state_merges_only_present_fields() {
        let (cache, clock) = cache_with_clock();
        cache.store(vec!["ana"]);
        let stamped = cache.get_state().last_updated;

        cache.set_state(EntityCachePatch {
            collection: Some(vec!["ana", "eva"]),
            ..EntityCachePatch::default()
        });
        let state = cache.get_state();
        assert_eq!(state.collection.len(), 2);
        assert_eq!(state.last_updated, stamped);

        clock.advance(chrono::Duration::minutes(1));
        cache.set_state(EntityCachePatch {
            last_updated: Some(None),
            ..EntityCachePatch::default()
        });
        assert!(cache.is_expired());
        assert_eq!(cache.get_state().collection.len(), 2);
    }

    #[test]
    fn reset_clears_everything() {
        let (cache, _) = cache_with_clock();
        cache.store(vec!["ana"]);
        cache.reset();
        let state = cache.get_state();
        assert!(state.collection.is_empty());
        assert!(!state.is_fresh);
    }

    #[test]
    fn store_after_reset_is_refused() {
        let (cache, _) = cache_with_clock();
        let generation = cache.generation();
        cache.reset();

        assert!(!cache.store_if_current(generation, vec!["stale"]));
        assert!(cache.get_state().collection.is_empty());

        assert!(cache.store_if_current(cache.generation(), vec!["ana"]));
        assert!(cache.is_fresh());
    }

    #[test]
    fn invalidate_keeps_collection() {
        let (cache, _) = cache_with_clock();
        cache.store(vec!["ana"]);
        cache.invalidate();
        assert!(cache.is_expired());
        assert_eq!(cache.get_state().collection, vec!["ana"]);
    }
}

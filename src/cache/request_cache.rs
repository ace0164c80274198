use super::single_flight::SingleFlight;
use crate::core::Result;
use log::debug;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Memoizes read-mostly lookups by key.
///
/// A resolved value is served without calling the producer again; concurrent
/// callers for a key that is still loading share the same flight. Failures are
/// never stored, so the next caller retries.
///
/// There is no eviction: entries live as long as the cache. This is meant for
/// low-cardinality reference data (areas, clients, services).
pub struct RequestCache<V> {
    resolved: Arc<Mutex<HashMap<String, V>>>,
    flights: SingleFlight<V>,
    /// Bumped by `clear`; flights started before a clear don't store their result.
    epoch: Arc<AtomicU64>,
}

impl<V> RequestCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            resolved: Arc::new(Mutex::new(HashMap::new())),
            flights: SingleFlight::new(),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns the cached value for `key`, joining or starting a fetch when absent.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, producer: F) -> Result<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        if let Some(value) = self.get(key) {
            debug!("request cache hit: key='{}'", key);
            return Ok(value);
        }

        let resolved = Arc::clone(&self.resolved);
        let epoch = Arc::clone(&self.epoch);
        let started_in = epoch.load(Ordering::SeqCst);
        let owned_key = key.to_string();
        // Flights from before a clear are not joinable afterwards.
        let flight_key = format!("{}#{}", started_in, key);

        let (flight, started) = self.flights.join_or_start(&flight_key, move || async move {
            // A flight that finished between the lookup above and this start
            // may already have stored the value.
            let stored = resolved.lock()?.get(&owned_key).cloned();
            if let Some(value) = stored {
                return Ok(value);
            }

            let value = producer().await?;

            if epoch.load(Ordering::SeqCst) == started_in {
                resolved.lock()?.insert(owned_key, value.clone());
            }
            Ok(value)
        })?;

        if !started {
            debug!("request cache joined in-flight fetch: key='{}'", key);
        }
        flight.await
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.resolved
            .lock()
            .ok()
            .and_then(|resolved| resolved.get(key).cloned())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn invalidate(&self, key: &str) -> Result<()> {
        self.resolved.lock()?.remove(key);
        Ok(())
    }

    /// Drops every resolved entry. Fetches already running still reach their
    /// callers but are neither stored nor shared with later lookups.
    pub fn clear(&self) -> Result<()> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.resolved.lock()?.clear();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.resolved.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> Default for RequestCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

use crate::core::Result;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};

/// A shared in-flight operation. Every clone resolves to the same result.
pub type Flight<V> = Shared<BoxFuture<'static, Result<V>>>;

struct FlightTable<V> {
    next_id: u64,
    flights: HashMap<String, (u64, Flight<V>)>,
}

/// Collapses concurrent operations with the same key into one execution.
///
/// The first caller for a key starts the operation; callers arriving while it
/// is still running get a clone of the same [`Flight`]. The entry is removed
/// as soon as the operation finishes, whether it succeeded or failed, so the
/// next caller after completion starts a fresh run.
pub struct SingleFlight<V> {
    table: Arc<Mutex<FlightTable<V>>>,
}

impl<V> SingleFlight<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(FlightTable {
                next_id: 0,
                flights: HashMap::new(),
            })),
        }
    }

    /// Joins the flight running under `key`, or starts one built by `make`.
    ///
    /// Returns the flight and whether this call started it. `make` is only
    /// invoked when no flight exists.
    pub fn join_or_start<F, Fut>(&self, key: &str, make: F) -> Result<(Flight<V>, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let mut table = self.table.lock()?;

        if let Some((_, flight)) = table.flights.get(key) {
            return Ok((flight.clone(), false));
        }

        let id = table.next_id;
        table.next_id += 1;

        let operation = make();
        let owner: Weak<Mutex<FlightTable<V>>> = Arc::downgrade(&self.table);
        let owned_key = key.to_string();

        let flight = async move {
            let result = operation.await;
            if let Some(table) = owner.upgrade() {
                let mut table = table.lock().unwrap_or_else(|p| p.into_inner());
                if table
                    .flights
                    .get(&owned_key)
                    .is_some_and(|(flight_id, _)| *flight_id == id)
                {
                    table.flights.remove(&owned_key);
                }
            }
            result
        }
        .boxed()
        .shared();

        table.flights.insert(key.to_string(), (id, flight.clone()));
        Ok((flight, true))
    }

    /// Runs `make` under `key`, sharing the result with concurrent callers.
    pub async fn run<F, Fut>(&self, key: &str, make: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let (flight, _) = self.join_or_start(key, make)?;
        flight.await
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.table
            .lock()
            .map(|table| table.flights.contains_key(key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.table
            .lock()
            .map(|table| table.flights.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> Default for SingleFlight<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

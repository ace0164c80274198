use crate::cache::{SingleFlight, SingletonEntityCache};
use crate::core::{ClientError, EntityId, EntityStatus, Result, Worker};
use crate::session::{AuthEvent, AuthListener, AuthSubscription, Session};
use crate::transport::{ApiRequest, Transport, fetch_json, to_body};
use async_trait::async_trait;
use log::{debug, warn};
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use std::sync::{Arc, Mutex, Weak};

const WORKERS_PATH: &str = "workers";
const LOAD_KEY: &str = "workers:all";

struct DirectoryInner {
    cache: Arc<SingletonEntityCache<Worker>>,
    flights: SingleFlight<Vec<Worker>>,
    transport: Arc<dyn Transport>,
    session: Arc<Session>,
    _subscription: Mutex<Option<AuthSubscription>>,
}

/// The "all workers" collection, served from a shared [`SingletonEntityCache`].
///
/// While the cache is fresh every consumer adopts the cached collection with
/// no network call, including directories built after the cache was filled.
#[derive(Clone)]
pub struct WorkerDirectory {
    inner: Arc<DirectoryInner>,
}

struct DirectoryListener {
    directory: Weak<DirectoryInner>,
}

#[async_trait]
impl AuthListener for DirectoryListener {
    async fn on_auth_event(&self, event: AuthEvent) {
        let Some(inner) = self.directory.upgrade() else {
            return;
        };
        let directory = WorkerDirectory { inner };
        match event {
            AuthEvent::Logout => directory.reset(),
            AuthEvent::LoginSuccess => {
                if let Err(err) = directory.load(false).await {
                    warn!("workers: load after login failed: {}", err);
                }
            }
        }
    }
}

impl WorkerDirectory {
    pub fn new(
        cache: Arc<SingletonEntityCache<Worker>>,
        transport: Arc<dyn Transport>,
        session: Arc<Session>,
    ) -> Self {
        let inner = Arc::new(DirectoryInner {
            cache,
            flights: SingleFlight::new(),
            transport,
            session: Arc::clone(&session),
            _subscription: Mutex::new(None),
        });

        let listener = Arc::new(DirectoryListener {
            directory: Arc::downgrade(&inner),
        });
        let subscription = session.bus().subscribe(listener);
        *inner
            ._subscription
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = Some(subscription);

        Self { inner }
    }

    /// Returns all workers, from the cache while it is fresh.
    ///
    /// Without a session this returns whatever is cached and does not fetch.
    pub async fn load(&self, force: bool) -> Result<Vec<Worker>> {
        let state = self.inner.cache.get_state();
        if !self.inner.session.is_authenticated() {
            debug!("workers: load skipped, no session");
            return Ok(state.collection);
        }
        if !force && state.is_fresh {
            debug!("workers: served from fresh cache");
            return Ok(state.collection);
        }

        let cache = Arc::clone(&self.inner.cache);
        let transport = Arc::clone(&self.inner.transport);
        // The cache generation moves on invalidate and reset, from any
        // directory sharing it. Loads started before that neither store
        // their result nor get joined by later loads.
        let generation = cache.generation();
        let flight_key = format!("{}#{}", LOAD_KEY, generation);

        self.inner
            .flights
            .run(&flight_key, move || async move {
                let workers: Vec<Worker> =
                    fetch_json(transport.as_ref(), ApiRequest::get(WORKERS_PATH)).await?;
                if !cache.store_if_current(generation, workers.clone()) {
                    debug!("workers: dropping load started before an invalidation");
                }
                Ok(workers)
            })
            .await
    }

    /// Cached workers without touching the network.
    pub fn workers(&self) -> Vec<Worker> {
        self.inner.cache.get_state().collection
    }

    pub fn active_workers(&self) -> Vec<Worker> {
        self.workers()
            .into_iter()
            .filter(|worker| worker.status == EntityStatus::Active)
            .collect()
    }

    pub fn find(&self, id: &EntityId) -> Option<Worker> {
        self.workers().into_iter().find(|worker| &worker.id == id)
    }

    pub fn is_fresh(&self) -> bool {
        self.inner.cache.is_fresh()
    }

    pub fn reset(&self) {
        self.inner.cache.reset();
    }

    async fn write(&self, request: ApiRequest) -> Result<JsonValue> {
        if !self.inner.session.is_authenticated() {
            return Err(ClientError::AuthRequired);
        }
        let written = self.inner.transport.send(request).await?;
        self.inner.cache.invalidate();
        if let Err(err) = self.load(true).await {
            warn!("workers: reload after write failed: {}", err);
        }
        Ok(written)
    }

    pub async fn create<P: Serialize>(&self, payload: &P) -> Result<JsonValue> {
        self.write(ApiRequest::post(WORKERS_PATH, to_body(payload)?))
            .await
    }

    pub async fn update<P: Serialize>(&self, id: &EntityId, patch: &P) -> Result<JsonValue> {
        self.write(ApiRequest::patch(
            format!("{}/{}", WORKERS_PATH, id),
            to_body(patch)?,
        ))
        .await
    }

    /// Soft delete: flags the worker inactive.
    pub async fn deactivate(&self, id: &EntityId) -> Result<JsonValue> {
        self.write(ApiRequest::patch(
            format!("{}/{}", WORKERS_PATH, id),
            json!({ "status": EntityStatus::Inactive.as_str() }),
        ))
        .await
    }
}

//! Paginated resource store.
//!
//! Holds the page the user is looking at, a cache of pages keyed by
//! `(page, filters)` and a single-flight table of in-flight requests keyed by
//! `(page, limit, filters)`. State lives behind a synchronous mutex that is
//! never held across a network call; every response is re-validated against
//! the current state before it is applied.

use super::resources::Resource;
use crate::cache::SingleFlight;
use crate::config::DashboardConfig;
use crate::core::{
    ClientError, Clock, EntityId, EntityStatus, FilterSet, Result, cache_key, request_key,
};
use crate::session::{AuthEvent, AuthListener, AuthSubscription, Session};
use crate::transport::{ApiRequest, PageResponse, Transport, fetch_json, to_body};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

/// How a fetch interacts with the cache and with user-visible state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchMode {
    /// Bypass the page cache.
    pub force: bool,
    /// Background fetch: never touches `is_loading`/`error`, failures are
    /// logged and swallowed.
    pub silent: bool,
}

impl FetchMode {
    pub const NORMAL: FetchMode = FetchMode {
        force: false,
        silent: false,
    };
    pub const FORCE: FetchMode = FetchMode {
        force: true,
        silent: false,
    };
    pub const SILENT: FetchMode = FetchMode {
        force: false,
        silent: true,
    };
}

/// Result of [`PaginatedStore::fetch_page`].
#[derive(Debug, Clone)]
pub enum FetchOutcome<T> {
    /// No session; nothing was requested.
    Skipped,
    /// Served from the page cache.
    Cached(Vec<T>),
    /// Served by the backend (possibly through a shared in-flight request).
    Fetched(Arc<PageResponse<T>>),
    /// A silent fetch failed; the error was logged and not surfaced.
    Suppressed(ClientError),
}

impl<T> FetchOutcome<T> {
    pub fn is_network(&self) -> bool {
        matches!(self, FetchOutcome::Fetched(_))
    }
}

/// Visible state of a paginated collection.
#[derive(Debug, Clone, PartialEq)]
pub struct PagedCollectionState<T, F> {
    pub items: Vec<T>,
    pub total_items: u64,
    pub current_page: u32,
    pub items_per_page: u32,
    pub total_pages: u32,
    pub filters: F,
    pub cached_pages: HashMap<String, Vec<T>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub aux_counts: BTreeMap<String, u64>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub initial_load_done: bool,
}

impl<T, F: Default> PagedCollectionState<T, F> {
    pub fn empty(items_per_page: u32) -> Self {
        Self {
            items: Vec::new(),
            total_items: 0,
            current_page: 1,
            items_per_page,
            total_pages: 0,
            filters: F::default(),
            cached_pages: HashMap::new(),
            last_updated: None,
            aux_counts: BTreeMap::new(),
            is_loading: false,
            error: None,
            initial_load_done: false,
        }
    }
}

fn page_count(total_items: u64, items_per_page: u32) -> u32 {
    if items_per_page == 0 {
        return 0;
    }
    u32::try_from(total_items.div_ceil(u64::from(items_per_page))).unwrap_or(u32::MAX)
}

/// Knobs taken from [`DashboardConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    pub items_per_page: u32,
    pub prefetch: bool,
    pub prefetch_delay: Duration,
}

impl StoreOptions {
    pub fn from_config(config: &DashboardConfig) -> Self {
        Self {
            items_per_page: config.items_per_page,
            prefetch: config.prefetch,
            prefetch_delay: config.prefetch_delay,
        }
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::from_config(&DashboardConfig::default())
    }
}

struct StoreState<R: Resource> {
    view: PagedCollectionState<R::Item, R::Filters>,
    /// Page the user last asked to see; non-silent responses for other pages
    /// are cached but not shown.
    requested_page: u32,
    /// Bumped whenever page boundaries or filters change, and on reset.
    /// Responses issued under an older generation are discarded.
    generation: u64,
    /// Bumped on reset only; guards the loading counter.
    epoch: u64,
    loading: u32,
}

impl<R: Resource> StoreState<R> {
    fn new(items_per_page: u32) -> Self {
        Self {
            view: PagedCollectionState::empty(items_per_page),
            requested_page: 1,
            generation: 0,
            epoch: 0,
            loading: 0,
        }
    }
}

struct StoreInner<R: Resource> {
    state: Mutex<StoreState<R>>,
    flights: SingleFlight<Arc<PageResponse<R::Item>>>,
    transport: Arc<dyn Transport>,
    session: Arc<Session>,
    clock: Arc<dyn Clock>,
    options: StoreOptions,
    // Unsubscribes from the auth bus when the store goes away.
    _subscription: Mutex<Option<AuthSubscription>>,
}

/// Page cache and navigation for one backend collection.
///
/// Cheap to clone; clones share the same state.
pub struct PaginatedStore<R: Resource> {
    inner: Arc<StoreInner<R>>,
}

impl<R: Resource> Clone for PaginatedStore<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct StoreListener<R: Resource> {
    store: Weak<StoreInner<R>>,
}

#[async_trait]
impl<R: Resource> AuthListener for StoreListener<R> {
    async fn on_auth_event(&self, event: AuthEvent) {
        let Some(inner) = self.store.upgrade() else {
            return;
        };
        let store = PaginatedStore { inner };
        match event {
            AuthEvent::Logout => {
                if let Err(err) = store.reset() {
                    warn!("{}: reset on logout failed: {}", R::PATH, err);
                }
            }
            AuthEvent::LoginSuccess => {
                if let Err(err) = store.ensure_initial_load().await {
                    warn!("{}: initial load after login failed: {}", R::PATH, err);
                }
            }
        }
    }
}

impl<R: Resource> PaginatedStore<R> {
    /// Builds the store and subscribes it to the session's auth events.
    pub fn new(
        transport: Arc<dyn Transport>,
        session: Arc<Session>,
        clock: Arc<dyn Clock>,
        options: StoreOptions,
    ) -> Self {
        let inner = Arc::new(StoreInner {
            state: Mutex::new(StoreState::new(options.items_per_page.max(1))),
            flights: SingleFlight::new(),
            transport,
            session: Arc::clone(&session),
            clock,
            options,
            _subscription: Mutex::new(None),
        });

        let listener = Arc::new(StoreListener::<R> {
            store: Arc::downgrade(&inner),
        });
        let subscription = session.bus().subscribe(listener);
        *inner
            ._subscription
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = Some(subscription);

        Self { inner }
    }

    fn state(&self) -> Result<MutexGuard<'_, StoreState<R>>> {
        Ok(self.inner.state.lock()?)
    }

    /// Fetches one page, honouring the cache and sharing identical in-flight
    /// requests.
    pub async fn fetch_page(
        &self,
        page: u32,
        limit: u32,
        filters: R::Filters,
        mode: FetchMode,
    ) -> Result<FetchOutcome<R::Item>> {
        if !self.inner.session.is_authenticated() {
            debug!("{}: fetch of page {} skipped, no session", R::PATH, page);
            return Ok(FetchOutcome::Skipped);
        }

        let (generation, epoch) = {
            let mut state = self.state()?;

            // Cached pages are only valid for the current page size.
            if !mode.force && limit == state.view.items_per_page {
                let cached = state.view.cached_pages.get(&cache_key(page, &filters)).cloned();
                if let Some(items) = cached {
                    debug!("{}: page {} served from cache", R::PATH, page);
                    if page == state.view.current_page && filters == state.view.filters {
                        state.view.items = items.clone();
                    }
                    return Ok(FetchOutcome::Cached(items));
                }
            }

            if !mode.silent {
                state.requested_page = page;
                state.loading += 1;
                state.view.is_loading = true;
                state.view.error = None;
            }
            (state.generation, state.epoch)
        };

        let request = ApiRequest::get(format!("{}/paginated", R::PATH))
            .query("page", page)
            .query("limit", limit)
            .query_pairs(filters.query_pairs());
        let transport = Arc::clone(&self.inner.transport);
        // Scoped to the generation so a fetch issued after a write or a
        // refresh never joins a request that started before it.
        let flight_key = format!("{}#{}", generation, request_key(page, limit, &filters));

        let result = self
            .inner
            .flights
            .run(&flight_key, move || async move {
                let response: PageResponse<R::Item> =
                    fetch_json(transport.as_ref(), request).await?;
                Ok(Arc::new(response))
            })
            .await;

        let mut state = self.state()?;
        if !mode.silent && state.epoch == epoch {
            state.loading = state.loading.saturating_sub(1);
            state.view.is_loading = state.loading > 0;
        }

        match result {
            Ok(response) => {
                if state.generation == generation {
                    self.apply_response(&mut state, page, limit, &filters, &response, mode);
                } else {
                    debug!(
                        "{}: discarding response for page {} issued before a filter/size change",
                        R::PATH,
                        page
                    );
                }
                Ok(FetchOutcome::Fetched(response))
            }
            Err(err) if mode.silent => {
                warn!("{}: background fetch of page {} failed: {}", R::PATH, page, err);
                Ok(FetchOutcome::Suppressed(err))
            }
            Err(err) => {
                if state.generation == generation && state.requested_page == page {
                    state.view.error = Some(err.to_string());
                }
                Err(err)
            }
        }
    }

    fn apply_response(
        &self,
        state: &mut StoreState<R>,
        page: u32,
        limit: u32,
        filters: &R::Filters,
        response: &PageResponse<R::Item>,
        mode: FetchMode,
    ) {
        // Cache keys carry no page size; pages of another size are not kept.
        if limit != state.view.items_per_page {
            debug!(
                "{}: page {} fetched at limit {} not cached (page size is {})",
                R::PATH,
                page,
                limit,
                state.view.items_per_page
            );
            return;
        }

        state
            .view
            .cached_pages
            .insert(cache_key(page, filters), response.items.clone());
        for bundle in response.bundled_pages() {
            state
                .view
                .cached_pages
                .insert(cache_key(bundle.page_number, filters), bundle.items.clone());
        }

        let wanted = if mode.silent {
            page == state.view.current_page
        } else {
            page == state.requested_page
        };
        if !wanted || *filters != state.view.filters {
            return;
        }

        let info = &response.pagination;
        state.view.items = response.items.clone();
        state.view.total_items = info.total_items;
        state.view.total_pages = page_count(info.total_items, limit);
        state.view.current_page = if info.current_page > 0 {
            info.current_page
        } else {
            page
        };
        state.view.aux_counts = info.aux_counts();
        state.view.last_updated = Some(self.inner.clock.now());
        state.view.initial_load_done = true;
    }

    /// Navigates to `page`. Out-of-range pages and the current page are ignored.
    pub async fn set_page(&self, page: u32) -> Result<()> {
        let (limit, filters, served_from_cache) = {
            let mut state = self.state()?;
            if page == state.view.current_page || page < 1 || page > state.view.total_pages {
                return Ok(());
            }

            let key = cache_key(page, &state.view.filters);
            let cached = state.view.cached_pages.get(&key).cloned();
            let served_from_cache = match cached {
                Some(items) => {
                    state.view.items = items;
                    state.view.current_page = page;
                    state.requested_page = page;
                    true
                }
                None => false,
            };
            (
                state.view.items_per_page,
                state.view.filters.clone(),
                served_from_cache,
            )
        };

        if !served_from_cache {
            self.fetch_page(page, limit, filters, FetchMode::NORMAL)
                .await?;
        }
        self.schedule_preload();
        Ok(())
    }

    /// Changes the page size, dropping every cached page.
    pub async fn set_items_per_page(&self, items_per_page: u32) -> Result<()> {
        let filters = {
            let mut state = self.state()?;
            if items_per_page == 0 || items_per_page == state.view.items_per_page {
                return Ok(());
            }
            state.view.items_per_page = items_per_page;
            state.view.total_pages = page_count(state.view.total_items, items_per_page);
            state.view.cached_pages.clear();
            state.view.current_page = 1;
            state.requested_page = 1;
            state.generation += 1;
            state.view.filters.clone()
        };

        self.fetch_page(1, items_per_page, filters, FetchMode::FORCE)
            .await
            .map(|_| ())
    }

    /// Replaces the filters and reloads page 1. Cached pages for other filter
    /// sets stay valid under their own keys.
    pub async fn set_filters(&self, filters: R::Filters) -> Result<()> {
        let limit = {
            let mut state = self.state()?;
            state.view.filters = filters.clone();
            state.view.current_page = 1;
            state.requested_page = 1;
            state.generation += 1;
            state.view.items_per_page
        };

        self.fetch_page(1, limit, filters, FetchMode::FORCE)
            .await
            .map(|_| ())
    }

    /// Drops every cached page and reloads the current one.
    pub async fn refresh(&self) -> Result<()> {
        let (page, limit, filters) = {
            let mut state = self.state()?;
            state.view.cached_pages.clear();
            state.generation += 1;
            (
                state.view.current_page,
                state.view.items_per_page,
                state.view.filters.clone(),
            )
        };

        self.fetch_page(page, limit, filters, FetchMode::FORCE)
            .await
            .map(|_| ())
    }

    /// Silently fetches the page after the current one when it is not cached.
    ///
    /// Returns whether a fetch was attempted. Concurrent calls share one
    /// request through the in-flight table.
    pub async fn preload_next_pages(&self) -> Result<bool> {
        let (next, limit, filters) = {
            let state = self.state()?;
            if state.view.current_page >= state.view.total_pages {
                return Ok(false);
            }
            let next = state.view.current_page + 1;
            if state
                .view
                .cached_pages
                .contains_key(&cache_key(next, &state.view.filters))
            {
                return Ok(false);
            }
            (next, state.view.items_per_page, state.view.filters.clone())
        };

        let outcome = self
            .fetch_page(next, limit, filters, FetchMode::SILENT)
            .await?;
        Ok(outcome.is_network())
    }

    fn schedule_preload(&self) {
        if !self.inner.options.prefetch {
            return;
        }
        let delay = self.inner.options.prefetch_delay;
        let store = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = store.upgrade() {
                let store = PaginatedStore { inner };
                if let Err(err) = store.preload_next_pages().await {
                    debug!("{}: prefetch skipped: {}", R::PATH, err);
                }
            }
        });
    }

    /// Performs the first load once; later calls are no-ops.
    ///
    /// Returns whether this call loaded data.
    pub async fn ensure_initial_load(&self) -> Result<bool> {
        let (page, limit, filters) = {
            let state = self.state()?;
            if state.view.initial_load_done {
                return Ok(false);
            }
            (
                state.view.current_page,
                state.view.items_per_page,
                state.view.filters.clone(),
            )
        };

        let outcome = self
            .fetch_page(page, limit, filters, FetchMode::NORMAL)
            .await?;
        Ok(!matches!(outcome, FetchOutcome::Skipped))
    }

    /// Clears items, caches, counts and filters back to their initial values.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.state()?;
        let generation = state.generation + 1;
        let epoch = state.epoch + 1;
        *state = StoreState::new(self.inner.options.items_per_page.max(1));
        state.generation = generation;
        state.epoch = epoch;
        debug!("{}: store reset", R::PATH);
        Ok(())
    }

    async fn write(&self, request: ApiRequest) -> Result<JsonValue> {
        if !self.inner.session.is_authenticated() {
            return Err(ClientError::AuthRequired);
        }
        let written = self.inner.transport.send(request).await?;
        if let Err(err) = self.refresh().await {
            warn!("{}: refresh after write failed: {}", R::PATH, err);
        }
        Ok(written)
    }

    /// Creates a record, then reloads the current page from scratch.
    pub async fn create<P: Serialize>(&self, payload: &P) -> Result<JsonValue> {
        self.write(ApiRequest::post(R::PATH, to_body(payload)?))
            .await
    }

    pub async fn update<P: Serialize>(&self, id: &EntityId, patch: &P) -> Result<JsonValue> {
        self.write(ApiRequest::patch(
            format!("{}/{}", R::PATH, id),
            to_body(patch)?,
        ))
        .await
    }

    /// Soft delete: flags the record inactive.
    pub async fn deactivate(&self, id: &EntityId) -> Result<JsonValue> {
        self.write(ApiRequest::patch(
            format!("{}/{}", R::PATH, id),
            json!({ "status": EntityStatus::Inactive.as_str() }),
        ))
        .await
    }

    pub async fn remove(&self, id: &EntityId) -> Result<JsonValue> {
        self.write(ApiRequest::delete(format!("{}/{}", R::PATH, id)))
            .await
    }

    pub fn snapshot(&self) -> Result<PagedCollectionState<R::Item, R::Filters>> {
        Ok(self.state()?.view.clone())
    }

    pub fn items(&self) -> Result<Vec<R::Item>> {
        Ok(self.state()?.view.items.clone())
    }

    pub fn current_page(&self) -> Result<u32> {
        Ok(self.state()?.view.current_page)
    }

    pub fn total_pages(&self) -> Result<u32> {
        Ok(self.state()?.view.total_pages)
    }

    pub fn filters(&self) -> Result<R::Filters> {
        Ok(self.state()?.view.filters.clone())
    }

    pub fn error(&self) -> Result<Option<String>> {
        Ok(self.state()?.view.error.clone())
    }

    pub fn is_loading(&self) -> Result<bool> {
        Ok(self.state()?.view.is_loading)
    }

    /// Whether `page` is cached under the current filters.
    pub fn is_page_cached(&self, page: u32) -> Result<bool> {
        let state = self.state()?;
        Ok(state
            .view
            .cached_pages
            .contains_key(&cache_key(page, &state.view.filters)))
    }

    pub fn cached_page_count(&self) -> Result<usize> {
        Ok(self.state()?.view.cached_pages.len())
    }

    pub fn in_flight_requests(&self) -> usize {
        self.inner.flights.len()
    }
}

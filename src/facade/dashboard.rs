use crate::cache::SingletonEntityCache;
use crate::config::DashboardConfig;
use crate::core::{Clock, Result, SystemClock, Worker};
use crate::session::{AuthEventBus, FileTokenStore, MemoryTokenStore, Session, TokenStore};
use crate::store::{
    Faults, Operations, PaginatedStore, ReferenceData, StoreOptions, Users, WorkerDirectory,
};
use crate::transport::{HttpTransport, ServiceHealth, Transport};
use log::{info, warn};
use std::sync::Arc;

/// Composition root of the dashboard data layer.
///
/// Owns the auth event bus, the session, the backend health signal and every
/// store, wired so that a logout anywhere clears all of them.
///
/// # Examples
///
/// ```no_run
/// use opsboard::{Dashboard, DashboardConfig, OperationFilters};
///
/// # async fn run() -> opsboard::Result<()> {
/// let dashboard = Dashboard::connect(DashboardConfig::new("https://ops.example.com/api")).await?;
/// dashboard.login("token").await?;
///
/// let operations = dashboard.operations();
/// operations.set_filters(OperationFilters::default().status("PENDING")).await?;
/// operations.set_page(2).await?;
/// println!("{} operations on page 2", operations.items()?.len());
/// # Ok(())
/// # }
/// ```
pub struct Dashboard {
    config: DashboardConfig,
    session: Arc<Session>,
    health: Arc<ServiceHealth>,
    worker_cache: Arc<SingletonEntityCache<Worker>>,
    operations: PaginatedStore<Operations>,
    faults: PaginatedStore<Faults>,
    users: PaginatedStore<Users>,
    workers: WorkerDirectory,
    reference: ReferenceData,
}

/// Assembles a [`Dashboard`], letting callers swap the transport, clock,
/// token storage or the shared worker cache.
pub struct DashboardBuilder {
    config: DashboardConfig,
    transport: Option<Arc<dyn Transport>>,
    clock: Option<Arc<dyn Clock>>,
    token_store: Option<Arc<dyn TokenStore>>,
    worker_cache: Option<Arc<SingletonEntityCache<Worker>>>,
    health: Option<Arc<ServiceHealth>>,
}

impl DashboardBuilder {
    pub fn new(config: DashboardConfig) -> Self {
        Self {
            config,
            transport: None,
            clock: None,
            token_store: None,
            worker_cache: None,
            health: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    /// Shares an existing worker cache, so a rebuilt dashboard adopts it.
    pub fn worker_cache(mut self, cache: Arc<SingletonEntityCache<Worker>>) -> Self {
        self.worker_cache = Some(cache);
        self
    }

    pub fn health(mut self, health: Arc<ServiceHealth>) -> Self {
        self.health = Some(health);
        self
    }

    pub async fn build(self) -> Result<Dashboard> {
        let config = self.config;
        config.validate()?;

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let token_store: Arc<dyn TokenStore> = match (self.token_store, &config.token_path) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(FileTokenStore::new(path)),
            (None, None) => Arc::new(MemoryTokenStore::new()),
        };

        let bus = AuthEventBus::new();
        let session = Arc::new(Session::new(token_store, Arc::clone(&bus)));
        if session.restore().await? {
            info!("restored persisted session");
        }

        let health = self
            .health
            .unwrap_or_else(|| Arc::new(ServiceHealth::new(config.degraded_after_failures)));
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(
                &config,
                Arc::clone(&session),
                Arc::clone(&health),
            )?),
        };
        let worker_cache = self.worker_cache.unwrap_or_else(|| {
            Arc::new(SingletonEntityCache::new(
                config.worker_cache_ttl,
                Arc::clone(&clock),
            ))
        });

        let options = StoreOptions::from_config(&config);
        let operations = PaginatedStore::new(
            Arc::clone(&transport),
            Arc::clone(&session),
            Arc::clone(&clock),
            options,
        );
        let faults = PaginatedStore::new(
            Arc::clone(&transport),
            Arc::clone(&session),
            Arc::clone(&clock),
            options,
        );
        let users = PaginatedStore::new(
            Arc::clone(&transport),
            Arc::clone(&session),
            Arc::clone(&clock),
            options,
        );
        let workers = WorkerDirectory::new(
            Arc::clone(&worker_cache),
            Arc::clone(&transport),
            Arc::clone(&session),
        );
        let reference = ReferenceData::new(Arc::clone(&transport), Arc::clone(&session));

        Ok(Dashboard {
            config,
            session,
            health,
            worker_cache,
            operations,
            faults,
            users,
            workers,
            reference,
        })
    }
}

impl Dashboard {
    /// Builds a dashboard talking HTTP to `config.base_url`.
    pub async fn connect(config: DashboardConfig) -> Result<Self> {
        DashboardBuilder::new(config).build().await
    }

    pub fn builder(config: DashboardConfig) -> DashboardBuilder {
        DashboardBuilder::new(config)
    }

    /// Starts a session; every store performs its initial load.
    pub async fn login(&self, token: &str) -> Result<()> {
        self.session.login(token).await
    }

    /// Ends the session; every store is cleared.
    pub async fn logout(&self) -> Result<()> {
        self.session.logout().await
    }

    /// Loads the first page of every paginated store and the worker list.
    ///
    /// Useful after restoring a persisted session, when no login event fires.
    pub async fn load_all(&self) -> Result<()> {
        self.operations.ensure_initial_load().await?;
        self.faults.ensure_initial_load().await?;
        self.users.ensure_initial_load().await?;
        if let Err(err) = self.workers.load(false).await {
            warn!("workers: initial load failed: {}", err);
        }
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    /// Whether the server-status banner should be shown.
    pub fn is_degraded(&self) -> bool {
        self.health.is_degraded()
    }

    pub fn operations(&self) -> &PaginatedStore<Operations> {
        &self.operations
    }

    pub fn faults(&self) -> &PaginatedStore<Faults> {
        &self.faults
    }

    pub fn users(&self) -> &PaginatedStore<Users> {
        &self.users
    }

    pub fn workers(&self) -> &WorkerDirectory {
        &self.workers
    }

    pub fn reference(&self) -> &ReferenceData {
        &self.reference
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn health(&self) -> &Arc<ServiceHealth> {
        &self.health
    }

    pub fn worker_cache(&self) -> &Arc<SingletonEntityCache<Worker>> {
        &self.worker_cache
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }
}

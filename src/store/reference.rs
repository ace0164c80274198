use crate::cache::RequestCache;
use crate::core::{Area, Customer, Result, ServiceLine};
use crate::session::{AuthEvent, AuthListener, AuthSubscription, Session};
use crate::transport::{ApiRequest, Transport, fetch_json};
use async_trait::async_trait;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, Weak};

const AREAS_PATH: &str = "areas";
const CLIENTS_PATH: &str = "clients";
const SERVICES_PATH: &str = "services";

struct ReferenceInner {
    areas: RequestCache<Vec<Area>>,
    clients: RequestCache<Vec<Customer>>,
    services: RequestCache<Vec<ServiceLine>>,
    transport: Arc<dyn Transport>,
    session: Arc<Session>,
    _subscription: Mutex<Option<AuthSubscription>>,
}

impl ReferenceInner {
    fn clear(&self) -> Result<()> {
        self.areas.clear()?;
        self.clients.clear()?;
        self.services.clear()?;
        Ok(())
    }
}

/// Low-cardinality lookup lists (areas, clients, services), fetched once per
/// session and shared by every caller.
#[derive(Clone)]
pub struct ReferenceData {
    inner: Arc<ReferenceInner>,
}

struct ReferenceListener {
    data: Weak<ReferenceInner>,
}

#[async_trait]
impl AuthListener for ReferenceListener {
    async fn on_auth_event(&self, event: AuthEvent) {
        if event != AuthEvent::Logout {
            return;
        }
        if let Some(inner) = self.data.upgrade() {
            if let Err(err) = inner.clear() {
                warn!("reference data: clear on logout failed: {}", err);
            }
        }
    }
}

async fn load_list<T>(
    cache: &RequestCache<Vec<T>>,
    transport: &Arc<dyn Transport>,
    session: &Session,
    path: &'static str,
) -> Result<Vec<T>>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    if !session.is_authenticated() {
        debug!("{}: lookup skipped, no session", path);
        return Ok(Vec::new());
    }
    let transport = Arc::clone(transport);
    cache
        .get_or_fetch(path, move || async move {
            fetch_json::<Vec<T>>(transport.as_ref(), ApiRequest::get(path)).await
        })
        .await
}

impl ReferenceData {
    pub fn new(transport: Arc<dyn Transport>, session: Arc<Session>) -> Self {
        let inner = Arc::new(ReferenceInner {
            areas: RequestCache::new(),
            clients: RequestCache::new(),
            services: RequestCache::new(),
            transport,
            session: Arc::clone(&session),
            _subscription: Mutex::new(None),
        });

        let listener = Arc::new(ReferenceListener {
            data: Arc::downgrade(&inner),
        });
        let subscription = session.bus().subscribe(listener);
        *inner
            ._subscription
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = Some(subscription);

        Self { inner }
    }

    pub async fn areas(&self) -> Result<Vec<Area>> {
        let inner = &self.inner;
        load_list(&inner.areas, &inner.transport, &inner.session, AREAS_PATH).await
    }

    pub async fn clients(&self) -> Result<Vec<Customer>> {
        let inner = &self.inner;
        load_list(&inner.clients, &inner.transport, &inner.session, CLIENTS_PATH).await
    }

    pub async fn services(&self) -> Result<Vec<ServiceLine>> {
        let inner = &self.inner;
        load_list(&inner.services, &inner.transport, &inner.session, SERVICES_PATH).await
    }

    /// Forgets every cached list; the next lookup refetches.
    pub fn invalidate_all(&self) -> Result<()> {
        self.inner.clear()
    }
}

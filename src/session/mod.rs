//! Bearer-token session and the auth event bus.

pub mod events;
pub mod token;

pub use events::{AuthEvent, AuthEventBus, AuthListener, AuthSubscription};
pub use token::{FileTokenStore, MemoryTokenStore, TokenStore};

use crate::core::Result;
use log::info;
use std::sync::{Arc, RwLock};

/// Current session: the bearer token plus the bus that announces transitions.
///
/// `is_authenticated` is the predicate the stores consult before touching the
/// network.
pub struct Session {
    token: RwLock<Option<String>>,
    store: Arc<dyn TokenStore>,
    bus: Arc<AuthEventBus>,
}

impl Session {
    pub fn new(store: Arc<dyn TokenStore>, bus: Arc<AuthEventBus>) -> Self {
        Self {
            token: RwLock::new(None),
            store,
            bus,
        }
    }

    /// Loads a previously persisted token without publishing any event.
    ///
    /// Returns whether a token was found.
    pub async fn restore(&self) -> Result<bool> {
        let token = self.store.load().await?;
        let found = token.is_some();
        *self.token.write()? = token;
        Ok(found)
    }

    pub fn is_authenticated(&self) -> bool {
        self.token
            .read()
            .map(|token| token.is_some())
            .unwrap_or(false)
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|token| token.clone())
    }

    pub fn bus(&self) -> &Arc<AuthEventBus> {
        &self.bus
    }

    /// Stores `token` and announces the login to every subscribed store.
    pub async fn login(&self, token: &str) -> Result<()> {
        self.store.save(token).await?;
        *self.token.write()? = Some(token.to_string());
        info!("session started");
        self.bus.publish(AuthEvent::LoginSuccess).await;
        Ok(())
    }

    /// Drops the token and announces the logout so stores clear their data.
    pub async fn logout(&self) -> Result<()> {
        *self.token.write()? = None;
        let cleared = self.store.clear().await;
        info!("session ended");
        self.bus.publish(AuthEvent::Logout).await;
        cleared
    }
}

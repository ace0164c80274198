//! Typed publish/subscribe channel for session transitions.
//!
//! The bus is owned by the composition root. Stores subscribe when they are
//! built and are unsubscribed when their [`AuthSubscription`] is dropped.

use async_trait::async_trait;
use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthEvent {
    LoginSuccess,
    Logout,
}

impl AuthEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::LoginSuccess => "auth:login_success",
            AuthEvent::Logout => "auth:logout",
        }
    }
}

#[async_trait]
pub trait AuthListener: Send + Sync {
    async fn on_auth_event(&self, event: AuthEvent);
}

pub struct AuthEventBus {
    listeners: Mutex<Vec<(u64, Arc<dyn AuthListener>)>>,
    next_id: AtomicU64,
}

impl AuthEventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Registers `listener` until the returned subscription is dropped.
    pub fn subscribe(self: &Arc<Self>, listener: Arc<dyn AuthListener>) -> AuthSubscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((id, listener));

        AuthSubscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    /// Delivers `event` to every listener, one after another.
    ///
    /// Returns the number of listeners notified.
    pub async fn publish(&self, event: AuthEvent) -> usize {
        let listeners: Vec<Arc<dyn AuthListener>> = self
            .listeners
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        debug!(
            "publishing '{}' to {} listener(s)",
            event.name(),
            listeners.len()
        );

        for listener in &listeners {
            listener.on_auth_event(event).await;
        }
        listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .map(|listeners| listeners.len())
            .unwrap_or(0)
    }

    fn unsubscribe(&self, id: u64) {
        self.listeners
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .retain(|(listener_id, _)| *listener_id != id);
    }
}

/// Keeps a listener registered; unsubscribes on drop.
pub struct AuthSubscription {
    bus: Weak<AuthEventBus>,
    id: u64,
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

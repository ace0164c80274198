/// Auth event tests
///
/// Every store reacts to login and logout published on the session's bus.
/// Run with: cargo test --test auth_events_tests

mod common;

use common::{MockBackend, workers_body};
use opsboard::core::{FilterMap, OperationFilters};
use opsboard::session::MemoryTokenStore;
use opsboard::transport::Transport;
use opsboard::{Dashboard, DashboardConfig};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn backend() -> Arc<MockBackend> {
    MockBackend::new()
        .with_total("operations", 25)
        .with_total("faults", 12)
        .with_total("users", 3)
        .with_route("workers", workers_body(3))
        .with_route("areas", json!([{ "id": 1, "name": "North" }]))
}

async fn dashboard(backend: &Arc<MockBackend>, token: Option<&str>) -> Dashboard {
    let store = match token {
        Some(token) => MemoryTokenStore::with_token(token),
        None => MemoryTokenStore::new(),
    };
    Dashboard::builder(DashboardConfig::default().prefetch(false))
        .transport(backend.clone() as Arc<dyn Transport>)
        .token_store(Arc::new(store))
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_login_triggers_initial_load_everywhere() {
    let backend = backend();
    let dashboard = dashboard(&backend, None).await;
    assert!(!dashboard.is_authenticated());
    assert_eq!(backend.request_count(), 0);

    dashboard.login("token-1").await.unwrap();

    assert_eq!(dashboard.operations().items().unwrap().len(), 10);
    assert_eq!(dashboard.faults().total_pages().unwrap(), 2);
    assert_eq!(dashboard.users().items().unwrap().len(), 3);
    assert_eq!(dashboard.workers().workers().len(), 3);
    assert_eq!(backend.page_hits("operations", 1), 1);
    assert_eq!(backend.page_hits("faults", 1), 1);
    assert_eq!(backend.page_hits("users", 1), 1);
    assert_eq!(backend.hits("workers"), 1);
}

#[tokio::test]
async fn test_repeated_login_does_not_reload() {
    let backend = backend();
    let dashboard = dashboard(&backend, None).await;
    dashboard.login("token-1").await.unwrap();
    let requests = backend.request_count();

    dashboard.login("token-1").await.unwrap();

    assert_eq!(backend.request_count(), requests);
}

#[tokio::test]
async fn test_logout_clears_every_store() {
    let backend = backend();
    let dashboard = dashboard(&backend, None).await;
    dashboard.login("token-1").await.unwrap();
    dashboard.operations().set_page(2).await.unwrap();
    dashboard
        .operations()
        .set_filters(OperationFilters::default().status("PENDING"))
        .await
        .unwrap();
    dashboard
        .users()
        .set_filters(FilterMap::new().with("role", "ADMIN"))
        .await
        .unwrap();
    dashboard.reference().areas().await.unwrap();

    dashboard.logout().await.unwrap();

    assert!(!dashboard.is_authenticated());
    let operations = dashboard.operations().snapshot().unwrap();
    assert!(operations.items.is_empty());
    assert!(operations.cached_pages.is_empty());
    assert_eq!(operations.total_items, 0);
    assert_eq!(operations.total_pages, 0);
    assert_eq!(operations.current_page, 1);
    assert_eq!(operations.filters, OperationFilters::default());
    assert!(operations.aux_counts.is_empty());
    assert!(!operations.initial_load_done);

    let users = dashboard.users().snapshot().unwrap();
    assert!(users.items.is_empty());
    assert_eq!(users.filters, FilterMap::new());

    assert!(dashboard.faults().items().unwrap().is_empty());
    assert!(dashboard.workers().workers().is_empty());
    assert!(!dashboard.workers().is_fresh());
    assert!(dashboard.worker_cache().get_state().last_updated.is_none());
}

#[tokio::test]
async fn test_login_after_logout_loads_again() {
    let backend = backend();
    let dashboard = dashboard(&backend, None).await;
    dashboard.login("token-1").await.unwrap();
    dashboard.reference().areas().await.unwrap();
    dashboard.logout().await.unwrap();

    dashboard.login("token-2").await.unwrap();

    assert_eq!(backend.page_hits("operations", 1), 2);
    assert_eq!(backend.hits("workers"), 2);
    // Reference lists were forgotten on logout
    dashboard.reference().areas().await.unwrap();
    assert_eq!(backend.hits("areas"), 2);
}

#[tokio::test]
async fn test_response_landing_after_logout_is_dropped() {
    let backend = backend();
    let dashboard = Arc::new(dashboard(&backend, None).await);
    dashboard.login("token-1").await.unwrap();
    backend.set_delay(Duration::from_millis(50));

    let navigation = {
        let operations = dashboard.operations().clone();
        tokio::spawn(async move { operations.set_page(2).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    dashboard.logout().await.unwrap();
    navigation.await.unwrap().unwrap();

    let state = dashboard.operations().snapshot().unwrap();
    assert!(state.items.is_empty());
    assert!(state.cached_pages.is_empty());
    assert!(!state.is_loading);
}

#[tokio::test]
async fn test_restored_session_loads_on_demand() {
    let backend = backend();
    let dashboard = dashboard(&backend, Some("persisted")).await;
    assert!(dashboard.is_authenticated());
    // Restoring publishes nothing
    assert_eq!(backend.request_count(), 0);

    dashboard.load_all().await.unwrap();

    assert_eq!(backend.page_hits("operations", 1), 1);
    assert_eq!(backend.page_hits("faults", 1), 1);
    assert_eq!(backend.page_hits("users", 1), 1);
    assert_eq!(backend.hits("workers"), 1);
}

#[tokio::test]
async fn test_dropped_dashboard_unsubscribes_its_stores() {
    let backend = backend();
    let dashboard = dashboard(&backend, None).await;
    let bus = Arc::clone(dashboard.session().bus());
    assert_eq!(bus.listener_count(), 5);

    let session = Arc::clone(dashboard.session());
    drop(dashboard);

    assert_eq!(bus.listener_count(), 0);
    session.login("late").await.unwrap();
    assert_eq!(backend.request_count(), 0);
}

/// Reference data tests
///
/// Areas, clients and services are fetched once per session and shared.
/// Run with: cargo test --test reference_data_tests

mod common;

use common::{MockBackend, session};
use opsboard::core::{ClientError, EntityStatus};
use opsboard::store::ReferenceData;
use opsboard::transport::Transport;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn backend() -> Arc<MockBackend> {
    MockBackend::new()
        .with_route(
            "areas",
            json!([
                { "id": 1, "name": "North", "status": "ACTIVE" },
                { "id": 2, "name": "South", "status": "INACTIVE" }
            ]),
        )
        .with_route("clients", json!([{ "id": "c-1", "name": "Acme" }]))
        .with_route("services", json!([{ "id": 9, "name": "Night shift" }]))
}

#[tokio::test]
async fn test_lists_are_fetched_once() {
    let backend = backend();
    let reference = ReferenceData::new(backend.clone() as Arc<dyn Transport>, session(true).await);

    let areas = reference.areas().await.unwrap();
    assert_eq!(areas.len(), 2);
    assert_eq!(areas[1].status, EntityStatus::Inactive);
    reference.areas().await.unwrap();

    assert_eq!(reference.clients().await.unwrap()[0].name, "Acme");
    assert_eq!(reference.services().await.unwrap()[0].id.as_str(), "9");

    assert_eq!(backend.hits("areas"), 1);
    assert_eq!(backend.hits("clients"), 1);
    assert_eq!(backend.hits("services"), 1);
}

#[tokio::test]
async fn test_concurrent_lookups_share_one_request() {
    let backend = backend();
    backend.set_delay(Duration::from_millis(30));
    let reference = ReferenceData::new(backend.clone() as Arc<dyn Transport>, session(true).await);

    let (a, b, c) = tokio::join!(reference.areas(), reference.areas(), reference.areas());

    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(c.unwrap().len(), 2);
    assert_eq!(backend.hits("areas"), 1);
}

#[tokio::test]
async fn test_failure_is_not_cached() {
    let backend = backend();
    let reference = ReferenceData::new(backend.clone() as Arc<dyn Transport>, session(true).await);
    backend.fail_next("clients", ClientError::Network("refused".into()));

    let failed = reference.clients().await;
    assert!(matches!(failed, Err(ClientError::Network(_))));

    let retried = reference.clients().await.unwrap();
    assert_eq!(retried.len(), 1);
    assert_eq!(backend.hits("clients"), 2);
}

#[tokio::test]
async fn test_invalidate_all_forces_refetch() {
    let backend = backend();
    let reference = ReferenceData::new(backend.clone() as Arc<dyn Transport>, session(true).await);
    reference.services().await.unwrap();

    reference.invalidate_all().unwrap();
    reference.services().await.unwrap();

    assert_eq!(backend.hits("services"), 2);
}

#[tokio::test]
async fn test_lookups_without_session_are_empty() {
    let backend = backend();
    let reference = ReferenceData::new(backend.clone() as Arc<dyn Transport>, session(false).await);

    assert!(reference.areas().await.unwrap().is_empty());
    assert_eq!(backend.request_count(), 0);
}

//! Shared fixtures for the integration tests: a scripted in-memory backend.
#![allow(dead_code)]

use async_trait::async_trait;
use opsboard::core::{ClientError, Result};
use opsboard::session::{AuthEventBus, MemoryTokenStore, Session};
use opsboard::transport::{ApiRequest, HttpMethod, Transport};
use serde_json::{Value as JsonValue, json};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Backend double serving `{resource}/paginated` pages from a synthetic
/// dataset and fixed bodies for everything else.
#[derive(Default)]
pub struct MockBackend {
    requests: Mutex<Vec<ApiRequest>>,
    totals: Mutex<HashMap<String, u64>>,
    aux: Mutex<HashMap<String, JsonValue>>,
    bundle: Mutex<HashMap<String, u32>>,
    routes: Mutex<HashMap<String, JsonValue>>,
    failures: Mutex<VecDeque<(String, ClientError)>>,
    delay: Mutex<Duration>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of records the paginated endpoint of `resource` reports.
    pub fn with_total(self: &Arc<Self>, resource: &str, total: u64) -> Arc<Self> {
        self.totals.lock().unwrap().insert(resource.to_string(), total);
        Arc::clone(self)
    }

    /// Extra numeric fields merged into every pagination object of `resource`.
    pub fn with_aux(self: &Arc<Self>, resource: &str, aux: JsonValue) -> Arc<Self> {
        self.aux.lock().unwrap().insert(resource.to_string(), aux);
        Arc::clone(self)
    }

    /// Makes `resource` push the next `pages` pages along with each response.
    pub fn with_bundled_pages(self: &Arc<Self>, resource: &str, pages: u32) -> Arc<Self> {
        self.bundle.lock().unwrap().insert(resource.to_string(), pages);
        Arc::clone(self)
    }

    /// Fixed body for `GET path`.
    pub fn with_route(self: &Arc<Self>, path: &str, body: JsonValue) -> Arc<Self> {
        self.routes.lock().unwrap().insert(path.to_string(), body);
        Arc::clone(self)
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// The next request whose path starts with `path_prefix` fails with `error`.
    pub fn fail_next(&self, path_prefix: &str, error: ClientError) {
        self.failures
            .lock()
            .unwrap()
            .push_back((path_prefix.to_string(), error));
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Requests sent to `path`, any method.
    pub fn hits(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.path == path)
            .count()
    }

    /// Paginated requests for `page` of `resource`.
    pub fn page_hits(&self, resource: &str, page: u32) -> usize {
        let path = format!("{}/paginated", resource);
        let page = page.to_string();
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.path == path && request.param("page") == Some(&page))
            .count()
    }

    fn take_failure(&self, path: &str) -> Option<ClientError> {
        let mut failures = self.failures.lock().unwrap();
        let position = failures
            .iter()
            .position(|(prefix, _)| path.starts_with(prefix.as_str()))?;
        failures.remove(position).map(|(_, error)| error)
    }

    fn page_body(&self, resource: &str, request: &ApiRequest) -> JsonValue {
        let total = self.totals.lock().unwrap().get(resource).copied().unwrap_or(0);
        let page: u32 = request.param("page").and_then(|p| p.parse().ok()).unwrap_or(1);
        let limit: u32 = request.param("limit").and_then(|l| l.parse().ok()).unwrap_or(10);
        let tag = request.param("status").unwrap_or("ALL").to_string();

        let mut pagination = json!({
            "totalItems": total,
            "currentPage": page,
            "itemsPerPage": limit,
            "totalPages": total.div_ceil(u64::from(limit)),
        });
        if let Some(JsonValue::Object(aux)) = self.aux.lock().unwrap().get(resource) {
            for (name, value) in aux {
                pagination[name] = value.clone();
            }
        }

        let mut body = json!({
            "items": page_items(resource, page, limit, total, &tag),
            "pagination": pagination,
        });
        let bundled = self.bundle.lock().unwrap().get(resource).copied().unwrap_or(0);
        if bundled > 0 {
            let next: Vec<JsonValue> = (page + 1..=page + bundled)
                .filter(|next| u64::from(*next - 1) * u64::from(limit) < total)
                .map(|next| {
                    json!({
                        "pageNumber": next,
                        "items": page_items(resource, next, limit, total, &tag),
                    })
                })
                .collect();
            body["nextPages"] = JsonValue::Array(next);
        }
        body
    }
}

/// Records `(page - 1) * limit + 1 ..` of a synthetic collection, tagged with
/// the status filter so tests can tell filter sets apart.
pub fn page_items(resource: &str, page: u32, limit: u32, total: u64, tag: &str) -> Vec<JsonValue> {
    let start = u64::from(page.saturating_sub(1)) * u64::from(limit);
    let end = (start + u64::from(limit)).min(total);
    (start..end)
        .map(|n| {
            json!({
                "id": format!("{}-{}", resource, n + 1),
                "status": tag,
                "username": format!("user-{}", n + 1),
            })
        })
        .collect()
}

/// Id of the first record on `page` at `limit` per page.
pub fn first_id(resource: &str, page: u32, limit: u32) -> String {
    format!("{}-{}", resource, (page - 1) * limit + 1)
}

#[async_trait]
impl Transport for MockBackend {
    async fn send(&self, request: ApiRequest) -> Result<JsonValue> {
        self.requests.lock().unwrap().push(request.clone());
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.take_failure(&request.path) {
            return Err(error);
        }

        if request.method != HttpMethod::Get {
            return Ok(json!({ "ok": true }));
        }
        if let Some(resource) = request.path.strip_suffix("/paginated") {
            return Ok(self.page_body(resource, &request));
        }
        let routed = self.routes.lock().unwrap().get(&request.path).cloned();
        routed.ok_or_else(|| ClientError::Http {
            status: 404,
            message: format!("no route for {}", request.path),
        })
    }
}

/// A session on a fresh bus, optionally already logged in (without
/// publishing a login event).
pub async fn session(logged_in: bool) -> Arc<Session> {
    let store = if logged_in {
        MemoryTokenStore::with_token("test-token")
    } else {
        MemoryTokenStore::new()
    };
    let session = Arc::new(Session::new(Arc::new(store), AuthEventBus::new()));
    session.restore().await.unwrap();
    session
}

pub fn workers_body(count: usize) -> JsonValue {
    JsonValue::Array(
        (1..=count)
            .map(|n| {
                json!({
                    "id": n,
                    "name": format!("Worker {}", n),
                    "status": if n % 2 == 0 { "INACTIVE" } else { "ACTIVE" },
                })
            })
            .collect(),
    )
}

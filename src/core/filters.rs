//! Typed filter records and the cache/request keys derived from them.
//!
//! Every resource exposes a fixed set of optional filter fields; any subset may
//! be present. Keys are built from the canonical form of the filter set: empty
//! values are dropped and the remaining `name=value` pairs are sorted by name,
//! so structurally equal filters always produce the same key no matter in which
//! order their fields were set.

use crate::core::types::EntityId;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// A filter record usable as a page-cache key component.
pub trait FilterSet: Clone + Default + PartialEq + Debug + Send + Sync + 'static {
    /// Query parameters sent to the backend, in any order.
    fn query_pairs(&self) -> Vec<(String, String)>;

    /// Order-independent textual form of the filter set.
    fn canonical(&self) -> String {
        let sorted: BTreeMap<String, String> = self
            .query_pairs()
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .collect();
        serde_json::to_string(&sorted).unwrap_or_default()
    }

    fn is_empty(&self) -> bool {
        self.query_pairs().iter().all(|(_, value)| value.is_empty())
    }
}

/// Key of a cached page: `(page, filters)`.
pub fn cache_key<F: FilterSet>(page: u32, filters: &F) -> String {
    format!("page={}|{}", page, filters.canonical())
}

/// Key of an in-flight request: `(page, limit, filters)`.
pub fn request_key<F: FilterSet>(page: u32, limit: u32, filters: &F) -> String {
    format!("page={}|limit={}|{}", page, limit, filters.canonical())
}

fn push<T: ToString>(pairs: &mut Vec<(String, String)>, name: &str, value: &Option<T>) {
    if let Some(value) = value {
        pairs.push((name.to_string(), value.to_string()));
    }
}

fn push_date(pairs: &mut Vec<(String, String)>, name: &str, value: &Option<NaiveDate>) {
    if let Some(value) = value {
        pairs.push((name.to_string(), value.format("%Y-%m-%d").to_string()));
    }
}

/// Filters for the operations board.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationFilters {
    pub status: Option<String>,
    pub area_id: Option<EntityId>,
    pub client_id: Option<EntityId>,
    pub service_id: Option<EntityId>,
    pub worker_id: Option<EntityId>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub search: Option<String>,
}

impl OperationFilters {
    pub fn status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }

    pub fn area(mut self, area_id: impl Into<EntityId>) -> Self {
        self.area_id = Some(area_id.into());
        self
    }

    pub fn client(mut self, client_id: impl Into<EntityId>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn between(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn search(mut self, term: &str) -> Self {
        self.search = Some(term.to_string());
        self
    }
}

impl FilterSet for OperationFilters {
    fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        push(&mut pairs, "status", &self.status);
        push(&mut pairs, "areaId", &self.area_id);
        push(&mut pairs, "clientId", &self.client_id);
        push(&mut pairs, "serviceId", &self.service_id);
        push(&mut pairs, "workerId", &self.worker_id);
        push_date(&mut pairs, "startDate", &self.start_date);
        push_date(&mut pairs, "endDate", &self.end_date);
        push(&mut pairs, "search", &self.search);
        pairs
    }
}

/// Filters for the faults list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultFilters {
    pub status: Option<String>,
    pub kind: Option<String>,
    pub worker_id: Option<EntityId>,
    pub area_id: Option<EntityId>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub search: Option<String>,
}

impl FaultFilters {
    pub fn status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }

    pub fn kind(mut self, kind: &str) -> Self {
        self.kind = Some(kind.to_string());
        self
    }

    pub fn worker(mut self, worker_id: impl Into<EntityId>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    pub fn search(mut self, term: &str) -> Self {
        self.search = Some(term.to_string());
        self
    }
}

impl FilterSet for FaultFilters {
    fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        push(&mut pairs, "status", &self.status);
        push(&mut pairs, "type", &self.kind);
        push(&mut pairs, "workerId", &self.worker_id);
        push(&mut pairs, "areaId", &self.area_id);
        push_date(&mut pairs, "startDate", &self.start_date);
        push_date(&mut pairs, "endDate", &self.end_date);
        push(&mut pairs, "search", &self.search);
        pairs
    }
}

/// Open filter bag for resources without a dedicated record (users, ad-hoc
/// reports). Backed by a sorted map, so insertion order never leaks into keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterMap(BTreeMap<String, String>);

impl FilterMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl ToString) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl ToString) {
        self.0.insert(name.to_string(), value.to_string());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

impl FilterSet for FilterMap {
    fn query_pairs(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

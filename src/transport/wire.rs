//! JSON shapes exchanged with the REST backend.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// `GET /{resource}/paginated` response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    rename_all = "camelCase",
    bound(deserialize = "T: Deserialize<'de>", serialize = "T: Serialize")
)]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub pagination: PaginationInfo,
    /// Following pages pushed proactively by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_pages: Option<Vec<PageBundle<T>>>,
}

impl<T> PageResponse<T> {
    pub fn bundled_pages(&self) -> &[PageBundle<T>] {
        self.next_pages.as_deref().unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationInfo {
    #[serde(default)]
    pub total_items: u64,
    #[serde(default = "first_page")]
    pub current_page: u32,
    #[serde(default)]
    pub items_per_page: u32,
    #[serde(default)]
    pub total_pages: u32,
    /// Server-declared aggregates (per-status totals and the like).
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

fn first_page() -> u32 {
    1
}

impl PaginationInfo {
    /// Numeric auxiliary counts; non-numeric extras are ignored.
    pub fn aux_counts(&self) -> BTreeMap<String, u64> {
        self.extra
            .iter()
            .filter_map(|(name, value)| value.as_u64().map(|count| (name.clone(), count)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageBundle<T> {
    pub page_number: u32,
    pub items: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_page_with_aux_counts_and_bundle() {
        let page: PageResponse<u32> = serde_json::from_value(json!({
            "items": [1, 2],
            "pagination": {
                "totalItems": 25,
                "currentPage": 1,
                "itemsPerPage": 2,
                "totalPages": 13,
                "pendingCount": 4,
                "completedCount": 21,
                "label": "ignored"
            },
            "nextPages": [{"pageNumber": 2, "items": [3, 4]}]
        }))
        .unwrap();

        assert_eq!(page.pagination.total_items, 25);
        let counts = page.pagination.aux_counts();
        assert_eq!(counts.get("pendingCount"), Some(&4));
        assert_eq!(counts.get("completedCount"), Some(&21));
        assert!(!counts.contains_key("label"));
        assert_eq!(page.bundled_pages()[0].page_number, 2);
    }

    #[test]
    fn parses_records_without_default() {
        let page: PageResponse<crate::core::Operation> = serde_json::from_value(json!({
            "items": [{"id": 7, "status": "PENDING"}],
            "pagination": {"totalItems": 1, "currentPage": 1, "itemsPerPage": 10, "totalPages": 1}
        }))
        .unwrap();

        assert_eq!(page.items[0].id.as_str(), "7");
        assert_eq!(page.items[0].status.as_deref(), Some("PENDING"));
        assert!(page.next_pages.is_none());
    }

    #[test]
    fn next_pages_are_optional() {
        let page: PageResponse<u32> = serde_json::from_value(json!({
            "items": [],
            "pagination": {"totalItems": 0, "currentPage": 1, "itemsPerPage": 10, "totalPages": 0},
            "nextPages": null
        }))
        .unwrap();
        assert!(page.bundled_pages().is_empty());
    }
}

use crate::core::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Dashboard data-layer configuration
///
/// Built with the builder methods below, or loaded from a JSON file where
/// durations are given in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    /// Backend base URL, e.g. `https://ops.example.com/api`
    pub base_url: String,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// Initial page size for paginated stores
    pub items_per_page: u32,

    /// Freshness window of the all-workers cache
    pub worker_cache_ttl: Duration,

    /// Prefetch the next page after navigating to a cached page
    pub prefetch: bool,

    /// Delay before the prefetch fires
    pub prefetch_delay: Duration,

    /// Consecutive network/5xx failures before the backend is reported degraded
    pub degraded_after_failures: u32,

    /// Where the bearer token is persisted; in-memory when unset
    pub token_path: Option<PathBuf>,
}

impl DashboardConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            request_timeout: Duration::from_secs(15),
            items_per_page: 10,
            worker_cache_ttl: Duration::from_secs(30 * 60), // 30 minutes
            prefetch: true,
            prefetch_delay: Duration::from_millis(300),
            degraded_after_failures: 2,
            token_path: None,
        }
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn items_per_page(mut self, items: u32) -> Self {
        self.items_per_page = items;
        self
    }

    pub fn worker_cache_ttl(mut self, ttl: Duration) -> Self {
        self.worker_cache_ttl = ttl;
        self
    }

    pub fn prefetch(mut self, enabled: bool) -> Self {
        self.prefetch = enabled;
        self
    }

    pub fn prefetch_delay(mut self, delay: Duration) -> Self {
        self.prefetch_delay = delay;
        self
    }

    pub fn degraded_after_failures(mut self, failures: u32) -> Self {
        self.degraded_after_failures = failures;
        self
    }

    pub fn token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = Some(path.into());
        self
    }

    /// Loads a JSON config file.
    ///
    /// ```json
    /// { "baseUrl": "http://localhost:3000/api", "itemsPerPage": 25 }
    /// ```
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|err| {
            ClientError::InvalidConfig(format!("Failed to read '{}': {}", path.display(), err))
        })?;
        let file: ConfigFile = serde_json::from_slice(&bytes).map_err(|err| {
            ClientError::InvalidConfig(format!("Failed to parse '{}': {}", path.display(), err))
        })?;
        let config = file.into_config();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ClientError::InvalidConfig(
                "base_url must start with http:// or https://".to_string(),
            ));
        }

        if self.items_per_page == 0 {
            return Err(ClientError::InvalidConfig(
                "items_per_page must be > 0".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(ClientError::InvalidConfig(
                "request_timeout must be > 0".to_string(),
            ));
        }

        if self.degraded_after_failures == 0 {
            return Err(ClientError::InvalidConfig(
                "degraded_after_failures must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self::new("http://localhost:3000/api")
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ConfigFile {
    base_url: Option<String>,
    request_timeout_ms: Option<u64>,
    items_per_page: Option<u32>,
    worker_cache_ttl_ms: Option<u64>,
    prefetch: Option<bool>,
    prefetch_delay_ms: Option<u64>,
    degraded_after_failures: Option<u32>,
    token_path: Option<PathBuf>,
}

impl ConfigFile {
    fn into_config(self) -> DashboardConfig {
        let mut config = match &self.base_url {
            Some(url) => DashboardConfig::new(url),
            None => DashboardConfig::default(),
        };
        if let Some(ms) = self.request_timeout_ms {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(items) = self.items_per_page {
            config.items_per_page = items;
        }
        if let Some(ms) = self.worker_cache_ttl_ms {
            config.worker_cache_ttl = Duration::from_millis(ms);
        }
        if let Some(enabled) = self.prefetch {
            config.prefetch = enabled;
        }
        if let Some(ms) = self.prefetch_delay_ms {
            config.prefetch_delay = Duration::from_millis(ms);
        }
        if let Some(failures) = self.degraded_after_failures {
            config.degraded_after_failures = failures;
        }
        config.token_path = self.token_path;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = DashboardConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.items_per_page, 10);
        assert_eq!(config.worker_cache_ttl, Duration::from_secs(1800));
        assert_eq!(config.degraded_after_failures, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = DashboardConfig::new("https://ops.example.com/api")
            .items_per_page(25)
            .prefetch(false)
            .request_timeout(Duration::from_secs(5))
            .token_path("/tmp/token.json");

        assert_eq!(config.items_per_page, 25);
        assert!(!config.prefetch);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.token_path, Some(PathBuf::from("/tmp/token.json")));
    }

    #[test]
    fn test_validate() {
        assert!(DashboardConfig::new("ftp://host").validate().is_err());
        assert!(DashboardConfig::default().items_per_page(0).validate().is_err());
        assert!(
            DashboardConfig::default()
                .request_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            DashboardConfig::default()
                .degraded_after_failures(0)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_from_json_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("opsboard.json");
        std::fs::write(
            &path,
            r#"{"baseUrl": "https://ops.example.com/api", "itemsPerPage": 50, "prefetchDelayMs": 100}"#,
        )
        .unwrap();

        let config = DashboardConfig::from_json_file(&path).unwrap();
        assert_eq!(config.base_url, "https://ops.example.com/api");
        assert_eq!(config.items_per_page, 50);
        assert_eq!(config.prefetch_delay, Duration::from_millis(100));
        assert_eq!(config.request_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_from_json_file_rejects_invalid_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("opsboard.json");
        std::fs::write(&path, r#"{"itemsPerPage": 0}"#).unwrap();
        assert!(matches!(
            DashboardConfig::from_json_file(&path),
            Err(ClientError::InvalidConfig(_))
        ));
    }
}

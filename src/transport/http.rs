use super::health::ServiceHealth;
use super::{ApiRequest, HttpMethod, Transport};
use crate::config::DashboardConfig;
use crate::core::{ClientError, Result};
use crate::session::Session;
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::Instrument;

/// `reqwest`-backed transport.
///
/// Attaches the session's bearer token to every request, enforces the
/// configured timeout, forces a logout on `401` and feeds network/5xx
/// outcomes into [`ServiceHealth`].
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    session: Arc<Session>,
    health: Arc<ServiceHealth>,
}

impl HttpTransport {
    pub fn new(
        config: &DashboardConfig,
        session: Arc<Session>,
        health: Arc<ServiceHealth>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| ClientError::InvalidConfig(format!("HTTP client: {}", err)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session,
            health,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn execute(&self, request: ApiRequest) -> Result<JsonValue> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .client
            .request(method, self.url(&request.path))
            .query(&request.query);
        if let Some(token) = self.session.token() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => {
                let err = ClientError::from(err);
                self.health.record_failure();
                warn!("request failed: {} {} error='{}'", request.method, request.path, err);
                return Err(err);
            }
        };

        let status = response.status();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                let err = ClientError::from(err);
                if err.is_service_failure() {
                    self.health.record_failure();
                }
                return Err(err);
            }
        };

        if status == reqwest::StatusCode::UNAUTHORIZED {
            warn!("session rejected by backend, logging out");
            if let Err(err) = self.session.logout().await {
                warn!("forced logout could not clear the token: {}", err);
            }
            return Err(ClientError::Unauthorized(error_message(&bytes, status)));
        }

        if !status.is_success() {
            let err = ClientError::from_status(status.as_u16(), error_message(&bytes, status));
            if err.is_service_failure() {
                self.health.record_failure();
            } else {
                self.health.record_success();
            }
            return Err(err);
        }

        self.health.record_success();
        debug!("{} {} -> {}", request.method, request.path, status.as_u16());

        if bytes.is_empty() {
            return Ok(JsonValue::Null);
        }
        serde_json::from_slice(&bytes).map_err(ClientError::from)
    }
}

/// Prefers the backend's `message`/`error` field over the raw body.
fn error_message(bytes: &[u8], status: reqwest::StatusCode) -> String {
    if let Ok(JsonValue::Object(body)) = serde_json::from_slice::<JsonValue>(bytes) {
        for field in ["message", "error"] {
            if let Some(JsonValue::String(message)) = body.get(field) {
                return message.clone();
            }
        }
    }
    let text = String::from_utf8_lossy(bytes).trim().to_string();
    if text.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        text
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<JsonValue> {
        let span = tracing::info_span!(
            "api_request",
            method = %request.method,
            path = %request.path
        );
        self.execute(request).instrument(span).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_json_fields() {
        let status = reqwest::StatusCode::BAD_REQUEST;
        assert_eq!(error_message(br#"{"message":"bad filter"}"#, status), "bad filter");
        assert_eq!(error_message(br#"{"error":"nope"}"#, status), "nope");
        assert_eq!(error_message(b"plain", status), "plain");
        assert_eq!(error_message(b"", status), "Bad Request");
    }
}

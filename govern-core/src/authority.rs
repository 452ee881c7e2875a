//! Client for the remote governance service (the primary authority).
//!
//! Every call ends in one of three ways:
//! - success: the parsed body is returned and the service is marked reachable;
//! - rejected: the service answered with a non-success status. It stays
//!   marked reachable, the body is logged, and the caller gets `None`;
//! - unreachable: connection failure, timeout, or an unparseable payload.
//!   The liveness flag flips to false and the caller gets `None`.
//!
//! `None` therefore means either "no such record" or "service down"; callers
//! tell them apart through [`Authority::is_available`]. Once the flag is false
//! every call short-circuits to `None` without touching the network, until
//! [`Authority::probe`] sees the service answer again.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use govern_common::config::ApiConfig;
use govern_common::{Error, Result};
use reqwest::Method;
use serde_json::Value;

use crate::record::{DecisionPatch, GovernanceRequest, RequestStatus};

/// Filters for listing remote requests. Absent filters are omitted from the query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteFilter {
    pub status: Option<RequestStatus>,
    pub requester: Option<String>,
    pub limit: Option<usize>,
}

impl RemoteFilter {
    pub fn status(status: RequestStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(status) = self.status {
            pairs.push(("status", status.as_str().to_string()));
        }
        if let Some(requester) = self.requester.as_ref().filter(|r| !r.is_empty()) {
            pairs.push(("requester", requester.clone()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        pairs
    }
}

/// Typed operations against the primary authority.
#[async_trait]
pub trait Authority: Send + Sync {
    /// Whether the last observed call reached the service.
    fn is_available(&self) -> bool;

    /// Create a record. Returns the service's response body.
    async fn submit(&self, record: &GovernanceRequest) -> Option<Value>;

    async fn fetch(&self, request_id: &str) -> Option<GovernanceRequest>;

    /// Apply a partial update. Returns the service's response body.
    async fn update(&self, request_id: &str, patch: &DecisionPatch) -> Option<Value>;

    async fn list(&self, filter: &RemoteFilter) -> Option<Vec<GovernanceRequest>>;

    /// Re-test reachability with a cheap listing, ignoring the liveness flag.
    async fn probe(&self) -> bool;
}

/// How a single call failed.
#[derive(Debug)]
enum CallFailure {
    Rejected { status: u16, body: Value },
    Unreachable(String),
}

/// HTTP implementation of [`Authority`].
pub struct HttpAuthority {
    requests_url: String,
    client: reqwest::Client,
    available: AtomicBool,
}

impl HttpAuthority {
    /// Create a client from the API configuration.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self::with_client(&config.requests_url(), client))
    }

    /// Create a client with a custom reqwest client.
    ///
    /// `requests_url` is the full collection URL including the governance sub-path.
    pub fn with_client(requests_url: &str, client: reqwest::Client) -> Self {
        Self {
            requests_url: requests_url.trim_end_matches('/').to_string(),
            client,
            available: AtomicBool::new(true),
        }
    }

    /// Start out marked unreachable (offline mode).
    pub fn offline(self) -> Self {
        self.available.store(false, Ordering::SeqCst);
        self
    }

    pub fn requests_url(&self) -> &str {
        &self.requests_url
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        query: &[(&'static str, String)],
    ) -> std::result::Result<Value, CallFailure> {
        let url = format!("{}{}", self.requests_url, path);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(reqwest::header::ACCEPT, "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        tracing::debug!(%method, %url, "Governance API call");

        let response = request
            .send()
            .await
            .map_err(|e| CallFailure::Unreachable(e.to_string()))?;
        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| CallFailure::Unreachable(e.to_string()))?;

        if !status.is_success() {
            let body = serde_json::from_str(&raw).unwrap_or_else(|_| {
                serde_json::json!({
                    "error": status.canonical_reason().unwrap_or("error"),
                    "status": status.as_u16(),
                    "body": raw,
                })
            });
            return Err(CallFailure::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        if raw.trim().is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(&raw)
            .map_err(|e| CallFailure::Unreachable(format!("malformed response payload: {e}")))
    }

    /// Run a call and fold its outcome into the liveness flag.
    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        query: &[(&'static str, String)],
    ) -> Option<Value> {
        let label = format!("{method} {}{path}", self.requests_url);
        match self.send(method, path, body, query).await {
            Ok(value) => {
                self.available.store(true, Ordering::SeqCst);
                Some(value)
            }
            Err(CallFailure::Rejected { status, body }) => {
                self.available.store(true, Ordering::SeqCst);
                tracing::warn!(status, call = %label, body = %body, "Governance API rejected the call");
                None
            }
            Err(CallFailure::Unreachable(reason)) => {
                self.mark_unreachable(&label, &reason);
                None
            }
        }
    }

    fn mark_unreachable(&self, label: &str, reason: &str) {
        self.available.store(false, Ordering::SeqCst);
        tracing::warn!(call = %label, reason, "Governance API unreachable, falling back to local mirror");
    }

    fn short_circuit(&self, op: &str) -> bool {
        if self.is_available() {
            return false;
        }
        tracing::debug!(op, "Governance API marked unreachable, skipping call");
        true
    }

    fn parse_record(&self, label: &str, value: Value) -> Option<GovernanceRequest> {
        match serde_json::from_value::<GovernanceRequest>(value) {
            Ok(record) => Some(record),
            Err(e) => {
                self.mark_unreachable(label, &format!("malformed record: {e}"));
                None
            }
        }
    }
}

#[async_trait]
impl Authority for HttpAuthority {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn submit(&self, record: &GovernanceRequest) -> Option<Value> {
        if self.short_circuit("submit") {
            return None;
        }
        let body = serde_json::to_value(record.without_annotations()).ok()?;
        self.call(Method::POST, "", Some(body), &[]).await
    }

    async fn fetch(&self, request_id: &str) -> Option<GovernanceRequest> {
        if self.short_circuit("fetch") {
            return None;
        }
        let path = format!("/{request_id}");
        let value = self.call(Method::GET, &path, None, &[]).await?;
        if value.as_object().is_some_and(|obj| obj.is_empty()) {
            return None;
        }
        self.parse_record(&format!("GET {path}"), value)
    }

    async fn update(&self, request_id: &str, patch: &DecisionPatch) -> Option<Value> {
        if self.short_circuit("update") {
            return None;
        }
        let body = serde_json::to_value(patch).ok()?;
        self.call(Method::PATCH, &format!("/{request_id}"), Some(body), &[])
            .await
    }

    async fn list(&self, filter: &RemoteFilter) -> Option<Vec<GovernanceRequest>> {
        if self.short_circuit("list") {
            return None;
        }
        let value = self
            .call(Method::GET, "", None, &filter.query_pairs())
            .await?;
        Some(normalize_listing(value))
    }

    async fn probe(&self) -> bool {
        let filter = RemoteFilter {
            limit: Some(1),
            ..RemoteFilter::default()
        };
        self.call(Method::GET, "", None, &filter.query_pairs()).await;
        self.is_available()
    }
}

/// Accept either a bare array or an object wrapping it under `requests` or `data`.
fn normalize_listing(value: Value) -> Vec<GovernanceRequest> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("requests").or_else(|| obj.remove("data")) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<GovernanceRequest>(item) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed record in remote listing");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_pairs_omit_absent_filters() {
        assert!(RemoteFilter::default().query_pairs().is_empty());

        let filter = RemoteFilter {
            status: Some(RequestStatus::Pending),
            requester: Some(String::new()),
            limit: Some(1),
        };
        assert_eq!(
            filter.query_pairs(),
            vec![("status", "pending".to_string()), ("limit", "1".to_string())]
        );
    }

    #[test]
    fn test_normalize_listing_shapes() {
        let bare = json!([{ "request_id": "GR-1" }, { "request_id": "GR-2" }]);
        assert_eq!(normalize_listing(bare).len(), 2);

        let wrapped = json!({ "requests": [{ "request_id": "GR-1" }] });
        assert_eq!(normalize_listing(wrapped)[0].request_id, "GR-1");

        let data = json!({ "data": [{ "request_id": "GR-3" }], "total": 1 });
        assert_eq!(normalize_listing(data)[0].request_id, "GR-3");

        assert!(normalize_listing(json!({ "total": 0 })).is_empty());
        assert!(normalize_listing(json!("nope")).is_empty());
    }

    #[test]
    fn test_normalize_listing_skips_bad_entries() {
        let listing = json!([{ "request_id": "GR-1" }, { "status": "not-a-status" }]);
        let records = normalize_listing(listing);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_url_normalization() {
        let client = HttpAuthority::with_client(
            "http://localhost:23000/api/v1/governance/requests/",
            reqwest::Client::new(),
        );
        assert_eq!(
            client.requests_url(),
            "http://localhost:23000/api/v1/governance/requests"
        );
        assert!(client.is_available());
        assert!(!client.offline().is_available());
    }
}

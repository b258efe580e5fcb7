//! Transport abstraction for authenticated API calls
//!
//! Defines the `Transport` trait that decouples the auth pipeline from the
//! HTTP client. `ReqwestTransport` is the production implementation; tests
//! substitute scripted transports to observe exactly which calls were made.
//!
//! A transport issues one HTTP exchange per `send` and never retries. Request
//! bodies are replayable snapshots (`RequestBody` is `Clone`) so the caller
//! can re-send the same payload after renewing credentials.

pub mod reqwest_transport;

pub use reqwest_transport::ReqwestTransport;

use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub use reqwest::header;
pub use reqwest::{Method, StatusCode};

/// One part of a multipart/form-data body.
#[derive(Debug, Clone)]
pub struct MultipartPart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: String,
    pub data: Bytes,
}

/// Request payload. Cloning is cheap (`Bytes` and JSON values) and yields an
/// identical payload, which is what makes a request replayable.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Raw {
        content_type: String,
        data: Bytes,
    },
    Multipart(Vec<MultipartPart>),
}

/// An outbound API request.
///
/// `url` is either absolute or a path relative to the client's base URL;
/// the dispatcher resolves it before the request reaches a transport.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
    /// Per-request timeout; `None` uses the transport default
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Token carried in `Authorization: Bearer <token>`, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }
}

/// A response from the server, whatever its status.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Build a response with a JSON body (used by transports and test doubles).
    pub fn json(status: StatusCode, body: &serde_json::Value) -> Self {
        Self::new(status, body.to_string())
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// Transport-level failure: no HTTP response was received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// DNS failure, refused or reset connection, unreadable response
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),
}

/// Result of a single transport exchange.
pub type TransportResult = std::result::Result<ApiResponse, TransportError>;

/// Issues exactly one HTTP exchange per call.
///
/// Implementations are stateless from the pipeline's point of view and must
/// be safe to call concurrently. Uses `Pin<Box<dyn Future>>` return types for
/// dyn-compatibility (`Arc<dyn Transport>`).
pub trait Transport: Send + Sync {
    fn send(&self, request: ApiRequest) -> Pin<Box<dyn Future<Output = TransportResult> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_reads_authorization_header() {
        let request = ApiRequest::get("/resource").with_header(
            AUTHORIZATION,
            HeaderValue::from_static("Bearer at_1"),
        );
        assert_eq!(request.bearer_token(), Some("at_1"));
    }

    #[test]
    fn bearer_token_ignores_other_schemes() {
        let request = ApiRequest::get("/resource")
            .with_header(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(request.bearer_token(), None);
        assert_eq!(ApiRequest::get("/resource").bearer_token(), None);
    }

    #[test]
    fn cloned_request_carries_identical_body() {
        let request = ApiRequest::post("/notations").with_json(serde_json::json!({"pgn": "1. e4"}));
        let replay = request.clone();
        match (request.body, replay.body) {
            (RequestBody::Json(a), RequestBody::Json(b)) => assert_eq!(a, b),
            other => panic!("unexpected bodies: {other:?}"),
        }
    }

    #[test]
    fn response_decodes_json_body() {
        let response = ApiResponse::json(StatusCode::OK, &serde_json::json!({"id": 7}));
        let value: serde_json::Value = response.decode().unwrap();
        assert_eq!(value["id"], 7);
        assert!(response.is_success());
    }

    #[test]
    fn transport_error_display() {
        assert_eq!(
            TransportError::Timeout("after 15s".into()).to_string(),
            "request timed out: after 15s"
        );
        assert!(
            TransportError::Network("connection refused".into())
                .to_string()
                .contains("connection refused")
        );
    }
}

//! Scripted in-process transport for pipeline tests.
//!
//! Behaves like a small API server: protected paths answer 200 only for the
//! currently valid access token, and the refresh path mints a new token
//! according to the configured `RefreshBehavior`. Every request is recorded.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use transport::{ApiRequest, ApiResponse, StatusCode, Transport, TransportError, TransportResult};

pub const REFRESH_PATH: &str = "/auth/refresh";
pub const BASE_URL: &str = "http://api.test";

#[derive(Debug, Clone)]
pub enum RefreshBehavior {
    /// 200 `{"access_token": token}`
    Issue(String),
    /// 200 `{"code": 200, "data": {"access_token": token}}`
    IssueEnveloped(String),
    /// Non-2xx with a message body
    Reject(u16),
    /// 200 with a body that carries no token
    Garbage,
    /// Transport-level failure
    Unreachable,
    /// Never answers
    Hang,
}

pub struct ScriptedTransport {
    valid_token: Mutex<String>,
    refresh_token: String,
    refresh: RefreshBehavior,
    refresh_delay: Duration,
    calls: Mutex<Vec<ApiRequest>>,
    refresh_in_flight: AtomicUsize,
    max_refresh_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    /// Server that accepts `valid_token` and renews with refresh token `rt_1`.
    pub fn new(valid_token: &str, refresh: RefreshBehavior) -> Self {
        Self {
            valid_token: Mutex::new(valid_token.to_string()),
            refresh_token: "rt_1".to_string(),
            refresh,
            refresh_delay: Duration::from_millis(50),
            calls: Mutex::new(Vec::new()),
            refresh_in_flight: AtomicUsize::new(0),
            max_refresh_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<ApiRequest> {
        self.calls()
            .into_iter()
            .filter(|r| path_of(&r.url) == path)
            .collect()
    }

    pub fn refresh_calls(&self) -> usize {
        self.calls_to(REFRESH_PATH).len()
    }

    pub fn max_concurrent_refreshes(&self) -> usize {
        self.max_refresh_in_flight.load(Ordering::SeqCst)
    }

    async fn respond(&self, request: ApiRequest) -> TransportResult {
        self.calls.lock().unwrap().push(request.clone());
        let path = path_of(&request.url).to_string();

        if path == REFRESH_PATH {
            return self.respond_refresh(&request).await;
        }

        if path == "/always-401" {
            return Ok(unauthorized());
        }
        if path == "/unreachable" {
            return Err(TransportError::Network("connection refused".into()));
        }

        let valid = self.valid_token.lock().unwrap().clone();
        if request.bearer_token() != Some(valid.as_str()) {
            return Ok(unauthorized());
        }

        let body = match &request.body {
            transport::RequestBody::Json(value) => value.clone(),
            _ => serde_json::Value::Null,
        };
        Ok(ApiResponse::json(
            StatusCode::OK,
            &json!({
                "path": path,
                "method": request.method.as_str(),
                "token": request.bearer_token(),
                "body": body,
            }),
        ))
    }

    async fn respond_refresh(&self, request: &ApiRequest) -> TransportResult {
        let now = self.refresh_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_refresh_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.refresh_delay).await;
        let result = self.refresh_outcome(request).await;
        self.refresh_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn refresh_outcome(&self, request: &ApiRequest) -> TransportResult {
        if request.bearer_token() != Some(self.refresh_token.as_str()) {
            return Ok(unauthorized());
        }
        match self.refresh.clone() {
            RefreshBehavior::Issue(token) => {
                *self.valid_token.lock().unwrap() = token.clone();
                Ok(ApiResponse::json(StatusCode::OK, &json!({ "access_token": token })))
            }
            RefreshBehavior::IssueEnveloped(token) => {
                *self.valid_token.lock().unwrap() = token.clone();
                Ok(ApiResponse::json(
                    StatusCode::OK,
                    &json!({ "code": 200, "message": "ok", "data": { "access_token": token } }),
                ))
            }
            RefreshBehavior::Reject(status) => Ok(ApiResponse::json(
                StatusCode::from_u16(status).unwrap(),
                &json!({ "message": "refresh token revoked" }),
            )),
            RefreshBehavior::Garbage => Ok(ApiResponse::new(StatusCode::OK, "<html></html>")),
            RefreshBehavior::Unreachable => {
                Err(TransportError::Network("connection reset".into()))
            }
            RefreshBehavior::Hang => std::future::pending().await,
        }
    }
}

impl Transport for ScriptedTransport {
    fn send(
        &self,
        request: ApiRequest,
    ) -> Pin<Box<dyn Future<Output = TransportResult> + Send + '_>> {
        Box::pin(self.respond(request))
    }
}

fn unauthorized() -> ApiResponse {
    ApiResponse::json(
        StatusCode::UNAUTHORIZED,
        &json!({ "msg": "Token has expired" }),
    )
}

fn path_of(url: &str) -> &str {
    let without_base = url.strip_prefix(BASE_URL).unwrap_or(url);
    without_base.split('?').next().unwrap_or(without_base)
}

//! Request dispatcher
//!
//! Every call goes interceptor -> transport -> classifier. A 401 on the first
//! attempt triggers one credential renewal through the shared
//! `RefreshCoordinator` and one replay. A 401 on the replay ends the session.
//! Requests to the refresh endpoint itself are never renewed.
//!
//! If the store already holds a different access token than the one the
//! failed attempt carried, another caller renewed the session while this
//! request was in flight; the replay goes out with the newer token without
//! starting another refresh.

use std::sync::Arc;

use common::Secret;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use session_auth::{CredentialStore, parse_token_pair};
use tracing::{Instrument, debug, info, info_span, warn};
use transport::{ApiRequest, ApiResponse, Transport};

use crate::classify::classify;
use crate::config::{ClientConfig, UploadPolicy};
use crate::error::{ApiError, Result};
use crate::interceptor::AuthInterceptor;
use crate::metrics;
use crate::refresh::RefreshCoordinator;
use crate::upload::{FileUpload, validate};

pub struct ApiClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    credentials: Arc<CredentialStore>,
    interceptor: AuthInterceptor,
    refresher: RefreshCoordinator,
}

impl ApiClient {
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        credentials: Arc<CredentialStore>,
    ) -> Self {
        let refresher = RefreshCoordinator::new(
            transport.clone(),
            credentials.clone(),
            config.refresh_url(),
            config.refresh_timeout,
        );
        Self {
            interceptor: AuthInterceptor::new(credentials.clone()),
            config,
            transport,
            credentials,
            refresher,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Send `request` with credential handling.
    ///
    /// Relative URLs are resolved against the configured base URL and the
    /// default timeout applies when the request doesn't carry one.
    pub async fn execute(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        request.url = self.config.resolve_url(&request.url);
        request.timeout.get_or_insert(self.config.timeout);

        let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
        let span = info_span!(
            "api_request",
            request_id = %request_id,
            method = %request.method,
            url = %request.url,
        );

        let result = self.dispatch(request).instrument(span).await;
        metrics::record_request(&result);
        result
    }

    async fn dispatch(&self, request: ApiRequest) -> Result<ApiResponse> {
        let is_refresh_call = self.is_refresh_endpoint(&request.url);
        let (result, sent_token) = self.attempt(request.clone()).await;

        match result {
            Ok(response) => {
                debug!(status = response.status.as_u16(), "request succeeded");
                return Ok(response);
            }
            Err(ApiError::AuthExpired { message, .. }) if is_refresh_call => {
                return Err(self.end_session(message).await);
            }
            Err(ApiError::AuthExpired { .. }) => {}
            Err(e) => {
                debug!(kind = e.kind().label(), error = %e, "request failed");
                return Err(e);
            }
        }

        let renewed_elsewhere = match self.credentials.access_token().await {
            Some(current) => sent_token.as_ref() != Some(&current),
            None => false,
        };
        if renewed_elsewhere {
            debug!("access token changed while request was in flight, replaying");
        } else {
            info!("access token rejected, refreshing");
            self.refresher.refresh().await?;
        }

        metrics::record_replay();
        let (result, _) = self.attempt(request).await;
        match result {
            Err(ApiError::AuthExpired { message, .. }) => Err(self.end_session(message).await),
            other => other,
        }
    }

    /// One interceptor + transport + classifier pass. Also returns the
    /// access token the request actually carried.
    async fn attempt(&self, request: ApiRequest) -> (Result<ApiResponse>, Option<Secret<String>>) {
        let prepared = self.interceptor.prepare(request).await;
        let sent_token = prepared.bearer_token().map(Secret::from);
        (classify(self.transport.send(prepared).await), sent_token)
    }

    async fn end_session(&self, message: String) -> ApiError {
        warn!("authentication rejected, ending session");
        // clear() drops in-memory tokens even when persisting fails, and logs it
        let _ = self.credentials.clear().await;
        ApiError::AuthExpired {
            message,
            session_ended: true,
        }
    }

    /// Compares without query string, fragment or trailing slash.
    fn is_refresh_endpoint(&self, url: &str) -> bool {
        fn normalize(url: &str) -> &str {
            let end = url.find(['?', '#']).unwrap_or(url.len());
            url[..end].trim_end_matches('/')
        }
        normalize(url) == normalize(self.refresher.refresh_url())
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.execute(ApiRequest::get(path)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<ApiResponse> {
        self.execute(ApiRequest::post(path).with_json(body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<ApiResponse> {
        self.execute(ApiRequest::put(path).with_json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.execute(ApiRequest::delete(path)).await
    }

    /// Execute and decode a JSON response body.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let response = self.execute(request).await?;
        response.decode().map_err(|e| ApiError::Unknown {
            status: response.status.as_u16(),
            message: format!("invalid response body: {e}"),
        })
    }

    /// Upload a file as multipart field `file` under the configured policy.
    pub async fn upload(&self, path: &str, file: FileUpload) -> Result<ApiResponse> {
        self.upload_with(path, file, &self.config.upload).await
    }

    /// Upload under an explicit policy. Nothing is sent if validation fails.
    pub async fn upload_with(
        &self,
        path: &str,
        file: FileUpload,
        policy: &UploadPolicy,
    ) -> Result<ApiResponse> {
        if let Err(e) = validate(&file, policy) {
            warn!(file_name = %file.file_name, error = %e, "upload rejected before sending");
            let result = Err(e);
            metrics::record_request(&result);
            return result;
        }
        debug!(file_name = %file.file_name, size = file.size(), "uploading file");
        self.execute(ApiRequest::post(path).with_body(file.into_body())).await
    }

    /// Authenticate with email and password and store the issued tokens.
    ///
    /// The login call bypasses the interceptor and renewal logic. A response
    /// without a refresh token starts a session that ends at the first expiry.
    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        let request = ApiRequest::post(self.config.resolve_url(&self.config.login_path))
            .with_json(json!({ "email": email, "password": password }))
            .with_timeout(self.config.timeout);

        let result = classify(self.transport.send(request).await);
        metrics::record_request(&result);
        let response = result?;

        let pair = parse_token_pair(&response.body).map_err(|e| ApiError::Unknown {
            status: response.status.as_u16(),
            message: e.to_string(),
        })?;

        let stored = match pair.refresh_token {
            Some(refresh) => self.credentials.set(pair.access_token, refresh).await,
            None => {
                warn!("login response carried no refresh token, session cannot be renewed");
                match self.credentials.clear().await {
                    Ok(()) => self.credentials.set_access(pair.access_token).await,
                    Err(e) => Err(e),
                }
            }
        };
        stored.map_err(|e| ApiError::Storage(e.to_string()))?;
        info!("logged in");
        Ok(())
    }

    /// End the session. The server is told best-effort; local credentials
    /// are cleared whatever it answers.
    pub async fn logout(&self) -> Result<()> {
        if self.credentials.is_logged_in().await {
            let request = ApiRequest::post(self.config.resolve_url(&self.config.logout_path))
                .with_timeout(self.config.timeout);
            let request = self.interceptor.prepare(request).await;
            if let Err(e) = classify(self.transport.send(request).await) {
                debug!(error = %e, "server-side logout failed, clearing local session anyway");
            }
        }
        self.credentials
            .clear()
            .await
            .map_err(|e| ApiError::Storage(e.to_string()))?;
        info!("logged out");
        Ok(())
    }
}

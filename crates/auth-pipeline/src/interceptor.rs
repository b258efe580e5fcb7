//! Outbound credential attachment
//!
//! Runs immediately before every transport call, replays included, so each
//! attempt carries whatever access token the store holds at that moment.

use std::sync::Arc;

use session_auth::CredentialStore;
use tracing::warn;
use transport::ApiRequest;
use transport::header::{AUTHORIZATION, HeaderValue};

pub struct AuthInterceptor {
    credentials: Arc<CredentialStore>,
}

impl AuthInterceptor {
    pub fn new(credentials: Arc<CredentialStore>) -> Self {
        Self { credentials }
    }

    /// Attach `Authorization: Bearer <access token>` when logged in,
    /// replacing any caller-supplied value. Without a token the request is
    /// returned untouched.
    pub async fn prepare(&self, mut request: ApiRequest) -> ApiRequest {
        let Some(token) = self.credentials.access_token().await else {
            return request;
        };

        match HeaderValue::from_str(&format!("Bearer {}", token.as_str())) {
            Ok(mut value) => {
                value.set_sensitive(true);
                request.headers.insert(AUTHORIZATION, value);
            }
            Err(e) => {
                warn!(error = %e, "stored access token is not a valid header value, sending without it");
            }
        }
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transport::header::HeaderName;

    #[tokio::test]
    async fn attaches_bearer_token() {
        let store = Arc::new(CredentialStore::in_memory());
        store.set("at_1".into(), "rt_1".into()).await.unwrap();
        let interceptor = AuthInterceptor::new(store);

        let prepared = interceptor.prepare(ApiRequest::get("/resource")).await;

        assert_eq!(prepared.bearer_token(), Some("at_1"));
        assert!(prepared.headers.get(AUTHORIZATION).unwrap().is_sensitive());
    }

    #[tokio::test]
    async fn overwrites_caller_authorization() {
        let store = Arc::new(CredentialStore::in_memory());
        store.set("at_2".into(), "rt_1".into()).await.unwrap();
        let interceptor = AuthInterceptor::new(store);

        let request = ApiRequest::get("/resource")
            .with_header(AUTHORIZATION, HeaderValue::from_static("Bearer caller-token"));
        let prepared = interceptor.prepare(request).await;

        assert_eq!(prepared.bearer_token(), Some("at_2"));
        assert_eq!(prepared.headers.get_all(AUTHORIZATION).iter().count(), 1);
    }

    #[tokio::test]
    async fn leaves_request_untouched_when_logged_out() {
        let interceptor = AuthInterceptor::new(Arc::new(CredentialStore::in_memory()));

        let request = ApiRequest::get("/resource")
            .with_header(
                HeaderName::from_static("x-trace"),
                HeaderValue::from_static("abc"),
            )
            .with_header(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        let prepared = interceptor.prepare(request).await;

        assert_eq!(prepared.headers.get("x-trace").unwrap(), "abc");
        assert_eq!(prepared.headers.get(AUTHORIZATION).unwrap(), "Basic dXNlcg==");
    }

    #[tokio::test]
    async fn reads_latest_token_on_each_call() {
        let store = Arc::new(CredentialStore::in_memory());
        store.set("at_1".into(), "rt_1".into()).await.unwrap();
        let interceptor = AuthInterceptor::new(store.clone());
        let request = ApiRequest::get("/resource");

        let first = interceptor.prepare(request.clone()).await;
        store.set_access("at_2".into()).await.unwrap();
        let second = interceptor.prepare(request).await;

        assert_eq!(first.bearer_token(), Some("at_1"));
        assert_eq!(second.bearer_token(), Some("at_2"));
    }
}

//! Authenticated request pipeline
//!
//! Wraps a `Transport` so every call carries the current access token, is
//! classified into a closed error taxonomy, and survives access-token expiry
//! through one shared refresh and at most one replay.
//!
//! Request lifecycle:
//! 1. `ApiClient::execute()` resolves the URL and assigns a request id
//! 2. `AuthInterceptor` attaches `Authorization: Bearer <access token>`
//! 3. The transport performs the exchange and `classify()` maps the result
//! 4. On a first 401, `RefreshCoordinator` renews the token (single-flight)
//!    and the request is replayed once; a second 401 clears the session

pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod metrics;
pub mod refresh;
pub mod upload;

#[cfg(test)]
mod testing;

pub use classify::{classify, classify_status, default_message};
pub use client::ApiClient;
pub use config::{ClientConfig, UploadPolicy};
pub use error::{ApiError, ErrorKind, FieldError, RefreshFailure, Result};
pub use interceptor::AuthInterceptor;
pub use refresh::{RefreshCoordinator, RefreshOutcome};
pub use upload::{FileUpload, validate};

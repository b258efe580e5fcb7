//! Client settings
//!
//! Plain values with working defaults. Loading them from a file or the
//! environment is the embedding application's job.

use std::time::Duration;

use serde::Deserialize;
use session_auth::{DEFAULT_LOGIN_PATH, DEFAULT_LOGOUT_PATH, DEFAULT_REFRESH_PATH};

pub const DEFAULT_BASE_URL: &str = "http://localhost:5001/api";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 5 * 1024 * 1024;
pub const DEFAULT_ALLOWED_TYPES: &[&str] = &["image/jpeg", "image/png"];

/// Limits applied to file uploads before anything is sent.
///
/// Deserializes from an `[upload]` table; omitted fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UploadPolicy {
    /// Accepted MIME types. Empty accepts any type.
    pub allowed_types: Vec<String>,
    pub max_size_bytes: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            allowed_types: DEFAULT_ALLOWED_TYPES.iter().map(|t| t.to_string()).collect(),
            max_size_bytes: DEFAULT_MAX_UPLOAD_SIZE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Prefix for relative request paths
    pub base_url: String,
    /// Applied to requests that don't set their own
    pub timeout: Duration,
    /// Refresh endpoint, relative to `base_url` unless absolute
    pub refresh_path: String,
    /// Bounds one refresh exchange; waiters are released when it elapses
    pub refresh_timeout: Duration,
    pub login_path: String,
    pub logout_path: String,
    pub upload: UploadPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            refresh_timeout: DEFAULT_TIMEOUT,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            logout_path: DEFAULT_LOGOUT_PATH.to_string(),
            upload: UploadPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Resolve a request path against `base_url`. Absolute http(s) URLs pass through.
    pub fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn refresh_url(&self) -> String {
        self.resolve_url(&self.refresh_path)
    }
}

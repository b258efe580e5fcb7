//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults. A missing file at
//! the default location is not an error; a missing file that was asked for
//! explicitly is.

use auth_pipeline::config::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use auth_pipeline::{ClientConfig, UploadPolicy};
use serde::Deserialize;
use session_auth::{DEFAULT_CREDENTIALS_FILE, DEFAULT_REFRESH_PATH};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "apictl.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub upload: UploadPolicy,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

/// Server connection settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    #[serde(default = "default_timeout")]
    pub refresh_timeout_secs: u64,
}

/// Where session tokens are kept between runs
#[derive(Debug, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default = "default_credentials_path")]
    pub path: PathBuf,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_refresh_path() -> String {
    DEFAULT_REFRESH_PATH.to_string()
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from(DEFAULT_CREDENTIALS_FILE)
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            refresh_path: default_refresh_path(),
            refresh_timeout_secs: default_timeout(),
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            path: default_credentials_path(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Environment overrides:
    /// - `API_BASE_URL`
    /// - `MAX_UPLOAD_SIZE` (bytes)
    /// - `ALLOWED_UPLOAD_TYPES` (comma-separated MIME types)
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.finish()
    }

    /// Like `load`, but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> common::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Config::default().finish()
        }
    }

    fn finish(mut self) -> common::Result<Self> {
        self.apply_env()?;
        self.validate()?;
        Ok(self)
    }

    fn apply_env(&mut self) -> common::Result<()> {
        if let Ok(url) = std::env::var("API_BASE_URL") {
            self.api.base_url = url;
        }

        if let Ok(size) = std::env::var("MAX_UPLOAD_SIZE") {
            let max_size = size.trim().parse::<u64>().map_err(|e| common::Error::InvalidValue {
                key: "MAX_UPLOAD_SIZE".into(),
                reason: format!("{e}"),
            })?;
            self.upload.max_size_bytes = max_size;
        }

        if let Ok(types) = std::env::var("ALLOWED_UPLOAD_TYPES") {
            self.upload.allowed_types = types
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(())
    }

    fn validate(&self) -> common::Result<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.api.refresh_timeout_secs == 0 {
            return Err(common::Error::Config(
                "refresh_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.upload.max_size_bytes == 0 {
            return Err(common::Error::Config(
                "max_size_bytes must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.api.timeout_secs),
            refresh_path: self.api.refresh_path.clone(),
            refresh_timeout: Duration::from_secs(self.api.refresh_timeout_secs),
            upload: self.upload.clone(),
            ..ClientConfig::new(self.api.base_url.clone())
        }
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }
}

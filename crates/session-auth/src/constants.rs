//! Fixed storage keys and default endpoint paths
//!
//! The key names match what the browser client persisted, so a store written
//! by either client reads back the same session.

/// Backing-store key for the access token
pub const ACCESS_TOKEN_KEY: &str = "token";

/// Backing-store key for the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Token renewal endpoint, relative to the API base URL
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";

/// Password login endpoint, relative to the API base URL
pub const DEFAULT_LOGIN_PATH: &str = "/auth/login";

/// Server-side session termination endpoint
pub const DEFAULT_LOGOUT_PATH: &str = "/auth/logout";

/// Default file name for the file-backed credential store
pub const DEFAULT_CREDENTIALS_FILE: &str = "credentials.json";

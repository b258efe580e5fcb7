//! Error types for credential storage and token exchange

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid token: {0}")]
    InvalidToken(String),
}

/// Result alias for credential operations.
pub type Result<T> = std::result::Result<T, Error>;

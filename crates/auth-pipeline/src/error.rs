//! Error taxonomy for pipeline calls
//!
//! Every non-success outcome carries a human-readable message: the server's
//! own message when the body supplied one, otherwise a per-kind default.

/// Per-field validation messages from a 422 body or a local upload check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub messages: Vec<String>,
}

/// Closed classification of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Timeout,
    BadRequest,
    AuthExpired,
    Forbidden,
    NotFound,
    Validation,
    ServerError,
    Unknown,
}

impl ErrorKind {
    /// Label for logging and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::AuthExpired => "auth_expired",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::ServerError => "server_error",
            ErrorKind::Unknown => "unknown",
        }
    }
}

/// Why a credential renewal did not produce a new access token.
///
/// Every waiter of one refresh cycle receives a clone of the same value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshFailure {
    #[error("no refresh token available, please log in again")]
    NoRefreshToken,

    #[error("session renewal rejected: {0}")]
    Rejected(String),

    /// The driving caller went away before the exchange settled
    #[error("session renewal was abandoned before completing")]
    Abandoned,

    /// The session was logged out or replaced while the exchange was in
    /// flight; its result was discarded and the stored session left alone
    #[error("session changed during renewal, please retry")]
    SessionChanged,
}

impl RefreshFailure {
    pub fn label(&self) -> &'static str {
        match self {
            RefreshFailure::NoRefreshToken => "no_refresh_token",
            RefreshFailure::Rejected(_) => "rejected",
            RefreshFailure::Abandoned => "abandoned",
            RefreshFailure::SessionChanged => "session_changed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Network(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    BadRequest(String),

    /// `session_ended` is set once the session has been torn down and the
    /// user must authenticate again
    #[error("{message}")]
    AuthExpired { message: String, session_ended: bool },

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    Validation {
        message: String,
        fields: Vec<FieldError>,
    },

    #[error("{message} ({status})")]
    ServerError { status: u16, message: String },

    #[error("{message} ({status})")]
    Unknown { status: u16, message: String },

    #[error(transparent)]
    Refresh(#[from] RefreshFailure),

    /// Session tokens could not be persisted
    #[error("failed to store session: {0}")]
    Storage(String),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Network(_) => ErrorKind::Network,
            ApiError::Timeout(_) => ErrorKind::Timeout,
            ApiError::BadRequest(_) => ErrorKind::BadRequest,
            ApiError::AuthExpired { .. } | ApiError::Refresh(_) => ErrorKind::AuthExpired,
            ApiError::Forbidden(_) => ErrorKind::Forbidden,
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::Validation { .. } => ErrorKind::Validation,
            ApiError::ServerError { .. } => ErrorKind::ServerError,
            ApiError::Unknown { .. } | ApiError::Storage(_) => ErrorKind::Unknown,
        }
    }

    /// Message suitable for showing to the user.
    pub fn message(&self) -> String {
        match self {
            ApiError::Network(m)
            | ApiError::Timeout(m)
            | ApiError::BadRequest(m)
            | ApiError::Forbidden(m)
            | ApiError::NotFound(m) => m.clone(),
            ApiError::AuthExpired { message, .. }
            | ApiError::Validation { message, .. }
            | ApiError::ServerError { message, .. }
            | ApiError::Unknown { message, .. } => message.clone(),
            ApiError::Refresh(_) | ApiError::Storage(_) => self.to_string(),
        }
    }

    /// True when the session is gone and re-authentication is required.
    ///
    /// Abandoned and superseded refreshes leave the stored credentials
    /// alone, so they don't count.
    pub fn session_ended(&self) -> bool {
        match self {
            ApiError::AuthExpired { session_ended, .. } => *session_ended,
            ApiError::Refresh(failure) => !matches!(
                failure,
                RefreshFailure::Abandoned | RefreshFailure::SessionChanged
            ),
            _ => false,
        }
    }

    /// HTTP status that produced this error, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::BadRequest(_) => Some(400),
            ApiError::AuthExpired { .. } => Some(401),
            ApiError::Forbidden(_) => Some(403),
            ApiError::NotFound(_) => Some(404),
            ApiError::Validation { .. } => Some(422),
            ApiError::ServerError { status, .. } | ApiError::Unknown { status, .. } => {
                Some(*status)
            }
            ApiError::Network(_)
            | ApiError::Timeout(_)
            | ApiError::Refresh(_)
            | ApiError::Storage(_) => None,
        }
    }
}

/// Result alias for pipeline calls.
pub type Result<T> = std::result::Result<T, ApiError>;

//! Response classification
//!
//! Maps one transport result to success or an `ApiError`. Classification is
//! pure: it never retries and never touches credentials. Message extraction
//! is best-effort; a body that isn't JSON, or JSON without a usable message,
//! degrades to the per-status default.

use serde_json::Value;
use transport::{ApiResponse, TransportError, TransportResult};

use crate::error::{ApiError, FieldError};

pub const NETWORK_MESSAGE: &str = "Network error, please check your connection";
pub const TIMEOUT_MESSAGE: &str = "Request timed out";
pub const VALIDATION_MESSAGE: &str = "Validation failed";

/// Field name used when a 422 body carries only a top-level message.
pub const GENERAL_FIELD: &str = "general";

/// Default user-facing message for a status code.
pub fn default_message(status: u16) -> String {
    let message = match status {
        400 => "Bad request",
        401 => "Unauthorized, please log in again",
        403 => "Access denied",
        404 => "Requested resource not found",
        408 => TIMEOUT_MESSAGE,
        422 => VALIDATION_MESSAGE,
        500 => "Internal server error",
        501 => "Not implemented",
        502 => "Bad gateway",
        503 => "Service unavailable",
        504 => "Gateway timeout",
        505 => "HTTP version not supported",
        other => return format!("Connection error ({other})"),
    };
    message.to_string()
}

/// Classify a transport result.
///
/// 2xx responses are returned unchanged.
pub fn classify(result: TransportResult) -> Result<ApiResponse, ApiError> {
    match result {
        Err(TransportError::Network(_)) => Err(ApiError::Network(NETWORK_MESSAGE.to_string())),
        Err(TransportError::Timeout(_)) => Err(ApiError::Timeout(TIMEOUT_MESSAGE.to_string())),
        Ok(response) if response.is_success() => Ok(response),
        Ok(response) => Err(classify_status(response.status.as_u16(), &response.body)),
    }
}

/// Classify a non-success status and its body.
pub fn classify_status(status: u16, body: &[u8]) -> ApiError {
    let parsed: Option<Value> = serde_json::from_slice(body).ok();
    let message = parsed
        .as_ref()
        .and_then(extract_message)
        .unwrap_or_else(|| default_message(status));

    match status {
        400 => ApiError::BadRequest(message),
        401 => ApiError::AuthExpired {
            message,
            session_ended: false,
        },
        403 => ApiError::Forbidden(message),
        404 => ApiError::NotFound(message),
        408 => ApiError::Timeout(message),
        422 => validation_error(parsed.as_ref(), message),
        500..=599 => ApiError::ServerError { status, message },
        _ => ApiError::Unknown { status, message },
    }
}

/// Pull a message out of a JSON error body.
///
/// Accepts `{"message": ".."}`, `{"error": {"message": ".."}}` and
/// `{"error": ".."}`, in that order. Empty strings don't count.
pub fn extract_message(body: &Value) -> Option<String> {
    let candidates = [
        body.get("message"),
        body.get("error").and_then(|e| e.get("message")),
        body.get("error"),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .find(|m| !m.trim().is_empty())
        .map(str::to_string)
}

fn validation_error(body: Option<&Value>, message: String) -> ApiError {
    let fields = body
        .and_then(|b| b.get("errors"))
        .and_then(Value::as_object)
        .map(|errors| {
            errors
                .iter()
                .filter_map(|(field, value)| {
                    let messages = field_messages(value);
                    (!messages.is_empty()).then(|| FieldError {
                        field: field.clone(),
                        messages,
                    })
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if fields.is_empty() {
        return ApiError::Validation {
            fields: vec![FieldError {
                field: GENERAL_FIELD.to_string(),
                messages: vec![message.clone()],
            }],
            message,
        };
    }

    // Without a top-level message, the first field message is the most useful summary
    let has_own_message = body.and_then(extract_message).is_some();
    let message = if has_own_message {
        message
    } else {
        fields[0].messages[0].clone()
    };
    ApiError::Validation { message, fields }
}

fn field_messages(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

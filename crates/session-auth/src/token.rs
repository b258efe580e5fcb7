//! Token endpoint requests and responses
//!
//! The refresh exchange authenticates with the refresh token as a bearer
//! credential and carries no body. Token responses arrive in two shapes, and
//! both are accepted:
//!
//! - flat: `{"access_token": "...", "refresh_token": "..."}`
//! - enveloped: `{"code": 200, "message": "...", "data": {"access_token": "..."}}`
//!
//! `token` is accepted as an alias of `access_token`.

use common::Secret;
use serde::Deserialize;
use transport::ApiRequest;
use transport::header::{AUTHORIZATION, HeaderValue};

use crate::error::{Error, Result};

#[derive(Debug, Default, Deserialize)]
struct TokenFields {
    #[serde(default, alias = "token")]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenEnvelope {
    #[serde(flatten)]
    flat: TokenFields,
    #[serde(default)]
    data: Option<TokenFields>,
}

/// Tokens returned by the login endpoint.
#[derive(Debug)]
pub struct TokenPair {
    pub access_token: Secret<String>,
    /// Absent when the server issues access tokens only
    pub refresh_token: Option<Secret<String>>,
}

/// Build the refresh exchange request for `url`.
///
/// Fails only if the refresh token can't be carried in a header.
pub fn refresh_request(url: impl Into<String>, refresh: &Secret<String>) -> Result<ApiRequest> {
    let value = HeaderValue::from_str(&format!("Bearer {}", refresh.as_str()))
        .map_err(|e| Error::InvalidToken(format!("refresh token is not a valid header value: {e}")))?;
    Ok(ApiRequest::post(url).with_header(AUTHORIZATION, value))
}

fn parse_envelope(body: &[u8]) -> Result<TokenEnvelope> {
    serde_json::from_slice(body)
        .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))
}

/// Extract the access token from a refresh response body.
pub fn parse_access_token(body: &[u8]) -> Result<Secret<String>> {
    let envelope = parse_envelope(body)?;
    envelope
        .flat
        .access_token
        .and_then(Secret::non_empty)
        .or_else(|| envelope.data.and_then(|d| d.access_token).and_then(Secret::non_empty))
        .ok_or_else(|| Error::TokenExchange("token response has no access_token".into()))
}

/// Extract the access/refresh pair from a login response body.
pub fn parse_token_pair(body: &[u8]) -> Result<TokenPair> {
    let envelope = parse_envelope(body)?;
    let flat_has_token = envelope
        .flat
        .access_token
        .as_deref()
        .is_some_and(|t| !t.is_empty());
    let fields = if flat_has_token {
        envelope.flat
    } else {
        envelope.data.unwrap_or_default()
    };

    let access_token = fields
        .access_token
        .and_then(Secret::non_empty)
        .ok_or_else(|| Error::TokenExchange("login response has no access_token".into()))?;

    Ok(TokenPair {
        access_token,
        refresh_token: fields.refresh_token.and_then(Secret::non_empty),
    })
}

//! Admin bearer-token extraction for the management endpoints.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;


/// Token extraction errors
#[derive(Debug, Error, PartialEq, Clone)]
pub enum TokenError {
    #[error("Authorization token not provided")]
    Missing,
    /// Not "Bearer <token>", or not visible ASCII
    #[error("Invalid authorization token format")]
    InvalidFormat,
    #[error("Authorization token is empty")]
    Empty,
}

/// Extracts the token from `Authorization: Bearer <token>`.
///
/// The scheme is matched case-insensitively and surrounding whitespace is trimmed.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, TokenError> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .ok_or(TokenError::Missing)?
        .to_str()
        .map_err(|_| TokenError::InvalidFormat)?;

    parse_bearer_token(auth_header)
}

/// Compares a presented token with the configured one in constant time.
///
/// Both sides are MACed under a fixed key so neither the content nor the
/// length of `expected` shows in the timing.
pub fn token_matches(provided: &str, expected: &str) -> bool {
    const KEY: &[u8] = b"wws-connect admin token";

    let Ok(mut expected_mac) = Hmac::<Sha256>::new_from_slice(KEY) else {
        return false;
    };
    expected_mac.update(expected.as_bytes());
    let expected_tag = expected_mac.finalize().into_bytes();

    let Ok(mut provided_mac) = Hmac::<Sha256>::new_from_slice(KEY) else {
        return false;
    };
    provided_mac.update(provided.as_bytes());
    provided_mac.verify_slice(&expected_tag).is_ok()
}

fn parse_bearer_token(header_value: &str) -> Result<String, TokenError> {
    let (scheme, token) = header_value
        .split_once(' ')
        .ok_or(TokenError::InvalidFormat)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(TokenError::InvalidFormat);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(TokenError::Empty);
    }

    Ok(token.to_string())
}

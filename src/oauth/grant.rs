//! Token endpoint response handling.

use crate::credentials::Token;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::BTreeSet;

/// Token endpoint response. Standard OAuth 2.0 fields plus the identity
/// fields the platform returns alongside the token.
#[derive(Deserialize, Debug)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "displayName")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub jti: Option<String>,
}

impl TokenResponse {
    /// Builds the token, deriving `expires_at` as `issued_at + expires_in`.
    ///
    /// Returns `None` when `expires_in` cannot be represented as a timestamp.
    pub fn into_token(self, issued_at: DateTime<Utc>) -> Option<Token> {
        let expires_at = match self.expires_in {
            Some(seconds) => Some(
                Duration::try_seconds(seconds)
                    .and_then(|lifetime| issued_at.checked_add_signed(lifetime))?,
            ),
            None => None,
        };

        Some(Token {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            scopes: self
                .scope
                .as_deref()
                .map(normalize_scopes)
                .unwrap_or_default(),
            subject_display_name: self.display_name,
            subject_id: self.id,
            jti: self.jti,
        })
    }
}

/// Splits a space-delimited scope string into a set.
pub fn normalize_scopes(raw: &str) -> BTreeSet<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

//! Credential records and their persistence.
//!
//! One [`CredentialRecord`] exists per configured application identity. It
//! holds the client id/secret, the grant model the identity authenticates
//! with, the current [`Token`] (if any) and a [`PendingAuthorization`] while
//! a browser round-trip of the authorization-code flow is in flight.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       TokenStore (trait)                 │
//! │  - get / put / delete by identity id     │
//! │  - last writer wins                      │
//! └─────────────────────────────────────────┘
//!          ↓                    ↓
//! ┌──────────────────┐  ┌──────────────────────────┐
//! │ MemoryTokenStore │  │ SqliteTokenStore          │
//! │  - DashMap       │  │  - AES-256-GCM at rest    │
//! └──────────────────┘  └──────────────────────────┘
//! ```
//!
//! # Security
//!
//! - `Debug` output never contains the client secret or token values
//! - The SQLite store encrypts the whole serialized record with a unique nonce

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

mod encryption;
mod memory;
mod storage;

pub use memory::MemoryTokenStore;
pub use storage::SqliteTokenStore;

/// How long an issued authorization URL stays redeemable.
pub const PENDING_AUTHORIZATION_TTL_SECS: i64 = 600;

/// Grant model of an identity.
///
/// `Bot` authenticates as the application itself (client-credentials grant)
/// and is reissued outright when its token goes stale. `User` holds delegated
/// access from a human (authorization-code grant) and is renewed through its
/// refresh token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Bot,
    User,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Bot => write!(f, "bot"),
            TokenType::User => write!(f, "user"),
        }
    }
}

/// OAuth client id/secret pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Access token issued by the authorization server.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,

    /// Only present for user-flow tokens.
    pub refresh_token: Option<String>,

    /// Issuance time plus the grant's `expires_in`. A token without it is never valid.
    pub expires_at: Option<DateTime<Utc>>,

    pub scopes: BTreeSet<String>,

    pub subject_display_name: Option<String>,

    /// Identifies the delegating human for user-flow tokens.
    pub subject_id: Option<String>,

    /// Token id assigned by the platform.
    pub jti: Option<String>,
}

impl Token {
    /// A token is valid iff `now` is strictly before `expires_at`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now < expires_at,
            None => false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .field("subject_display_name", &self.subject_display_name)
            .field("subject_id", &self.subject_id)
            .field("jti", &self.jti)
            .finish()
    }
}

/// State kept between "authorization URL issued" and "callback received".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub callback_url: String,
    pub csrf_state: String,
    pub credentials: ClientCredentials,
    pub created_at: DateTime<Utc>,
}

impl PendingAuthorization {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Duration::seconds(PENDING_AUTHORIZATION_TTL_SECS)
    }
}

/// Everything known about one configured application identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub credentials: ClientCredentials,
    pub token_type: TokenType,
    pub api_base_url: String,
    pub token: Option<Token>,
    pub pending_authorization: Option<PendingAuthorization>,
}

impl CredentialRecord {
    /// Fresh record for a newly configured identity: bot grant, no token.
    pub fn new(credentials: ClientCredentials, api_base_url: impl Into<String>) -> Self {
        Self {
            credentials,
            token_type: TokenType::Bot,
            api_base_url: api_base_url.into(),
            token: None,
            pending_authorization: None,
        }
    }

    /// The stored token if it is still valid at `now`.
    pub fn valid_token_at(&self, now: DateTime<Utc>) -> Option<&Token> {
        self.token.as_ref().filter(|t| t.is_valid_at(now))
    }
}

/// Durable key/value persistence for credential records.
///
/// `put` is an idempotent overwrite and there is no concurrency control
/// beyond last-writer-wins; callers read-modify-write within one logical
/// operation. An absent record is a normal state, not an error.
pub trait TokenStore: Send + Sync {
    fn get(&self, identity_id: &str) -> anyhow::Result<Option<CredentialRecord>>;

    fn put(&self, identity_id: &str, record: &CredentialRecord) -> anyhow::Result<()>;

    /// Returns whether a record existed.
    fn delete(&self, identity_id: &str) -> anyhow::Result<bool>;

    /// Identity ids with a stored record, sorted.
    fn list_identities(&self) -> anyhow::Result<Vec<String>>;
}

#[cfg(test)]
pub(crate) fn test_token(access_token: &str, expires_at: Option<DateTime<Utc>>) -> Token {
    Token {
        access_token: access_token.to_string(),
        refresh_token: None,
        expires_at,
        scopes: BTreeSet::new(),
        subject_display_name: None,
        subject_id: None,
        jti: None,
    }
}

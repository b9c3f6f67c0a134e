//! Error taxonomy shared by the OAuth client, the request executor and the
//! application facade.
//!
//! Authorization-server failures (`AuthServer`) are kept apart from failures
//! of the business call itself (`Upstream`) so callers can tell
//! "your credentials are broken" from "your request was rejected".

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A required request field is missing. Never retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No credential record or no token for the identity. Needs operator action.
    #[error("identity not configured: {0}")]
    Unconfigured(String),

    /// The authorization server rejected a grant or refresh.
    #[error("authorization server returned {status}: {body}")]
    AuthServer { status: u16, body: String },

    /// The remote API rejected the authenticated call.
    #[error("remote API returned {status}: {body}")]
    Upstream { status: u16, body: String },

    /// OAuth callback state did not match the pending authorization.
    #[error("invalid authorization state: {0}")]
    InvalidState(String),

    /// The authorization server could not be reached during a grant or refresh.
    #[error("authorization server unreachable: {0}")]
    AuthServerUnreachable(#[source] reqwest::Error),

    /// The remote API could not be reached.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("credential storage error: {0:#}")]
    Storage(#[source] anyhow::Error),
}

impl Error {
    /// True when the failure concerns the identity's credentials rather than
    /// the request that was being made.
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            Error::AuthServer { .. }
                | Error::AuthServerUnreachable(_)
                | Error::Unconfigured(_)
                | Error::InvalidState(_)
        )
    }

    pub(crate) fn storage(err: anyhow::Error) -> Self {
        Error::Storage(err)
    }
}

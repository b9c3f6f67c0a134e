//! OAuth 2.0 grant flows against the platform's authorization server.
//!
//! Two grant models are supported:
//! - client credentials ("bot"): the application authenticates as itself;
//!   tokens are reissued outright and never refreshed
//! - authorization code ("user"): a human delegates access via a browser
//!   redirect; tokens carry a refresh token
//!
//! The authorization-code round trip:
//! 1. `build_authorization_url` → caller persists the CSRF state
//! 2. User authorizes on the platform
//! 3. Platform redirects to the callback with `code` and `state`
//! 4. Caller checks `state`, then `exchange_authorization_code`
//!
//! Client authentication is HTTP Basic on every token request.

mod grant;
mod state;

pub use grant::normalize_scopes;
pub use state::{generate_csrf_state, CSRF_STATE_BYTES};

use crate::credentials::{ClientCredentials, Token};
use crate::error::{Error, Result};
use chrono::Utc;
use grant::TokenResponse;
use tracing::{debug, warn};

/// Client for one authorization server.
#[derive(Clone)]
pub struct OAuth2Client {
    http: reqwest::Client,
    base_url: String,
}

impl OAuth2Client {
    /// `base_url` is the authorization server root, e.g. `https://api.watsonwork.ibm.com`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http_client(reqwest::Client::new(), base_url)
    }

    pub fn with_http_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth/token", self.base_url)
    }

    pub fn authorize_endpoint(&self) -> String {
        format!("{}/oauth/authorize", self.base_url)
    }

    /// Performs the client-credentials grant.
    ///
    /// The returned token never carries a refresh token.
    ///
    /// # Errors
    /// * `AuthServer` on any non-2xx response
    /// * `AuthServerUnreachable` if the server cannot be reached
    pub async fn acquire_service_token(
        &self,
        client_id: &str,
        client_secret: &str,
        token_endpoint: &str,
    ) -> Result<Token> {
        debug!(client_id = %client_id, endpoint = %token_endpoint, "Requesting service token");

        let mut token = self
            .request_token(
                token_endpoint,
                client_id,
                client_secret,
                &[("grant_type", "client_credentials")],
            )
            .await?;
        token.refresh_token = None;

        Ok(token)
    }

    /// Builds the authorization-code redirect URL and a fresh CSRF state.
    ///
    /// Returns `(url, csrf_state)`. The caller must persist the state before
    /// redirecting the user.
    pub fn build_authorization_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        scope_hint: Option<&str>,
    ) -> (String, String) {
        let csrf_state = generate_csrf_state();

        let mut url = format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&state={}",
            self.authorize_endpoint(),
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&csrf_state)
        );
        if let Some(scope) = scope_hint.filter(|s| !s.trim().is_empty()) {
            url.push_str("&scope=");
            url.push_str(&urlencoding::encode(scope.trim()));
        }

        (url, csrf_state)
    }

    /// Completes the authorization-code grant.
    ///
    /// # Errors
    /// * `AuthServer` when the code is rejected (already used, redirect mismatch)
    pub async fn exchange_authorization_code(
        &self,
        credentials: &ClientCredentials,
        code: &str,
        redirect_uri: &str,
    ) -> Result<Token> {
        debug!(client_id = %credentials.client_id, "Exchanging authorization code");

        self.request_token(
            &self.token_endpoint(),
            &credentials.client_id,
            &credentials.client_secret,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ],
        )
        .await
    }

    /// Exchanges a refresh token for a new access token.
    ///
    /// If the server does not rotate the refresh token, the one passed in is
    /// kept on the returned token.
    ///
    /// # Errors
    /// * `AuthServer` (typically 400/401) when the refresh token is invalid or
    ///   revoked. This is terminal for the delegated identity.
    pub async fn refresh_user_token(
        &self,
        credentials: &ClientCredentials,
        refresh_token: &str,
    ) -> Result<Token> {
        debug!(client_id = %credentials.client_id, "Refreshing user token");

        let mut token = self
            .request_token(
                &self.token_endpoint(),
                &credentials.client_id,
                &credentials.client_secret,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                ],
            )
            .await?;

        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }

        Ok(token)
    }

    async fn request_token(
        &self,
        endpoint: &str,
        client_id: &str,
        client_secret: &str,
        form: &[(&str, &str)],
    ) -> Result<Token> {
        let response = self
            .http
            .post(endpoint)
            .basic_auth(client_id, Some(client_secret))
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(Error::AuthServerUnreachable)?;

        let status = response.status();
        let issued_at = Utc::now();
        let body = response
            .text()
            .await
            .map_err(Error::AuthServerUnreachable)?;

        if !status.is_success() {
            warn!(
                endpoint = %endpoint,
                status = status.as_u16(),
                "Authorization server rejected token request"
            );
            return Err(Error::AuthServer {
                status: status.as_u16(),
                body,
            });
        }

        let token_response: TokenResponse =
            serde_json::from_str(&body).map_err(|e| Error::AuthServer {
                status: status.as_u16(),
                body: format!("malformed token response: {}", e),
            })?;

        debug!(
            has_refresh_token = token_response.refresh_token.is_some(),
            expires_in = ?token_response.expires_in,
            "Token request successful"
        );

        token_response
            .into_token(issued_at)
            .ok_or_else(|| Error::AuthServer {
                status: status.as_u16(),
                body: "expires_in out of range".to_string(),
            })
    }
}

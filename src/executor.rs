//! Bearer-authenticated calls against the remote API with transparent
//! reauthentication.
//!
//! # Flow
//! 1. Reject with `InvalidRequest` if the request has no URI
//! 2. Load the identity's token, `Unconfigured` if there is none
//! 3. Attach `Authorization: Bearer <token>` (replacing any caller value)
//! 4. Send; 2xx responses are returned unmodified
//! 5. On 401 with retries left: refresh per grant model, persist, retry from 3
//! 6. Anything else surfaces as `Upstream`
//!
//! A failed refresh surfaces as `AuthServer` (or `AuthServerUnreachable`),
//! never as the 401 that triggered it. Concurrent calls may each refresh;
//! the last write wins.

use crate::credentials::{CredentialRecord, Token, TokenStore, TokenType};
use crate::error::{Error, Result};
use crate::oauth::OAuth2Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Reauthentication cycles allowed per call when the caller does not say.
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// Outbound API request.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub method: Method,
    /// Absolute URL, or a path resolved against the identity's API base URL.
    pub uri: Option<String>,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl ApiRequest {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: Some(uri.into()),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(Method::GET, uri)
    }

    pub fn post(uri: impl Into<String>) -> Self {
        Self::new(Method::POST, uri)
    }

    /// Serializes `body` as JSON and sets `Content-Type: application/json`.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| Error::InvalidRequest(format!("body is not serializable: {}", e)))?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(bytes);
        Ok(self)
    }

    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::InvalidRequest(format!("invalid header name '{}'", name)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| Error::InvalidRequest(format!("invalid value for header '{}'", name)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }
}

/// Response from the remote API, fully buffered.
#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    async fn read(response: reqwest::Response) -> Result<Self> {
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        Ok(Self {
            status,
            headers,
            body,
        })
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| Error::Upstream {
            status: self.status,
            body: format!("unexpected response body: {}", e),
        })
    }
}

/// What to do with the stored token when a refresh is rejected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshFailurePolicy {
    /// Leave the record untouched so an operator can retry.
    #[default]
    KeepStale,
    /// Clear the token; the identity needs re-authorization.
    Purge,
}

/// Executes requests on behalf of one identity.
pub struct AuthenticatedRequestExecutor {
    identity_id: String,
    http: reqwest::Client,
    oauth: OAuth2Client,
    store: Arc<dyn TokenStore>,
    policy: RefreshFailurePolicy,
    readiness: Option<Arc<watch::Sender<bool>>>,
}

impl AuthenticatedRequestExecutor {
    pub fn new(
        identity_id: impl Into<String>,
        oauth: OAuth2Client,
        store: Arc<dyn TokenStore>,
        policy: RefreshFailurePolicy,
    ) -> Self {
        Self {
            identity_id: identity_id.into(),
            http: reqwest::Client::new(),
            oauth,
            store,
            policy,
            readiness: None,
        }
    }

    /// Publishes token availability on `sender` whenever a refresh stores or clears a token.
    pub fn with_readiness(mut self, sender: Arc<watch::Sender<bool>>) -> Self {
        self.readiness = Some(sender);
        self
    }

    pub fn identity_id(&self) -> &str {
        &self.identity_id
    }

    /// Sends `request` with the identity's bearer token, reauthenticating at
    /// most `max_retries` times.
    ///
    /// A locally expired token is refreshed before the first attempt and
    /// that refresh counts against `max_retries`.
    pub async fn execute(&self, request: ApiRequest, max_retries: u32) -> Result<ApiResponse> {
        let uri = request
            .uri
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::InvalidRequest("request URI is required".to_string()))?;

        let record = self.load_record()?;
        let url = resolve_url(&record.api_base_url, uri);
        let mut token = record.token.ok_or_else(|| {
            Error::Unconfigured(format!("identity '{}' has no access token", self.identity_id))
        })?;
        let mut retries_left = max_retries;

        if !token.is_valid() && retries_left > 0 {
            debug!(identity = %self.identity_id, "Stored token expired, reauthenticating first");
            token = self.reauthenticate().await?;
            retries_left -= 1;
        }

        loop {
            let response = self.send(&request, &url, &token.access_token).await?;

            if response.is_success() {
                return Ok(response);
            }

            if response.status == 401 && retries_left > 0 {
                info!(
                    identity = %self.identity_id,
                    retries_left,
                    "Remote API returned 401, reauthenticating"
                );
                token = self.reauthenticate().await?;
                retries_left -= 1;
                continue;
            }

            debug!(
                identity = %self.identity_id,
                status = response.status,
                url = %url,
                "Remote API rejected request"
            );
            return Err(Error::Upstream {
                status: response.status,
                body: response.text(),
            });
        }
    }

    /// Obtains a new token for the identity and persists it.
    ///
    /// Bot identities are reissued through the client-credentials grant;
    /// user identities exchange their refresh token.
    pub async fn reauthenticate(&self) -> Result<Token> {
        let record = self.load_record()?;

        let result = match record.token_type {
            TokenType::Bot => {
                self.oauth
                    .acquire_service_token(
                        &record.credentials.client_id,
                        &record.credentials.client_secret,
                        &self.oauth.token_endpoint(),
                    )
                    .await
            }
            TokenType::User => {
                let refresh_token = record
                    .token
                    .as_ref()
                    .and_then(|t| t.refresh_token.clone())
                    .ok_or_else(|| {
                        Error::Unconfigured(format!(
                            "identity '{}' has no refresh token, re-authorization required",
                            self.identity_id
                        ))
                    })?;
                self.oauth
                    .refresh_user_token(&record.credentials, &refresh_token)
                    .await
            }
        };

        match result {
            Ok(mut token) => {
                if let Some(previous) = &record.token {
                    inherit_subject(&mut token, previous);
                }
                self.update_token(Some(token.clone()))?;
                info!(
                    identity = %self.identity_id,
                    token_type = %record.token_type,
                    expires_at = ?token.expires_at,
                    "Token refreshed"
                );
                Ok(token)
            }
            Err(err) => {
                warn!(
                    identity = %self.identity_id,
                    token_type = %record.token_type,
                    error = %err,
                    "Token refresh failed"
                );
                if self.policy == RefreshFailurePolicy::Purge
                    && matches!(err, Error::AuthServer { .. })
                {
                    warn!(identity = %self.identity_id, "Purging stale token");
                    self.update_token(None)?;
                }
                Err(err)
            }
        }
    }

    fn load_record(&self) -> Result<CredentialRecord> {
        self.store
            .get(&self.identity_id)
            .map_err(Error::storage)?
            .ok_or_else(|| {
                Error::Unconfigured(format!(
                    "no credential record for identity '{}'",
                    self.identity_id
                ))
            })
    }

    /// Re-reads the record right before writing so only the token is replaced.
    fn update_token(&self, token: Option<Token>) -> Result<()> {
        let mut record = self.load_record()?;
        let ready = token.is_some();
        record.token = token;
        self.store
            .put(&self.identity_id, &record)
            .map_err(Error::storage)?;

        if let Some(readiness) = &self.readiness {
            readiness.send_replace(ready);
        }
        Ok(())
    }

    async fn send(&self, request: &ApiRequest, url: &str, access_token: &str) -> Result<ApiResponse> {
        let bearer = HeaderValue::from_str(&format!("Bearer {}", access_token)).map_err(|_| {
            Error::Unconfigured(format!(
                "stored token for identity '{}' is not a valid header value",
                self.identity_id
            ))
        })?;

        let mut headers = request.headers.clone();
        headers.insert(AUTHORIZATION, bearer);

        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .headers(headers);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        ApiResponse::read(response).await
    }
}

/// Refresh responses may omit the identity fields; keep the previous ones.
fn inherit_subject(token: &mut Token, previous: &Token) {
    if token.subject_id.is_none() {
        token.subject_id = previous.subject_id.clone();
    }
    if token.subject_display_name.is_none() {
        token.subject_display_name = previous.subject_display_name.clone();
    }
}

pub(crate) fn resolve_url(base_url: &str, uri: &str) -> String {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        uri.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            uri.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{test_token, ClientCredentials, MemoryTokenStore};
    use chrono::{Duration, Utc};
    use mockito::{Matcher, Server, ServerGuard};

    const TOKEN_OK: &str = r#"{"access_token":"fresh","expires_in":3600}"#;

    fn valid_token(access_token: &str) -> Token {
        test_token(access_token, Some(Utc::now() + Duration::hours(1)))
    }

    fn setup(
        server: &ServerGuard,
        token_type: TokenType,
        token: Option<Token>,
        policy: RefreshFailurePolicy,
    ) -> (AuthenticatedRequestExecutor, Arc<MemoryTokenStore>) {
        let store = Arc::new(MemoryTokenStore::new());
        let mut record =
            CredentialRecord::new(ClientCredentials::new("app-id", "app-secret"), server.url());
        record.token_type = token_type;
        record.token = token;
        store.put("app", &record).unwrap();

        let executor = AuthenticatedRequestExecutor::new(
            "app",
            OAuth2Client::new(server.url()),
            store.clone(),
            policy,
        );
        (executor, store)
    }

    fn stored_access_token(store: &MemoryTokenStore) -> Option<String> {
        store
            .get("app")
            .unwrap()
            .unwrap()
            .token
            .map(|t| t.access_token)
    }

    #[test]
    fn test_resolve_url() {
        assert_eq!(
            resolve_url("https://api.example.com/", "/v1/spaces"),
            "https://api.example.com/v1/spaces"
        );
        assert_eq!(
            resolve_url("https://api.example.com", "graphql"),
            "https://api.example.com/graphql"
        );
        assert_eq!(
            resolve_url("https://api.example.com", "https://other.example.com/x"),
            "https://other.example.com/x"
        );
    }

    #[tokio::test]
    async fn test_missing_uri_is_invalid_request() {
        let server = Server::new_async().await;
        let (executor, _) = setup(
            &server,
            TokenType::Bot,
            Some(valid_token("t")),
            RefreshFailurePolicy::KeepStale,
        );

        let mut request = ApiRequest::get("/v1/spaces");
        request.uri = None;
        let err = executor.execute(request, 1).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_no_token_is_unconfigured_without_network_call() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let (executor, _) = setup(&server, TokenType::Bot, None, RefreshFailurePolicy::KeepStale);

        let err = executor
            .execute(ApiRequest::get("/v1/spaces"), 1)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Unconfigured(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_identity_is_unconfigured() {
        let server = Server::new_async().await;
        let executor = AuthenticatedRequestExecutor::new(
            "ghost",
            OAuth2Client::new(server.url()),
            Arc::new(MemoryTokenStore::new()),
            RefreshFailurePolicy::KeepStale,
        );
        let err = executor
            .execute(ApiRequest::get("/v1/spaces"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unconfigured(_)));
    }

    #[tokio::test]
    async fn test_success_overrides_caller_authorization() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/spaces/s1/messages")
            .match_header("authorization", "Bearer current")
            .match_header("x-custom", "kept")
            .match_body(r#"{"type":"appMessage"}"#)
            .with_status(201)
            .with_body(r#"{"id":"m1"}"#)
            .create_async()
            .await;
        let (executor, _) = setup(
            &server,
            TokenType::Bot,
            Some(valid_token("current")),
            RefreshFailurePolicy::KeepStale,
        );

        let request = ApiRequest::post("/v1/spaces/s1/messages")
            .header("Authorization", "Bearer caller-supplied")
            .unwrap()
            .header("X-Custom", "kept")
            .unwrap()
            .body(br#"{"type":"appMessage"}"#.to_vec());
        let response = executor.execute(request, 1).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, 201);
        let body: serde_json::Value = response.json().unwrap();
        assert_eq!(body["id"], "m1");
    }

    #[tokio::test]
    async fn test_401_triggers_one_refresh_and_retry_with_new_token() {
        let mut server = Server::new_async().await;
        let stale = server
            .mock("GET", "/v1/spaces")
            .match_header("authorization", "Bearer stale")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        let fresh = server
            .mock("GET", "/v1/spaces")
            .match_header("authorization", "Bearer fresh")
            .with_status(200)
            .with_body("[]")
            .expect(1)
            .create_async()
            .await;
        let token_endpoint = server
            .mock("POST", "/oauth/token")
            .match_body(Matcher::UrlEncoded(
                "grant_type".into(),
                "client_credentials".into(),
            ))
            .with_status(200)
            .with_body(TOKEN_OK)
            .expect(1)
            .create_async()
            .await;
        let (executor, store) = setup(
            &server,
            TokenType::Bot,
            Some(valid_token("stale")),
            RefreshFailurePolicy::KeepStale,
        );

        let response = executor.execute(ApiRequest::get("/v1/spaces"), 1).await.unwrap();

        assert_eq!(response.status, 200);
        stale.assert_async().await;
        fresh.assert_async().await;
        token_endpoint.assert_async().await;
        assert_eq!(stored_access_token(&store).as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_persistent_401_is_bounded_by_max_retries() {
        let mut server = Server::new_async().await;
        let api = server
            .mock("GET", "/v1/spaces")
            .with_status(401)
            .with_body("unauthorized")
            .expect(2)
            .create_async()
            .await;
        let token_endpoint = server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_body(TOKEN_OK)
            .expect(1)
            .create_async()
            .await;
        let (executor, _) = setup(
            &server,
            TokenType::Bot,
            Some(valid_token("stale")),
            RefreshFailurePolicy::KeepStale,
        );

        let err = executor
            .execute(ApiRequest::get("/v1/spaces"), 1)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Upstream { status: 401, .. }));
        api.assert_async().await;
        token_endpoint.assert_async().await;
    }

    #[tokio::test]
    async fn test_zero_retries_propagates_401() {
        let mut server = Server::new_async().await;
        let _api = server
            .mock("GET", "/v1/spaces")
            .with_status(401)
            .create_async()
            .await;
        let token_endpoint = server
            .mock("POST", "/oauth/token")
            .expect(0)
            .create_async()
            .await;
        let (executor, _) = setup(
            &server,
            TokenType::Bot,
            Some(valid_token("stale")),
            RefreshFailurePolicy::KeepStale,
        );

        let err = executor
            .execute(ApiRequest::get("/v1/spaces"), 0)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Upstream { status: 401, .. }));
        token_endpoint.assert_async().await;
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let mut server = Server::new_async().await;
        let api = server
            .mock("GET", "/v1/spaces")
            .with_status(403)
            .with_body("not a member")
            .expect(1)
            .create_async()
            .await;
        let token_endpoint = server
            .mock("POST", "/oauth/token")
            .expect(0)
            .create_async()
            .await;
        let (executor, _) = setup(
            &server,
            TokenType::Bot,
            Some(valid_token("current")),
            RefreshFailurePolicy::KeepStale,
        );

        let err = executor
            .execute(ApiRequest::get("/v1/spaces"), 3)
            .await
            .unwrap_err();

        match err {
            Error::Upstream { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, "not a member");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        api.assert_async().await;
        token_endpoint.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_user_refresh_surfaces_auth_server_error_and_keeps_token() {
        let mut server = Server::new_async().await;
        let _api = server
            .mock("GET", "/v1/spaces")
            .with_status(401)
            .create_async()
            .await;
        let _token_endpoint = server
            .mock("POST", "/oauth/token")
            .match_body(Matcher::UrlEncoded(
                "grant_type".into(),
                "refresh_token".into(),
            ))
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;
        let mut token = valid_token("stale");
        token.refresh_token = Some("revoked".to_string());
        let (executor, store) = setup(
            &server,
            TokenType::User,
            Some(token),
            RefreshFailurePolicy::KeepStale,
        );

        let err = executor
            .execute(ApiRequest::get("/v1/spaces"), 1)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AuthServer { status: 400, .. }));
        assert!(err.is_credential_failure());
        assert_eq!(stored_access_token(&store).as_deref(), Some("stale"));
    }

    #[tokio::test]
    async fn test_purge_policy_clears_token_on_failed_refresh() {
        let mut server = Server::new_async().await;
        let _api = server
            .mock("GET", "/v1/spaces")
            .with_status(401)
            .create_async()
            .await;
        let _token_endpoint = server
            .mock("POST", "/oauth/token")
            .with_status(401)
            .create_async()
            .await;
        let mut token = valid_token("stale");
        token.refresh_token = Some("revoked".to_string());
        let (executor, store) =
            setup(&server, TokenType::User, Some(token), RefreshFailurePolicy::Purge);
        let (tx, rx) = watch::channel(true);
        let executor = executor.with_readiness(Arc::new(tx));

        let err = executor
            .execute(ApiRequest::get("/v1/spaces"), 1)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AuthServer { status: 401, .. }));
        assert!(stored_access_token(&store).is_none());
        assert!(!*rx.borrow());
    }

    #[tokio::test]
    async fn test_user_refresh_keeps_subject() {
        let mut server = Server::new_async().await;
        let _stale = server
            .mock("GET", "/v1/me")
            .match_header("authorization", "Bearer stale")
            .with_status(401)
            .create_async()
            .await;
        let _fresh = server
            .mock("GET", "/v1/me")
            .match_header("authorization", "Bearer fresh")
            .with_status(200)
            .create_async()
            .await;
        let _token_endpoint = server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_body(TOKEN_OK)
            .create_async()
            .await;
        let mut token = valid_token("stale");
        token.refresh_token = Some("refresh-1".to_string());
        token.subject_id = Some("user-42".to_string());
        let (executor, store) = setup(
            &server,
            TokenType::User,
            Some(token),
            RefreshFailurePolicy::KeepStale,
        );

        executor.execute(ApiRequest::get("/v1/me"), 1).await.unwrap();

        let stored = store.get("app").unwrap().unwrap().token.unwrap();
        assert_eq!(stored.access_token, "fresh");
        assert_eq!(stored.subject_id.as_deref(), Some("user-42"));
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn test_expired_token_refreshed_before_first_attempt() {
        let mut server = Server::new_async().await;
        let stale = server
            .mock("GET", "/v1/spaces")
            .match_header("authorization", "Bearer expired")
            .expect(0)
            .create_async()
            .await;
        let fresh = server
            .mock("GET", "/v1/spaces")
            .match_header("authorization", "Bearer fresh")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let _token_endpoint = server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_body(TOKEN_OK)
            .expect(1)
            .create_async()
            .await;
        let (executor, _) = setup(
            &server,
            TokenType::Bot,
            Some(test_token("expired", Some(Utc::now() - Duration::seconds(5)))),
            RefreshFailurePolicy::KeepStale,
        );

        executor.execute(ApiRequest::get("/v1/spaces"), 1).await.unwrap();

        stale.assert_async().await;
        fresh.assert_async().await;
    }

    #[tokio::test]
    async fn test_concurrent_401s_both_refresh_and_succeed() {
        let mut server = Server::new_async().await;
        let stale = server
            .mock("GET", "/v1/spaces")
            .match_header("authorization", "Bearer stale")
            .with_status(401)
            .expect(2)
            .create_async()
            .await;
        let fresh = server
            .mock("GET", "/v1/spaces")
            .match_header("authorization", "Bearer fresh")
            .with_status(200)
            .expect(2)
            .create_async()
            .await;
        let token_endpoint = server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_body(TOKEN_OK)
            .expect(2)
            .create_async()
            .await;
        let (executor, store) = setup(
            &server,
            TokenType::Bot,
            Some(valid_token("stale")),
            RefreshFailurePolicy::KeepStale,
        );

        let (first, second) = tokio::join!(
            executor.execute(ApiRequest::get("/v1/spaces"), 1),
            executor.execute(ApiRequest::get("/v1/spaces"), 1),
        );

        assert_eq!(first.unwrap().status, 200);
        assert_eq!(second.unwrap().status, 200);
        stale.assert_async().await;
        fresh.assert_async().await;
        token_endpoint.assert_async().await;
        assert_eq!(stored_access_token(&store).as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_unreachable_token_endpoint_is_credential_failure() {
        let mut server = Server::new_async().await;
        let api = server
            .mock("GET", "/v1/spaces")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let store = Arc::new(MemoryTokenStore::new());
        let mut record =
            CredentialRecord::new(ClientCredentials::new("app-id", "app-secret"), server.url());
        record.token = Some(valid_token("stale"));
        store.put("app", &record).unwrap();
        let executor = AuthenticatedRequestExecutor::new(
            "app",
            OAuth2Client::new("http://127.0.0.1:1"),
            store.clone(),
            RefreshFailurePolicy::Purge,
        );

        let err = executor
            .execute(ApiRequest::get("/v1/spaces"), 1)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AuthServerUnreachable(_)));
        assert!(err.is_credential_failure());
        // Network failures never purge
        assert_eq!(stored_access_token(&store).as_deref(), Some("stale"));
        api.assert_async().await;
    }
}

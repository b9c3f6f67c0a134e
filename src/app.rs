//! Per-identity API surface used by the workflow nodes.
//!
//! An [`ApplicationFacade`] composes the token store, the OAuth client and
//! the request executor for one configured application identity. The
//! [`ApplicationRegistry`] holds one facade per identity.

use crate::config::{ApplicationConfig, WwsConfig};
use crate::credentials::{
    ClientCredentials, CredentialRecord, PendingAuthorization, Token, TokenStore, TokenType,
};
use crate::error::{Error, Result};
use crate::executor::{
    resolve_url, ApiRequest, ApiResponse, AuthenticatedRequestExecutor, DEFAULT_MAX_RETRIES,
};
use crate::oauth::OAuth2Client;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Result of `get_access_token`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub access_token: String,
    pub jti: Option<String>,
    pub token_expiry: Option<DateTime<Utc>>,
}

/// Identity details shown by the management endpoints. Never contains secrets.
#[derive(Clone, Debug, Serialize)]
pub struct IdentitySummary {
    pub identity_id: String,
    pub token_type: Option<TokenType>,
    pub has_token: bool,
    pub subject_id: Option<String>,
    pub display_name: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: BTreeSet<String>,
    pub authorization_pending: bool,
}

pub struct ApplicationFacade {
    config: ApplicationConfig,
    store: Arc<dyn TokenStore>,
    oauth: OAuth2Client,
    executor: AuthenticatedRequestExecutor,
    readiness: Arc<watch::Sender<bool>>,
}

impl ApplicationFacade {
    pub fn new(config: ApplicationConfig, store: Arc<dyn TokenStore>) -> Self {
        let oauth = OAuth2Client::new(config.api_base_url.clone());

        let ready = store
            .get(&config.id)
            .ok()
            .flatten()
            .and_then(|record| record.token)
            .map(|token| token.is_valid())
            .unwrap_or(false);
        let (sender, _) = watch::channel(ready);
        let readiness = Arc::new(sender);

        let executor = AuthenticatedRequestExecutor::new(
            config.id.clone(),
            oauth.clone(),
            store.clone(),
            config.refresh_failure,
        )
        .with_readiness(readiness.clone());

        Self {
            config,
            store,
            oauth,
            executor,
            readiness,
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        self.config.webhook_secret.as_deref()
    }

    /// Base URL of the remote API for this identity.
    pub fn get_api_url(&self) -> &str {
        &self.config.api_base_url
    }

    /// True when a token is stored and not yet expired.
    pub fn has_access_token(&self) -> bool {
        match self.store.get(self.id()) {
            Ok(record) => record
                .and_then(|r| r.token)
                .map(|t| t.is_valid())
                .unwrap_or(false),
            Err(e) => {
                warn!(identity = %self.id(), error = %e, "Failed to read credential record");
                false
            }
        }
    }

    /// Current token; an expired one is renewed first.
    pub async fn get_access_token(&self) -> Result<AccessToken> {
        let record = self.load_record()?;
        let token = record.token.ok_or_else(|| {
            Error::Unconfigured(format!("identity '{}' has no access token", self.id()))
        })?;

        let token = if token.is_valid() {
            token
        } else {
            debug!(identity = %self.id(), "Access token expired, renewing");
            self.executor.reauthenticate().await?
        };

        Ok(AccessToken {
            access_token: token.access_token,
            jti: token.jti,
            token_expiry: token.expires_at,
        })
    }

    /// Authenticated call against the remote API. `retries` defaults to one
    /// reauthentication cycle.
    pub async fn wws_request(
        &self,
        request: ApiRequest,
        retries: Option<u32>,
    ) -> Result<ApiResponse> {
        self.executor
            .execute(request, retries.unwrap_or(DEFAULT_MAX_RETRIES))
            .await
    }

    /// Runs a GraphQL query and returns its `data`.
    ///
    /// A non-empty `errors` array in the response is reported as `Upstream`.
    pub async fn graphql(&self, query: &str, variables: Option<Value>) -> Result<Value> {
        if query.trim().is_empty() {
            return Err(Error::InvalidRequest("GraphQL query is empty".to_string()));
        }

        let mut body = json!({ "query": query });
        if let Some(variables) = variables {
            body["variables"] = variables;
        }

        let response = self
            .wws_request(ApiRequest::post("/graphql").json(&body)?, None)
            .await?;
        let mut payload: Value = response.json()?;

        if let Some(errors) = payload.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                return Err(Error::Upstream {
                    status: response.status,
                    body: Value::Array(errors.clone()).to_string(),
                });
            }
        }

        Ok(payload.get_mut("data").map(Value::take).unwrap_or(Value::Null))
    }

    /// Creates the credential record if needed and, for bot identities
    /// without a valid token, acquires one.
    ///
    /// A record whose client id differs from the configuration is reset.
    pub async fn ensure_configured(&self) -> Result<CredentialRecord> {
        let configured =
            ClientCredentials::new(&self.config.client_id, &self.config.client_secret);

        let mut record = match self.store.get(self.id()).map_err(Error::storage)? {
            Some(mut record) => {
                if record.credentials.client_id != configured.client_id {
                    info!(identity = %self.id(), "Client id changed, resetting credential record");
                    record = CredentialRecord::new(configured, &self.config.api_base_url);
                } else {
                    record.credentials = configured;
                    record.api_base_url = self.config.api_base_url.clone();
                }
                record
            }
            None => {
                info!(identity = %self.id(), "Creating credential record");
                CredentialRecord::new(configured, &self.config.api_base_url)
            }
        };
        self.put_record(&record)?;

        let wants_service_token = self.config.token_type == TokenType::Bot
            && record.token_type == TokenType::Bot
            && record.valid_token_at(Utc::now()).is_none();

        if wants_service_token {
            let token = self
                .oauth
                .acquire_service_token(
                    &record.credentials.client_id,
                    &record.credentials.client_secret,
                    &self.oauth.token_endpoint(),
                )
                .await?;

            record = self.load_record()?;
            record.token = Some(token);
            self.put_record(&record)?;
            self.readiness.send_replace(true);
            info!(identity = %self.id(), "Service token acquired");
        }

        Ok(record)
    }

    /// Issues an authorization URL for the user flow and persists the
    /// pending authorization it belongs to.
    ///
    /// Refused while the identity holds a bot token; reset first.
    pub fn authorization_url(&self, redirect_uri: &str) -> Result<String> {
        let mut record = self.load_record()?;

        if record.token_type == TokenType::Bot && record.token.is_some() {
            return Err(Error::InvalidRequest(format!(
                "identity '{}' holds a bot token, reset it before authorizing as a user",
                self.id()
            )));
        }

        let (url, csrf_state) = self.oauth.build_authorization_url(
            &record.credentials.client_id,
            redirect_uri,
            self.config.scopes.as_deref(),
        );

        record.pending_authorization = Some(PendingAuthorization {
            callback_url: redirect_uri.to_string(),
            csrf_state,
            credentials: record.credentials.clone(),
            created_at: Utc::now(),
        });
        self.put_record(&record)?;

        debug!(identity = %self.id(), "Authorization URL issued");
        Ok(url)
    }

    /// Completes the user flow from the OAuth callback.
    ///
    /// The pending authorization is consumed before anything else, so it is
    /// gone whether the exchange succeeds or fails. A `state` that does not
    /// match is rejected without contacting the authorization server.
    pub async fn complete_authorization(&self, code: &str, state: &str) -> Result<Token> {
        let mut record = self.load_record()?;
        let pending = record.pending_authorization.take();
        self.put_record(&record)?;

        let pending = pending.ok_or_else(|| {
            Error::InvalidState(format!("no authorization in progress for '{}'", self.id()))
        })?;

        if pending.csrf_state != state {
            warn!(identity = %self.id(), "OAuth callback state mismatch");
            return Err(Error::InvalidState(
                "state does not match (possible CSRF attack)".to_string(),
            ));
        }
        if pending.is_expired_at(Utc::now()) {
            return Err(Error::InvalidState("authorization request expired".to_string()));
        }

        let token = self
            .oauth
            .exchange_authorization_code(&pending.credentials, code, &pending.callback_url)
            .await?;

        let mut record = self.load_record()?;
        record.token_type = TokenType::User;
        record.token = Some(token.clone());
        self.put_record(&record)?;
        self.readiness.send_replace(token.is_valid());

        info!(
            identity = %self.id(),
            subject = ?token.subject_display_name,
            "User authorization completed"
        );
        Ok(token)
    }

    /// Clears token and pending authorization and returns the identity to the bot grant.
    pub fn reset(&self) -> Result<()> {
        let Some(mut record) = self.store.get(self.id()).map_err(Error::storage)? else {
            return Ok(());
        };
        record.token = None;
        record.pending_authorization = None;
        record.token_type = TokenType::Bot;
        self.put_record(&record)?;
        self.readiness.send_replace(false);

        info!(identity = %self.id(), "Credentials reset");
        Ok(())
    }

    /// Drops the pending authorization after the authorization server
    /// reported an error on the callback. Returns whether one existed.
    pub fn abandon_authorization(&self) -> Result<bool> {
        let Some(mut record) = self.store.get(self.id()).map_err(Error::storage)? else {
            return Ok(false);
        };
        if record.pending_authorization.take().is_none() {
            return Ok(false);
        }
        self.put_record(&record)?;

        debug!(identity = %self.id(), "Pending authorization abandoned");
        Ok(true)
    }

    pub fn summary(&self) -> Result<IdentitySummary> {
        let record = self.store.get(self.id()).map_err(Error::storage)?;

        let mut summary = IdentitySummary {
            identity_id: self.id().to_string(),
            token_type: None,
            has_token: false,
            subject_id: None,
            display_name: None,
            expires_at: None,
            scopes: BTreeSet::new(),
            authorization_pending: false,
        };

        if let Some(record) = record {
            summary.token_type = Some(record.token_type);
            summary.authorization_pending = record.pending_authorization.is_some();
            if let Some(token) = record.token {
                summary.has_token = token.is_valid();
                summary.subject_id = token.subject_id;
                summary.display_name = token.subject_display_name;
                summary.expires_at = token.expires_at;
                summary.scopes = token.scopes;
            }
        }

        Ok(summary)
    }

    /// URL of the identity's current avatar image.
    pub fn photo_url(&self) -> Result<String> {
        let subject_id = self
            .load_record()?
            .token
            .and_then(|t| t.subject_id)
            .ok_or_else(|| {
                Error::Unconfigured(format!("identity '{}' has no known subject id", self.id()))
            })?;

        Ok(resolve_url(
            self.get_api_url(),
            &format!("/photos/{}", urlencoding::encode(&subject_id)),
        ))
    }

    /// Uploads a new avatar image as a raw body.
    pub async fn upload_photo(&self, image: Vec<u8>, content_type: &str) -> Result<ApiResponse> {
        if image.is_empty() {
            return Err(Error::InvalidRequest("image body is empty".to_string()));
        }
        if content_type.trim().is_empty() {
            return Err(Error::InvalidRequest("Content-Type is required".to_string()));
        }

        let request = ApiRequest::post("/photos")
            .header(CONTENT_TYPE.as_str(), content_type)?
            .header(CONTENT_LENGTH.as_str(), &image.len().to_string())?
            .body(image);

        self.wws_request(request, None).await
    }

    /// Waits once, up to `timeout`, for a valid token to become available.
    pub async fn wait_until_ready(&self, timeout: Duration) -> bool {
        if self.has_access_token() {
            return true;
        }
        let mut receiver = self.readiness.subscribe();
        let ready = matches!(
            tokio::time::timeout(timeout, receiver.wait_for(|ready| *ready)).await,
            Ok(Ok(_))
        );
        ready
    }

    /// Token availability changes as they happen.
    pub fn subscribe_readiness(&self) -> watch::Receiver<bool> {
        self.readiness.subscribe()
    }

    fn load_record(&self) -> Result<CredentialRecord> {
        self.store
            .get(self.id())
            .map_err(Error::storage)?
            .ok_or_else(|| {
                Error::Unconfigured(format!("no credential record for identity '{}'", self.id()))
            })
    }

    fn put_record(&self, record: &CredentialRecord) -> Result<()> {
        self.store.put(self.id(), record).map_err(Error::storage)
    }
}

/// All configured identities, by id.
#[derive(Default)]
pub struct ApplicationRegistry {
    apps: DashMap<String, Arc<ApplicationFacade>>,
}

impl ApplicationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &WwsConfig, store: Arc<dyn TokenStore>) -> Self {
        let registry = Self::new();
        for app in &config.applications {
            registry.register(ApplicationFacade::new(app.clone(), store.clone()));
        }
        registry
    }

    pub fn register(&self, facade: ApplicationFacade) -> Arc<ApplicationFacade> {
        let facade = Arc::new(facade);
        self.apps.insert(facade.id().to_string(), facade.clone());
        facade
    }

    pub fn get(&self, id: &str) -> Option<Arc<ApplicationFacade>> {
        self.apps.get(id).map(|entry| entry.value().clone())
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.apps.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Deletes stored records of identities that are no longer registered.
    /// Returns the deleted ids.
    pub fn prune_unconfigured(&self, store: &dyn TokenStore) -> Result<Vec<String>> {
        let mut pruned = Vec::new();
        for id in store.list_identities().map_err(Error::storage)? {
            if self.apps.contains_key(&id) {
                continue;
            }
            if store.delete(&id).map_err(Error::storage)? {
                info!(identity = %id, "Deleted credentials of removed identity");
                pruned.push(id);
            }
        }
        Ok(pruned)
    }

    /// Runs `ensure_configured` for every identity. Failures are logged and
    /// do not stop the others.
    pub async fn bootstrap(&self) {
        let facades: Vec<Arc<ApplicationFacade>> =
            self.apps.iter().map(|e| e.value().clone()).collect();

        for facade in facades {
            if let Err(e) = facade.ensure_configured().await {
                error!(identity = %facade.id(), error = %e, "Failed to configure identity");
            }
        }
    }
}

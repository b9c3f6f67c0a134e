use crate::credentials::TokenType;
use crate::executor::RefreshFailurePolicy;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;

/// Platform API root used when an application does not set one.
pub const DEFAULT_API_BASE_URL: &str = "https://api.watsonwork.ibm.com";

/// Complete service configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WwsConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub applications: Vec<ApplicationConfig>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Public base URL the platform redirects back to after authorization
    #[serde(default = "default_callback_base_url")]
    pub callback_base_url: String,
    /// Bearer token required on management endpoints. None = open.
    #[serde(default)]
    pub admin_token: Option<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:1880".to_string()
}

fn default_callback_base_url() -> String {
    "http://localhost:1880".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            callback_base_url: default_callback_base_url(),
            admin_token: None,
        }
    }
}

/// Credential store configuration. The encryption key comes from `WWS_ENCRYPTION_KEY`.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    "wws-credentials.db".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Inbound webhook configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookConfig {
    /// Delivery types whose signature mismatches are tolerated. Empty = strict.
    #[serde(default)]
    pub bypass_delivery_types: Vec<String>,
}

/// One configured application identity
#[derive(Clone, Deserialize)]
pub struct ApplicationConfig {
    pub id: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// `bot` identities acquire a service token at startup; `user` identities
    /// wait for an operator to complete the authorization-code flow.
    #[serde(default = "default_token_type")]
    pub token_type: TokenType,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    /// Scope hint sent with authorization requests
    #[serde(default)]
    pub scopes: Option<String>,
    #[serde(default)]
    pub refresh_failure: RefreshFailurePolicy,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_token_type() -> TokenType {
    TokenType::Bot
}

impl ApplicationConfig {
    /// Bot identity with default policies.
    pub fn new(
        id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        api_base_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            api_base_url: api_base_url.into(),
            token_type: TokenType::Bot,
            webhook_secret: None,
            scopes: None,
            refresh_failure: RefreshFailurePolicy::default(),
        }
    }
}

impl std::fmt::Debug for ApplicationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationConfig")
            .field("id", &self.id)
            .field("client_id", &self.client_id)
            .field("api_base_url", &self.api_base_url)
            .field("token_type", &self.token_type)
            .field("has_webhook_secret", &self.webhook_secret.is_some())
            .field("scopes", &self.scopes)
            .field("refresh_failure", &self.refresh_failure)
            .finish()
    }
}

impl WwsConfig {
    /// Applies `WWS_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides using `lookup` in place of the process environment.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("WWS_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = lookup("WWS_CALLBACK_BASE_URL") {
            self.server.callback_base_url = v;
        }
        if let Some(v) = lookup("WWS_ADMIN_TOKEN") {
            self.server.admin_token = Some(v);
        }

        for app in &mut self.applications {
            let prefix = env_prefix(&app.id);
            if let Some(v) = lookup(&format!("WWS_APP_{}_CLIENT_SECRET", prefix)) {
                app.client_secret = v;
            }
            if let Some(v) = lookup(&format!("WWS_APP_{}_WEBHOOK_SECRET", prefix)) {
                app.webhook_secret = Some(v);
            }
        }
    }

    /// Rejects configurations that cannot work: empty or duplicate ids, missing secrets.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for app in &self.applications {
            if app.id.trim().is_empty() {
                bail!("application with client_id '{}' has an empty id", app.client_id);
            }
            if !seen.insert(app.id.as_str()) {
                bail!("duplicate application id '{}'", app.id);
            }
            if app.client_id.trim().is_empty() {
                bail!("application '{}' has no client_id", app.id);
            }
            if app.client_secret.is_empty() {
                bail!(
                    "application '{}' has no client_secret (set it in the file or WWS_APP_{}_CLIENT_SECRET)",
                    app.id,
                    env_prefix(&app.id)
                );
            }
        }
        Ok(())
    }
}

/// `my-app.1` → `MY_APP_1`
fn env_prefix(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<WwsConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    let config: WwsConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse {}", path))?;
    Ok(config)
}

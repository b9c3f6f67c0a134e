use anyhow::{Context, Result};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use wws_connect::api::{create_router, ApiState};
use wws_connect::app::ApplicationRegistry;
use wws_connect::config::load_config;
use wws_connect::credentials::{MemoryTokenStore, SqliteTokenStore, TokenStore};
use wws_connect::webhook::WebhookVerifier;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wws_connect=info".into()),
        )
        .init();

    info!("wws-connect starting...");

    let config_path = std::env::var("WWS_CONFIG").unwrap_or_else(|_| "wws.toml".to_string());
    let mut config = load_config(&config_path)?;
    config.apply_env_overrides();
    config.validate().context("Invalid configuration")?;

    info!(
        config = %config_path,
        bind_addr = %config.server.bind_addr,
        applications = config.applications.len(),
        "Configuration loaded"
    );

    let store: Arc<dyn TokenStore> = match std::env::var("WWS_ENCRYPTION_KEY") {
        Ok(key) => {
            let store = SqliteTokenStore::new(&config.store.path, &key)
                .context("Failed to initialize credential store")?;
            info!(path = %config.store.path, "Credential store initialized");
            Arc::new(store)
        }
        Err(_) => {
            warn!("WWS_ENCRYPTION_KEY not set, credentials are kept in memory only");
            Arc::new(MemoryTokenStore::new())
        }
    };

    let registry = Arc::new(ApplicationRegistry::from_config(&config, store.clone()));
    let pruned = registry
        .prune_unconfigured(store.as_ref())
        .context("Failed to prune credential store")?;
    if !pruned.is_empty() {
        info!(count = pruned.len(), "Removed credentials of unconfigured applications");
    }
    registry.bootstrap().await;

    let mut api_state = ApiState::new(Arc::clone(&registry), config.server.callback_base_url);
    api_state.admin_token = config.server.admin_token;
    api_state.verifier = WebhookVerifier::with_bypass(config.webhook.bypass_delivery_types);
    if api_state.admin_token.is_none() {
        warn!("No admin token configured, management endpoints are open");
    }

    // Accepted deliveries are handed to the workflow runtime; log them here
    let mut deliveries = api_state.deliveries.subscribe();
    tokio::spawn(async move {
        loop {
            match deliveries.recv().await {
                Ok(delivery) => info!(
                    identity = %delivery.identity_id,
                    delivery_id = %delivery.delivery_id,
                    delivery_type = %delivery.delivery_type,
                    "Webhook delivery received"
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Webhook delivery log lagging")
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let router = create_router(api_state).layer(CorsLayer::permissive());
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "HTTP API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    info!("wws-connect stopped");

    Ok(())
}

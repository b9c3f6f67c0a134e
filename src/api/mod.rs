//! HTTP surface: management endpoints for the configuration UI and the
//! inbound webhook endpoint.

mod management;
mod webhook;

pub use management::create_management_router;
pub use webhook::create_webhook_router;

use crate::app::ApplicationRegistry;
use crate::error::Error;
use crate::webhook::{WebhookDelivery, WebhookVerifier};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of the accepted-delivery channel.
pub const DELIVERY_CHANNEL_CAPACITY: usize = 256;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<ApplicationRegistry>,
    /// Public base URL used to build OAuth redirect URIs
    pub callback_base_url: String,
    /// Required bearer token for management endpoints. None = open.
    pub admin_token: Option<String>,
    pub verifier: WebhookVerifier,
    pub deliveries: broadcast::Sender<WebhookDelivery>,
}

impl ApiState {
    pub fn new(registry: Arc<ApplicationRegistry>, callback_base_url: impl Into<String>) -> Self {
        let (deliveries, _) = broadcast::channel(DELIVERY_CHANNEL_CAPACITY);
        Self {
            registry,
            callback_base_url: callback_base_url.into(),
            admin_token: None,
            verifier: WebhookVerifier::strict(),
            deliveries,
        }
    }
}

/// Management and webhook routes combined.
pub fn create_router(state: ApiState) -> Router {
    let state = Arc::new(state);
    Router::new()
        .merge(create_management_router(state.clone()))
        .merge(create_webhook_router(state))
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Handler errors, rendered as `{"error": ...}`.
#[derive(Debug)]
pub(crate) enum AppError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Conflict(String),
    ServerError(String),
    BadGateway(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        (status, Json(ErrorResponse { error: error_message })).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        match err {
            Error::InvalidRequest(_) => AppError::BadRequest(message),
            Error::Unconfigured(_) => AppError::Conflict(message),
            Error::InvalidState(_) => AppError::Unauthorized(message),
            Error::AuthServer { .. }
            | Error::AuthServerUnreachable(_)
            | Error::Upstream { .. }
            | Error::Transport(_) => AppError::BadGateway(message),
            Error::Storage(_) => AppError::ServerError(message),
        }
    }
}

//! `POST /wws/webhook/:id`
//!
//! Verification deliveries are answered inline with the signed challenge
//! echo. Other deliveries are acknowledged with 200 and published on the
//! delivery channel after the signature check passes.

use super::{ApiState, AppError};
use crate::webhook::{WebhookOutcome, SIGNATURE_HEADER};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub fn create_webhook_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/wws/webhook/:id", post(receive_delivery))
        .with_state(state)
}

async fn receive_delivery(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let facade = state
        .registry
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("Application '{}' not found", id)))?;

    let secret = facade.webhook_secret().ok_or_else(|| {
        warn!(identity = %id, "Webhook delivery for application without webhook secret");
        AppError::Conflict(format!("Application '{}' has no webhook secret", id))
    })?;

    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    match state
        .verifier
        .process(&id, content_type, &body, signature, secret)
    {
        WebhookOutcome::Handshake(handshake) => {
            info!(identity = %id, "Webhook verification answered");
            Ok((
                StatusCode::OK,
                [
                    (CONTENT_TYPE.as_str(), "application/json"),
                    (SIGNATURE_HEADER, handshake.signature.as_str()),
                ],
                handshake.body,
            )
                .into_response())
        }
        WebhookOutcome::Accepted(delivery) => {
            debug!(
                identity = %id,
                delivery_id = %delivery.delivery_id,
                delivery_type = %delivery.delivery_type,
                "Webhook delivery accepted"
            );
            if state.deliveries.send(delivery).is_err() {
                debug!(identity = %id, "No subscribers for webhook delivery");
            }
            Ok(StatusCode::OK.into_response())
        }
        WebhookOutcome::Rejected(reason) => Err(AppError::Unauthorized(reason)),
        WebhookOutcome::Malformed(reason) => {
            debug!(identity = %id, reason = %reason, "Malformed webhook delivery");
            Err(AppError::BadRequest(reason))
        }
    }
}

//! Management endpoints used by the configuration UI.
//!
//! - `GET    /wws/app/:id/token` — identity summary
//! - `DELETE /wws/app/:id/token` — reset credentials
//! - `GET    /wws/app/:id/authorize` — start the user authorization flow
//! - `GET    /wws/app/:id/oauth/callback` — OAuth redirect target
//! - `GET    /wws/app/:id/photo` — avatar URL
//! - `POST   /wws/app/:id/photo` — upload a new avatar
//!
//! When an admin token is configured every route except the OAuth callback
//! requires it as a bearer token. The callback is protected by the CSRF state.

use super::{ApiState, AppError};
use crate::app::{ApplicationFacade, IdentitySummary};
use crate::auth::{extract_bearer_token, token_matches};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap},
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// OAuth callback query parameters
#[derive(Deserialize)]
pub struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Serialize)]
pub struct UrlResponse {
    url: String,
}

#[derive(Serialize)]
pub struct OAuthSuccessResponse {
    success: bool,
    message: String,
    identity_id: String,
    display_name: Option<String>,
}

#[derive(Serialize)]
pub struct ResetResponse {
    success: bool,
    identity_id: String,
}

#[derive(Serialize)]
pub struct UploadResponse {
    success: bool,
    status: u16,
}

pub fn create_management_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/wws/app/:id/token", get(get_token).delete(reset_token))
        .route("/wws/app/:id/authorize", get(authorize))
        .route("/wws/app/:id/oauth/callback", get(oauth_callback))
        .route("/wws/app/:id/photo", get(get_photo).post(upload_photo))
        .with_state(state)
}

/// GET /wws/app/:id/token
async fn get_token(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<IdentitySummary>, AppError> {
    require_admin(&state, &headers)?;
    let facade = lookup(&state, &id)?;
    Ok(Json(facade.summary()?))
}

/// DELETE /wws/app/:id/token
async fn reset_token(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ResetResponse>, AppError> {
    require_admin(&state, &headers)?;
    let facade = lookup(&state, &id)?;
    facade.reset()?;

    Ok(Json(ResetResponse {
        success: true,
        identity_id: id,
    }))
}

/// GET /wws/app/:id/authorize
///
/// Returns the URL the operator's browser should open. The pending
/// authorization is persisted before the URL is returned.
async fn authorize(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<UrlResponse>, AppError> {
    require_admin(&state, &headers)?;
    let facade = lookup(&state, &id)?;

    let redirect_uri = callback_url(&state.callback_base_url, &id);
    let url = facade.authorization_url(&redirect_uri)?;

    info!(identity = %id, "Authorization flow started");
    Ok(Json(UrlResponse { url }))
}

/// GET /wws/app/:id/oauth/callback
async fn oauth_callback(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Query(callback): Query<OAuthCallback>,
) -> Result<Json<OAuthSuccessResponse>, AppError> {
    debug!(identity = %id, "OAuth callback received");
    let facade = lookup(&state, &id)?;

    if let Some(error) = callback.error {
        let description = callback
            .error_description
            .unwrap_or_else(|| "Unknown error".to_string());
        warn!(
            identity = %id,
            error = %error,
            description = %description,
            "OAuth authorization failed"
        );
        facade.abandon_authorization()?;
        return Err(AppError::BadRequest(format!(
            "OAuth authorization failed: {} - {}",
            error, description
        )));
    }

    let code = callback
        .code
        .ok_or_else(|| AppError::BadRequest("Missing 'code' parameter".to_string()))?;
    let csrf_state = callback
        .state
        .ok_or_else(|| AppError::BadRequest("Missing 'state' parameter".to_string()))?;

    let token = facade.complete_authorization(&code, &csrf_state).await?;

    Ok(Json(OAuthSuccessResponse {
        success: true,
        message: format!("Successfully authorized {}", id),
        identity_id: id,
        display_name: token.subject_display_name,
    }))
}

/// GET /wws/app/:id/photo
async fn get_photo(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<UrlResponse>, AppError> {
    require_admin(&state, &headers)?;
    let facade = lookup(&state, &id)?;
    Ok(Json(UrlResponse {
        url: facade.photo_url()?,
    }))
}

/// POST /wws/app/:id/photo
///
/// The raw request body is the image. `Content-Type` is forwarded upstream.
async fn upload_photo(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadResponse>, AppError> {
    require_admin(&state, &headers)?;
    let facade = lookup(&state, &id)?;

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Content-Type header is required".to_string()))?;

    let response = facade.upload_photo(body.to_vec(), content_type).await?;

    info!(identity = %id, bytes = body.len(), "Avatar uploaded");
    Ok(Json(UploadResponse {
        success: true,
        status: response.status,
    }))
}

fn lookup(state: &ApiState, id: &str) -> Result<Arc<ApplicationFacade>, AppError> {
    state
        .registry
        .get(id)
        .ok_or_else(|| AppError::NotFound(format!("Application '{}' not found", id)))
}

fn callback_url(callback_base_url: &str, id: &str) -> String {
    format!(
        "{}/wws/app/{}/oauth/callback",
        callback_base_url.trim_end_matches('/'),
        urlencoding::encode(id)
    )
}

/// Checks the admin bearer token. No configured token means open access.
fn require_admin(state: &ApiState, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected) = &state.admin_token else {
        return Ok(());
    };

    let token = extract_bearer_token(headers)
        .map_err(|e| AppError::Unauthorized(e.to_string()))?;
    if !token_matches(&token, expected) {
        return Err(AppError::Unauthorized("Invalid admin token".to_string()));
    }
    Ok(())
}

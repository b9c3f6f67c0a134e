// Integration tests for the /wws/app/:id management endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use mockito::{Matcher, Server, ServerGuard};
use std::sync::Arc;
use tower::ServiceExt;
use wws_connect::api::{create_router, ApiState};
use wws_connect::app::{ApplicationFacade, ApplicationRegistry};
use wws_connect::config::ApplicationConfig;
use wws_connect::credentials::{MemoryTokenStore, TokenStore, TokenType};

const CALLBACK_BASE: &str = "http://flows.test";

fn create_test_app(
    server: &ServerGuard,
    admin_token: Option<&str>,
) -> (Router, Arc<ApplicationRegistry>, Arc<MemoryTokenStore>) {
    let store = Arc::new(MemoryTokenStore::new());
    let registry = Arc::new(ApplicationRegistry::new());

    let mut config = ApplicationConfig::new("notifier", "cid", "csecret", server.url());
    config.token_type = TokenType::User;
    registry.register(ApplicationFacade::new(config, store.clone()));

    let mut state = ApiState::new(registry.clone(), CALLBACK_BASE);
    state.admin_token = admin_token.map(|t| t.to_string());

    (create_router(state), registry, store)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn query_param(url: &str, name: &str) -> String {
    let prefix = format!("{}=", name);
    url.split(['?', '&'])
        .find_map(|pair| pair.strip_prefix(prefix.as_str()))
        .map(|v| urlencoding::decode(v).unwrap().into_owned())
        .unwrap()
}

/// Unknown application ids are 404.
#[tokio::test]
async fn test_unknown_application_is_not_found() {
    let server = Server::new_async().await;
    let (app, _, _) = create_test_app(&server, None);

    let response = app.oneshot(get("/wws/app/missing/token")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("missing"));
}

/// Summary of an identity that has never been configured.
#[tokio::test]
async fn test_token_summary_without_record() {
    let server = Server::new_async().await;
    let (app, _, _) = create_test_app(&server, None);

    let response = app.oneshot(get("/wws/app/notifier/token")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["identity_id"], "notifier");
    assert_eq!(json["has_token"], false);
    assert!(json["token_type"].is_null());
}

/// Admin token is enforced on management routes.
#[tokio::test]
async fn test_admin_token_required() {
    let server = Server::new_async().await;
    let (app, _, _) = create_test_app(&server, Some("admin"));

    let response = app
        .clone()
        .oneshot(get("/wws/app/notifier/token"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/wws/app/notifier/token")
                .header("Authorization", "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/wws/app/notifier/token")
                .header("Authorization", "Bearer admin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// Full user flow: authorize, callback, summary, photo URL, reset.
#[tokio::test]
async fn test_authorization_code_flow() {
    let mut server = Server::new_async().await;
    let redirect_uri = format!("{}/wws/app/notifier/oauth/callback", CALLBACK_BASE);
    let exchange = server
        .mock("POST", "/oauth/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("code".into(), "abc".into()),
            Matcher::UrlEncoded("redirect_uri".into(), redirect_uri.clone()),
        ]))
        .with_status(200)
        .with_body(
            r#"{"access_token":"user-token","refresh_token":"r-1","expires_in":3600,
                "scope":"ibmid","id":"user-7","displayName":"Grace"}"#,
        )
        .expect(1)
        .create_async()
        .await;

    let (app, registry, store) = create_test_app(&server, None);
    registry.get("notifier").unwrap().ensure_configured().await.unwrap();

    let response = app
        .clone()
        .oneshot(get("/wws/app/notifier/authorize"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let url = body_json(response).await["url"].as_str().unwrap().to_string();
    assert!(url.starts_with(&format!("{}/oauth/authorize?", server.url())));
    assert_eq!(query_param(&url, "redirect_uri"), redirect_uri);
    let state = query_param(&url, "state");

    let response = app
        .clone()
        .oneshot(get(&format!(
            "/wws/app/notifier/oauth/callback?code=abc&state={}",
            state
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["display_name"], "Grace");
    exchange.assert_async().await;

    let json = body_json(
        app.clone()
            .oneshot(get("/wws/app/notifier/token"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(json["has_token"], true);
    assert_eq!(json["token_type"], "user");
    assert_eq!(json["subject_id"], "user-7");

    let json = body_json(
        app.clone()
            .oneshot(get("/wws/app/notifier/photo"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(json["url"], format!("{}/photos/user-7", server.url()));

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/wws/app/notifier/token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let record = store.get("notifier").unwrap().unwrap();
    assert!(record.token.is_none());
    assert_eq!(record.token_type, TokenType::Bot);
}

/// A forged state is 401 and never reaches the token endpoint.
#[tokio::test]
async fn test_callback_state_mismatch() {
    let mut server = Server::new_async().await;
    let exchange = server
        .mock("POST", "/oauth/token")
        .expect(0)
        .create_async()
        .await;

    let (app, registry, _) = create_test_app(&server, None);
    registry.get("notifier").unwrap().ensure_configured().await.unwrap();

    let response = app
        .clone()
        .oneshot(get("/wws/app/notifier/authorize"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get(
            "/wws/app/notifier/oauth/callback?code=abc&state=forged",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    exchange.assert_async().await;
}

/// Provider-reported errors and missing parameters are 400.
#[tokio::test]
async fn test_callback_errors() {
    let server = Server::new_async().await;
    let (app, registry, store) = create_test_app(&server, None);
    registry.get("notifier").unwrap().ensure_configured().await.unwrap();

    let response = app
        .clone()
        .oneshot(get("/wws/app/notifier/authorize"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(store
        .get("notifier")
        .unwrap()
        .unwrap()
        .pending_authorization
        .is_some());

    let response = app
        .clone()
        .oneshot(get(
            "/wws/app/notifier/oauth/callback?error=access_denied&error_description=User+cancelled",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("User cancelled"));
    // A denied authorization cannot be completed later
    assert!(store
        .get("notifier")
        .unwrap()
        .unwrap()
        .pending_authorization
        .is_none());

    let response = app
        .oneshot(get("/wws/app/notifier/oauth/callback?state=abc"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// Photo endpoints before any token exists.
#[tokio::test]
async fn test_photo_requires_token() {
    let server = Server::new_async().await;
    let (app, registry, _) = create_test_app(&server, None);
    registry.get("notifier").unwrap().ensure_configured().await.unwrap();

    let response = app
        .clone()
        .oneshot(get("/wws/app/notifier/photo"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/wws/app/notifier/photo")
                .body(Body::from("PNG!"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/wws/app/notifier/photo")
                .header("Content-Type", "image/png")
                .body(Body::from("PNG!"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

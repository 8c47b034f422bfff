//! Router-level checks through `axum-test`

mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use common::TestApp;
use serde_json::Value;

#[tokio::test(flavor = "multi_thread")]
async fn test_health_endpoint() {
    let app = TestApp::spawn().await;
    let server = TestServer::new(app.router.clone()).unwrap();

    let response = server.get("/auth/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_login_is_a_302() {
    let app = TestApp::spawn().await;
    let server = TestServer::new(app.router.clone()).unwrap();

    let response = server.get("/auth/github/login").await;

    response.assert_status(StatusCode::FOUND);
    let location = response.header("location");
    assert!(location
        .to_str()
        .unwrap()
        .contains("code_challenge_method=S256"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_callback_error_body_shape() {
    let app = TestApp::spawn().await;
    let server = TestServer::new(app.router.clone()).unwrap();

    let response = server
        .get("/auth/github/callback")
        .add_query_param("code", "abc")
        .add_query_param("state", "")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error_code"], "OAUTH_STATE_MISSING");
    assert_eq!(body["action"], "Please try logging in again");
    assert_eq!(body.as_object().unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_malformed_callback_query_is_redacted() {
    let app = TestApp::spawn().await;
    let server = TestServer::new(app.router.clone()).unwrap();

    let response = server
        .get("/auth/github/callback?code=a&code=b&state=s")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error_code"], "AUTH_INVALID_REQUEST");
    assert!(!response.text().contains("duplicate field"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_route() {
    let app = TestApp::spawn().await;
    let server = TestServer::new(app.router.clone()).unwrap();

    server
        .get("/auth/other-provider/login")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

//! Shared fixtures for integration tests
//!
//! [`MockProvider`] is a small OAuth2 provider served on an ephemeral local
//! port. It hands out authorization codes bound to a PKCE challenge and only
//! exchanges a code when the posted verifier hashes to that challenge.

#![allow(dead_code)]

use acton_reactive::prelude::*;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use http_body_util::BodyExt;
use portal_sso::{
    auth::UserDirectory,
    config::PortalConfig,
    oauth2::{pkce, store::AgentStateStore},
    router::auth_router,
    state::PortalState,
};
use serde_json::{json, Value};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

pub const CLIENT_ID: &str = "mock-client-id";
pub const CLIENT_SECRET: &str = "mock-client-secret";
pub const ACCESS_TOKEN: &str = "mock-access-token";
pub const SIGNING_SECRET: &str = "integration-signing-secret-0123456789";
pub const REDIRECT_URI: &str = "http://localhost:8080/auth/github/callback";

#[derive(Default)]
struct ProviderState {
    /// code -> PKCE challenge
    codes: Mutex<HashMap<String, String>>,
    token_requests: AtomicUsize,
    fail_userinfo: AtomicBool,
}

/// Running mock provider
#[derive(Clone)]
pub struct MockProvider {
    base_url: String,
    state: Arc<ProviderState>,
}

impl MockProvider {
    /// Serve the provider on `127.0.0.1:0`
    pub async fn start() -> Self {
        let state = Arc::new(ProviderState::default());
        let app = Router::new()
            .route("/login/oauth/access_token", post(token))
            .route("/user", get(user))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Issue a one-time code bound to `challenge`, as the authorize step would
    pub fn issue_code(&self, challenge: &str) -> String {
        let code = format!("code-{}", pkce::random_token());
        self.state
            .codes
            .lock()
            .unwrap()
            .insert(code.clone(), challenge.to_string());
        code
    }

    /// Number of token requests received so far
    pub fn token_requests(&self) -> usize {
        self.state.token_requests.load(Ordering::SeqCst)
    }

    /// Make `/user` answer 500
    pub fn fail_userinfo(&self) {
        self.state.fail_userinfo.store(true, Ordering::SeqCst);
    }
}

async fn token(
    State(state): State<Arc<ProviderState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.token_requests.fetch_add(1, Ordering::SeqCst);

    let field = |name: &str| form.get(name).cloned().unwrap_or_default();
    let invalid_grant =
        || (StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid_grant" }))).into_response();

    if field("grant_type") != "authorization_code"
        || field("client_id") != CLIENT_ID
        || field("client_secret") != CLIENT_SECRET
    {
        return invalid_grant();
    }

    let Some(challenge) = state.codes.lock().unwrap().remove(&field("code")) else {
        return invalid_grant();
    };
    if pkce::challenge_for(&field("code_verifier")) != challenge {
        return invalid_grant();
    }

    Json(json!({
        "access_token": ACCESS_TOKEN,
        "token_type": "bearer",
        "scope": "read:user,user:email"
    }))
    .into_response()
}

async fn user(State(state): State<Arc<ProviderState>>, headers: HeaderMap) -> Response {
    if state.fail_userinfo.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let expected = format!("Bearer {ACCESS_TOKEN}");
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Bad credentials" })),
        )
            .into_response();
    }

    Json(json!({
        "id": 583_231,
        "login": "octocat",
        "email": "octocat@example.com",
        "avatar_url": "https://avatars.example.com/u/583231"
    }))
    .into_response()
}

/// Configuration pointing at `provider`
pub fn config_for(provider: &MockProvider) -> PortalConfig {
    let mut config = PortalConfig::default();
    config.provider.client_id = CLIENT_ID.to_string();
    config.provider.client_secret = CLIENT_SECRET.to_string();
    config.provider.redirect_uri = REDIRECT_URI.to_string();
    config.provider.auth_url = provider.url("/login/oauth/authorize");
    config.provider.token_url = provider.url("/login/oauth/access_token");
    config.provider.userinfo_url = provider.url("/user");
    config.provider.request_timeout_secs = 5;
    config.session.signing_secret = SIGNING_SECRET.to_string();
    config.session.secure_cookies = false;
    config
}

/// Single-connection in-memory database
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    UserDirectory::migrate(&pool).await.unwrap();
    pool
}

/// Full application wired to a mock provider
pub struct TestApp {
    pub router: Router,
    pub state: PortalState,
    pub provider: MockProvider,
    pub store: AgentStateStore,
    _runtime: AgentRuntime,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    pub async fn spawn_with(configure: impl FnOnce(&mut PortalConfig)) -> Self {
        let provider = MockProvider::start().await;
        let mut config = config_for(&provider);
        configure(&mut config);

        let mut runtime = ActonApp::launch();
        let store = AgentStateStore::spawn(
            &mut runtime,
            config.state.max_pending,
            Duration::from_secs(2),
        )
        .await
        .unwrap();
        let users = UserDirectory::new(memory_pool().await);

        let state = PortalState::new(config, Arc::new(store.clone()), users).unwrap();

        Self {
            router: auth_router(state.clone()),
            state,
            provider,
            store,
            _runtime: runtime,
        }
    }

    pub async fn request(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.request(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    /// Start a login; returns `(state, code_challenge)` from the redirect
    pub async fn begin_login(&self) -> (String, String) {
        let response = self.get("/auth/github/login").await;
        assert_eq!(response.status(), StatusCode::FOUND);

        let location = location(&response);
        let url = url::Url::parse(&location).unwrap();
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        (params["state"].clone(), params["code_challenge"].clone())
    }

    /// Start a login and let the provider approve it; returns `(code, state)`
    pub async fn approved_login(&self) -> (String, String) {
        let (state, challenge) = self.begin_login().await;
        let code = self.provider.issue_code(&challenge);
        (code, state)
    }

    pub async fn callback(&self, code: &str, state: &str) -> Response {
        self.get(&format!("/auth/github/callback?code={code}&state={state}"))
            .await
    }
}

pub fn location(response: &Response) -> String {
    response.headers()[header::LOCATION]
        .to_str()
        .unwrap()
        .to_string()
}

/// `name=value` part of the response's `Set-Cookie`, if any
pub fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

pub async fn json_body(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

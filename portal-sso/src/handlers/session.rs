//! Session handlers: test login, logout, current user
//!
//! ```rust,ignore
//! use portal_sso::handlers::session::{logout, me, test_login};
//! use axum::{Router, routing::{get, post}};
//!
//! let app = Router::new()
//!     .route("/auth/test-login", post(test_login))
//!     .route("/auth/logout", post(logout))
//!     .route("/auth/me", get(me));
//! ```

use axum::{
    extract::{rejection::JsonRejection, State},
    http::header::SET_COOKIE,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::{Authenticated, SessionClaims, User};
use crate::error::AuthError;
use crate::oauth2::ProviderIdentity;
use crate::state::PortalState;

/// Profile accepted by the test login
#[derive(Debug, Deserialize, Validate)]
pub struct TestLoginRequest {
    /// Provider subject id to log in as
    #[validate(length(min = 1))]
    pub provider_user_id: String,

    /// Login handle
    #[validate(length(min = 1))]
    pub username: String,

    /// Email address
    #[validate(email)]
    pub email: Option<String>,

    /// Avatar URL
    #[validate(url)]
    pub avatar_url: Option<String>,
}

impl From<TestLoginRequest> for ProviderIdentity {
    fn from(request: TestLoginRequest) -> Self {
        Self {
            provider_user_id: request.provider_user_id,
            username: request.username,
            email: request.email,
            avatar_url: request.avatar_url,
        }
    }
}

/// Body returned by a successful test login
#[derive(Debug, Serialize, Deserialize)]
pub struct TestLoginResponse {
    /// Human-readable result
    pub message: String,
    /// Signed session token, also set as the cookie
    pub token: String,
    /// The upserted user
    pub user: User,
}

/// `POST /auth/test-login`
///
/// Skips the provider entirely: upserts the posted profile and issues a
/// session for it. Only routed when test login is enabled outside
/// production, and refuses to run otherwise.
///
/// # Errors
///
/// - [`AuthError::TestLoginDisabled`] when test login is off
/// - [`AuthError::InvalidRequest`] for a malformed or invalid profile
/// - [`AuthError::UserPersist`] or [`AuthError::SessionSign`] on internal failures
pub async fn test_login(
    State(state): State<PortalState>,
    payload: Result<Json<TestLoginRequest>, JsonRejection>,
) -> Result<Response, AuthError> {
    if !state.config().test_login_enabled() {
        tracing::warn!("Test login attempted while disabled");
        return Err(AuthError::TestLoginDisabled);
    }

    let Json(request) = payload.map_err(|e| AuthError::InvalidRequest(e.body_text()))?;
    request
        .validate()
        .map_err(|e| AuthError::InvalidRequest(e.to_string()))?;

    let identity = ProviderIdentity::from(request);
    let user = state
        .users()
        .upsert(&identity)
        .await
        .map_err(AuthError::UserPersist)?;

    let session = state.issuer().issue(&user).map_err(AuthError::SessionSign)?;
    let cookie = state
        .issuer()
        .cookie_for(&session)
        .map_err(AuthError::SessionSign)?;

    tracing::info!(user_id = user.id, username = %user.username, "Test login");

    let body = TestLoginResponse {
        message: "Test login successful".to_string(),
        token: session.token,
        user,
    };
    Ok(([(SET_COOKIE, cookie)], Json(body)).into_response())
}

/// `POST /auth/logout`
///
/// Clears the session cookie. Safe to call without a session.
///
/// # Errors
///
/// Returns [`AuthError::SessionSign`] if the clearing cookie cannot be built
pub async fn logout(State(state): State<PortalState>) -> Result<Response, AuthError> {
    let cookie = state
        .issuer()
        .clearing_cookie()
        .map_err(AuthError::SessionSign)?;

    tracing::debug!("Session cookie cleared");

    Ok((
        [(SET_COOKIE, cookie)],
        Json(serde_json::json!({ "message": "Logged out" })),
    )
        .into_response())
}

/// `GET /auth/me`
///
/// Claims of the current session; `401 {"authenticated": false}` without one.
pub async fn me(Authenticated(claims): Authenticated) -> Json<SessionClaims> {
    Json(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: Option<&str>, avatar_url: Option<&str>) -> TestLoginRequest {
        TestLoginRequest {
            provider_user_id: "42".to_string(),
            username: "tester".to_string(),
            email: email.map(str::to_string),
            avatar_url: avatar_url.map(str::to_string),
        }
    }

    #[test]
    fn test_request_validation() {
        assert!(request(None, None).validate().is_ok());
        assert!(request(Some("t@example.com"), Some("https://example.com/a.png"))
            .validate()
            .is_ok());
        assert!(request(Some("not-an-email"), None).validate().is_err());
        assert!(request(None, Some("not a url")).validate().is_err());

        let mut empty = request(None, None);
        empty.username.clear();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_request_into_identity() {
        let identity = ProviderIdentity::from(request(Some("t@example.com"), None));
        assert_eq!(identity.provider_user_id, "42");
        assert_eq!(identity.username, "tester");
        assert_eq!(identity.email.as_deref(), Some("t@example.com"));
        assert!(identity.avatar_url.is_none());
    }
}

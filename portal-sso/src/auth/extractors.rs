//! Session extractors for handlers
//!
//! Both extractors first look for claims that [`SessionLayer`] already put in
//! the request extensions and fall back to validating the request headers
//! themselves, so they work with or without the layer installed.
//!
//! [`SessionLayer`]: crate::middleware::SessionLayer

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::session::{SessionClaims, SessionValidator};

/// Claims of an authenticated request
///
/// Rejects with `401 {"authenticated": false}` when there is no valid
/// session. Routes that should redirect browsers instead sit behind
/// [`AuthMiddleware`](crate::middleware::AuthMiddleware).
///
/// # Example
///
/// ```rust,no_run
/// use portal_sso::auth::Authenticated;
///
/// async fn whoami(Authenticated(claims): Authenticated) -> String {
///     format!("Hello, {}!", claims.username)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Authenticated(pub SessionClaims);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
    SessionValidator: FromRef<S>,
{
    type Rejection = Unauthenticated;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        current_session(parts, state).map(Self).ok_or(Unauthenticated)
    }
}

/// Claims of the request, if it has a valid session
///
/// Never rejects.
#[derive(Debug, Clone)]
pub struct OptionalAuth(pub Option<SessionClaims>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
    SessionValidator: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(current_session(parts, state)))
    }
}

fn current_session<S>(parts: &Parts, state: &S) -> Option<SessionClaims>
where
    SessionValidator: FromRef<S>,
{
    if let Some(claims) = parts.extensions.get::<SessionClaims>() {
        return Some(claims.clone());
    }
    SessionValidator::from_ref(state).validate(&parts.headers)
}

/// Rejection for [`Authenticated`]
#[derive(Debug, Clone, Copy)]
pub struct Unauthenticated;

impl IntoResponse for Unauthenticated {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "authenticated": false })),
        )
            .into_response()
    }
}

//! Authentication middleware for protecting routes
//!
//! Requires claims placed by [`SessionLayer`](super::SessionLayer). Browsers
//! without a session are redirected to the login route; API clients get a
//! 401 JSON body pointing at the same route.
//!
//! # Example
//!
//! ```rust,no_run
//! use portal_sso::middleware::{AuthMiddleware, SessionLayer};
//! use portal_sso::auth::SessionValidator;
//! use axum::{Router, routing::get, middleware};
//!
//! # fn example(validator: SessionValidator) {
//! let gate = AuthMiddleware::with_login_path("/auth/github/login");
//! let app: Router = Router::new()
//!     .route("/dashboard", get(|| async { "dashboard" }))
//!     .layer(middleware::from_fn(move |req, next| {
//!         gate.clone().handle_with_config(req, next)
//!     }))
//!     .layer(SessionLayer::new(validator));
//! # }
//! ```

use axum::{
    extract::Request,
    http::{
        header::{ACCEPT, AUTHORIZATION},
        HeaderMap, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde_json::json;

use crate::auth::session::SessionClaims;

/// Middleware that requires a valid session
#[derive(Clone, Debug)]
pub struct AuthMiddleware {
    login_path: String,
}

impl Default for AuthMiddleware {
    fn default() -> Self {
        Self {
            login_path: "/auth/github/login".to_string(),
        }
    }
}

impl AuthMiddleware {
    /// Middleware pointing at the default provider's login route
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Middleware pointing at `login_path`
    #[must_use]
    pub fn with_login_path(login_path: impl Into<String>) -> Self {
        Self {
            login_path: login_path.into(),
        }
    }

    /// Handler for `axum::middleware::from_fn` using the default login path
    ///
    /// # Errors
    ///
    /// Returns [`AuthMiddlewareError`] when the request has no valid session
    pub async fn handle(request: Request, next: Next) -> Result<Response, AuthMiddlewareError> {
        Self::default().handle_with_config(request, next).await
    }

    /// Handler using this instance's login path
    ///
    /// # Errors
    ///
    /// Returns [`AuthMiddlewareError`] when the request has no valid session
    pub async fn handle_with_config(
        self,
        request: Request,
        next: Next,
    ) -> Result<Response, AuthMiddlewareError> {
        if request.extensions().get::<SessionClaims>().is_some() {
            return Ok(next.run(request).await);
        }

        if is_api_request(request.headers()) {
            Err(AuthMiddlewareError::Unauthorized(self.login_path))
        } else {
            Err(AuthMiddlewareError::RedirectToLogin(self.login_path))
        }
    }
}

/// Whether the caller expects JSON rather than a page
fn is_api_request(headers: &HeaderMap) -> bool {
    if headers.contains_key(AUTHORIZATION) {
        return true;
    }
    headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json") && !accept.contains("text/html"))
}

/// Authentication middleware errors
#[derive(Debug)]
pub enum AuthMiddlewareError {
    /// API client without a session; carries the login path
    Unauthorized(String),
    /// Browser without a session; carries the login path
    RedirectToLogin(String),
}

impl IntoResponse for AuthMiddlewareError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized(login_path) => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "authenticated": false, "login_url": login_path })),
            )
                .into_response(),
            Self::RedirectToLogin(login_path) => Redirect::to(&login_path).into_response(),
        }
    }
}

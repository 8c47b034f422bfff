//! Session validation layer
//!
//! Validates the session cookie (or bearer token) once per request and, when
//! it is valid, stores the [`SessionClaims`] in the request extensions.
//! Requests without a valid session pass through untouched; deciding what to
//! do about them is left to [`AuthMiddleware`](super::AuthMiddleware) or the
//! handler.
//!
//! # Example
//!
//! ```rust,no_run
//! use portal_sso::middleware::SessionLayer;
//! use portal_sso::auth::SessionValidator;
//! use axum::{Router, routing::get};
//!
//! # fn example(validator: SessionValidator) {
//! let app: Router = Router::new()
//!     .route("/", get(|| async { "ok" }))
//!     .layer(SessionLayer::new(validator));
//! # }
//! ```

use axum::http::Request;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use crate::auth::session::{SessionClaims, SessionValidator};

/// Layer that attaches validated session claims to requests
#[derive(Clone, Debug)]
pub struct SessionLayer {
    validator: SessionValidator,
}

impl SessionLayer {
    /// Create a session layer around a validator
    #[must_use]
    pub const fn new(validator: SessionValidator) -> Self {
        Self { validator }
    }
}

impl<S> Layer<S> for SessionLayer {
    type Service = SessionMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionMiddleware {
            inner,
            validator: self.validator.clone(),
        }
    }
}

/// Service produced by [`SessionLayer`]
#[derive(Clone, Debug)]
pub struct SessionMiddleware<S> {
    inner: S,
    validator: SessionValidator,
}

impl<S, B> Service<Request<B>> for SessionMiddleware<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        // Never trust claims that arrived with the request
        req.extensions_mut().remove::<SessionClaims>();

        if let Some(claims) = self.validator.validate(req.headers()) {
            tracing::trace!(
                user_id = claims.user_id,
                session_id = %claims.session_id,
                "Session validated"
            );
            req.extensions_mut().insert(claims);
        }

        self.inner.call(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::SessionIssuer;
    use crate::testing::{session_settings, user};
    use axum::{body::Body, http::header::COOKIE, routing::get, Router};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn report(request: axum::extract::Request) -> String {
        request
            .extensions()
            .get::<SessionClaims>()
            .map_or_else(|| "none".to_string(), |c| c.username.clone())
    }

    fn app() -> Router {
        let validator = SessionValidator::new(&session_settings()).unwrap();
        Router::new()
            .route("/", get(report))
            .layer(SessionLayer::new(validator))
    }

    async fn call(request: Request<Body>) -> String {
        let response = app().oneshot(request).await.unwrap();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_valid_cookie_sets_claims() {
        let session = SessionIssuer::new(&session_settings())
            .unwrap()
            .issue(&user(1, "layered"))
            .unwrap();

        let request = Request::builder()
            .uri("/")
            .header(COOKIE, format!("portal_token={}", session.token))
            .body(Body::empty())
            .unwrap();

        assert_eq!(call(request).await, "layered");
    }

    #[tokio::test]
    async fn test_invalid_cookie_passes_through() {
        let request = Request::builder()
            .uri("/")
            .header(COOKIE, "portal_token=garbage")
            .body(Body::empty())
            .unwrap();

        assert_eq!(call(request).await, "none");
    }
}

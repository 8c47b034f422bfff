//! HTTP-facing error type for the login flow
//!
//! Every failure in the login pipeline is converted into an [`AuthError`]
//! before it leaves a handler. The response body only ever carries the
//! stable `error_code`, a short human message and a generic `action` hint;
//! the underlying cause stays in the logs.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::session::SessionError;
use crate::oauth2::store::StoreError;
use crate::oauth2::types::OAuthError;

/// Hint returned with every login failure
const RETRY_ACTION: &str = "Please try logging in again";

/// Errors produced by the login, callback and test-login handlers
#[derive(Debug, Error)]
pub enum AuthError {
    /// The provider redirected back with an `error` parameter
    #[error("provider returned an error: {0}")]
    ProviderDenied(String),

    /// The callback had no `code` parameter (or it was empty)
    #[error("authorization code missing")]
    CodeMissing,

    /// The callback had no `state` parameter (or it was empty)
    #[error("state parameter missing")]
    StateMissing,

    /// State was unknown, expired or already consumed
    #[error("state is unknown, expired or already used")]
    StateInvalid,

    /// Token endpoint rejected the code or could not be reached
    #[error("token exchange failed: {0}")]
    TokenExchange(#[source] OAuthError),

    /// Profile endpoint failed or returned an unusable profile
    #[error("user info fetch failed: {0}")]
    UserInfo(#[source] OAuthError),

    /// State store could not be written or read
    #[error("state store failure: {0}")]
    StateStore(#[source] StoreError),

    /// User directory write failed
    #[error("user persistence failed: {0}")]
    UserPersist(#[source] sqlx::Error),

    /// Session token could not be signed
    #[error("session signing failed: {0}")]
    SessionSign(#[source] SessionError),

    /// Request query or body could not be parsed or failed validation
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Test login endpoint reached while disabled
    #[error("test login is disabled")]
    TestLoginDisabled,
}

/// JSON body for every [`AuthError`]
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Stable machine-readable code
    pub error_code: String,
    /// Short human-readable message
    pub error: String,
    /// What the user should do next
    pub action: String,
}

impl AuthError {
    /// Stable machine-readable code for this error
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ProviderDenied(_) => "OAUTH_PROVIDER_ERROR",
            Self::CodeMissing => "OAUTH_CODE_MISSING",
            Self::StateMissing => "OAUTH_STATE_MISSING",
            Self::StateInvalid => "OAUTH_STATE_INVALID",
            Self::TokenExchange(_) => "OAUTH_TOKEN_EXCHANGE_FAILED",
            Self::UserInfo(_) => "OAUTH_USERINFO_FAILED",
            Self::StateStore(_) => "OAUTH_STATE_STORE_FAILED",
            Self::UserPersist(_) => "OAUTH_USER_PERSIST_FAILED",
            Self::SessionSign(_) => "OAUTH_SESSION_SIGN_FAILED",
            Self::InvalidRequest(_) => "AUTH_INVALID_REQUEST",
            Self::TestLoginDisabled => "AUTH_TEST_LOGIN_DISABLED",
        }
    }

    /// HTTP status for this error
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::CodeMissing
            | Self::StateMissing
            | Self::TokenExchange(_)
            | Self::UserInfo(_)
            | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::ProviderDenied(_) | Self::StateInvalid => StatusCode::UNAUTHORIZED,
            Self::TestLoginDisabled => StatusCode::FORBIDDEN,
            Self::StateStore(_) | Self::UserPersist(_) | Self::SessionSign(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to the caller
    ///
    /// Never includes the source error.
    #[must_use]
    pub const fn public_message(&self) -> &'static str {
        match self {
            Self::ProviderDenied(_) => "The identity provider did not authorize this login",
            Self::CodeMissing => "No authorization code was provided",
            Self::StateMissing => "No state parameter was provided",
            Self::StateInvalid => "Login session is invalid or has expired",
            Self::TokenExchange(_) => "Failed to exchange authorization code",
            Self::UserInfo(_) => "Failed to fetch user profile",
            Self::StateStore(_) => "Login could not be started",
            Self::UserPersist(_) => "Failed to save user account",
            Self::SessionSign(_) => "Failed to create session",
            Self::InvalidRequest(_) => "Request is invalid",
            Self::TestLoginDisabled => "Test login is not enabled",
        }
    }

    /// Response body for this error
    #[must_use]
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error_code: self.error_code().to_string(),
            error: self.public_message().to_string(),
            action: RETRY_ACTION.to_string(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_codes_and_statuses() {
        let cases = [
            (AuthError::CodeMissing, "OAUTH_CODE_MISSING", StatusCode::BAD_REQUEST),
            (AuthError::StateMissing, "OAUTH_STATE_MISSING", StatusCode::BAD_REQUEST),
            (AuthError::StateInvalid, "OAUTH_STATE_INVALID", StatusCode::UNAUTHORIZED),
            (
                AuthError::TokenExchange(OAuthError::TokenExchangeFailed("boom".into())),
                "OAUTH_TOKEN_EXCHANGE_FAILED",
                StatusCode::BAD_REQUEST,
            ),
            (
                AuthError::UserInfo(OAuthError::UserInfoFailed("boom".into())),
                "OAUTH_USERINFO_FAILED",
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (error, code, status) in cases {
            assert_eq!(error.error_code(), code);
            assert_eq!(error.status(), status);
        }
    }

    #[test]
    fn test_internal_errors_are_500() {
        let error = AuthError::StateStore(StoreError::Unavailable("redis down".into()));
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.error_code(), "OAUTH_STATE_STORE_FAILED");
    }

    #[test]
    fn test_body_does_not_leak_source() {
        let error = AuthError::TokenExchange(OAuthError::TokenExchangeFailed(
            "client_secret=hunter2 rejected".into(),
        ));
        let body = serde_json::to_string(&error.body()).unwrap();

        assert!(!body.contains("hunter2"));
        assert!(body.contains("OAUTH_TOKEN_EXCHANGE_FAILED"));
        assert!(body.contains(RETRY_ACTION));
    }
}

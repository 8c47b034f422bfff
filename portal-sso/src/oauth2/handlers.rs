//! OAuth2 HTTP handlers
//!
//! - `GET /auth/<provider>/login`: start the flow
//! - `GET /auth/<provider>/callback`: finish it
//!
//! The callback walks a fixed sequence of checks and stops at the first
//! failure: code present, state present, state consumed, code exchanged,
//! profile fetched, user upserted, session signed. A state is consumed before
//! the code exchange, so a failed callback can never be retried with the
//! same state.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{
        header::{CACHE_CONTROL, LOCATION, SET_COOKIE},
        StatusCode,
    },
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::pkce::{random_token, PkcePair};
use super::store::{state_hint, ConsumeOutcome, PendingLogin};
use crate::error::AuthError;
use crate::state::PortalState;

/// OAuth2 callback query parameters
///
/// All fields are optional so that missing parameters map to the protocol
/// error codes rather than to a generic extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    /// Authorization code from provider
    pub code: Option<String>,
    /// CSRF state token
    pub state: Option<String>,
    /// Error reported by the provider
    pub error: Option<String>,
    /// Human-readable detail for `error`
    pub error_description: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// 302 to `location`, never cached
fn found(location: &str) -> Response {
    (
        StatusCode::FOUND,
        [
            (LOCATION, location),
            (CACHE_CONTROL, "no-store"),
        ],
    )
        .into_response()
}

/// Start a login
///
/// Generates a state token and PKCE pair, stores them, and redirects the
/// browser to the provider. If the store write fails the login fails closed
/// with a 500 and no redirect.
///
/// # Errors
///
/// Returns [`AuthError::StateStore`] if the pending login cannot be stored
pub async fn initiate_login(State(state): State<PortalState>) -> Result<Response, AuthError> {
    let csrf_state = random_token();
    let (verifier, challenge) = PkcePair::generate().into_parts();

    let auth_url = state.provider().authorization_url(&csrf_state, &challenge);
    let pending = PendingLogin::new(csrf_state, verifier, state.config().state.ttl());
    let hint = pending.state_hint().to_string();

    state.state_store().put(pending).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to store pending login");
        AuthError::StateStore(e)
    })?;

    tracing::info!(
        provider = state.provider().name(),
        state = %hint,
        "Initiated OAuth2 login"
    );

    Ok(found(&auth_url))
}

/// Finish a login
///
/// # Errors
///
/// Returns the [`AuthError`] for the first failed step; nothing is persisted
/// and no cookie is set on any failure. A query string that cannot be parsed
/// (a repeated parameter, for instance) is [`AuthError::InvalidRequest`].
pub async fn handle_callback(
    State(state): State<PortalState>,
    query: Result<Query<CallbackParams>, QueryRejection>,
) -> Result<Response, AuthError> {
    let Query(params) = query.map_err(|e| {
        tracing::warn!(error = %e.body_text(), "Malformed OAuth2 callback query");
        AuthError::InvalidRequest(e.body_text())
    })?;

    if let Some(error) = non_empty(params.error) {
        tracing::warn!(
            provider = state.provider().name(),
            error = %error,
            description = params.error_description.as_deref().unwrap_or(""),
            "Provider returned an error to the callback"
        );
        return Err(AuthError::ProviderDenied(error));
    }

    let code = non_empty(params.code).ok_or_else(|| {
        tracing::warn!("OAuth2 callback without code");
        AuthError::CodeMissing
    })?;
    let csrf_state = non_empty(params.state).ok_or_else(|| {
        tracing::warn!("OAuth2 callback without state");
        AuthError::StateMissing
    })?;

    let pending = match state.state_store().consume_if_valid(&csrf_state).await {
        Ok(ConsumeOutcome::Valid(pending)) => pending,
        Ok(outcome) => {
            tracing::warn!(
                state = state_hint(&csrf_state),
                reason = outcome.reason(),
                "Rejected OAuth2 callback state"
            );
            return Err(AuthError::StateInvalid);
        }
        Err(e) => {
            tracing::error!(error = %e, "State store failed during callback");
            return Err(AuthError::StateStore(e));
        }
    };

    let token = state
        .provider()
        .exchange_code(&code, &pending.code_verifier)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "OAuth2 token exchange failed");
            AuthError::TokenExchange(e)
        })?;

    let identity = state
        .provider()
        .fetch_identity(&token.access_token)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "OAuth2 profile fetch failed");
            AuthError::UserInfo(e)
        })?;

    let user = state.users().upsert(&identity).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to persist user");
        AuthError::UserPersist(e)
    })?;

    let session = state.issuer().issue(&user).map_err(|e| {
        tracing::error!(error = %e, "Failed to sign session");
        AuthError::SessionSign(e)
    })?;
    let cookie = state.issuer().cookie_for(&session).map_err(|e| {
        tracing::error!(error = %e, "Failed to build session cookie");
        AuthError::SessionSign(e)
    })?;

    tracing::info!(
        user_id = user.id,
        username = %user.username,
        session_id = %session.claims.session_id,
        "OAuth2 login completed"
    );

    let mut response = found(&state.config().session.landing_path);
    response.headers_mut().insert(SET_COOKIE, cookie);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(Some("abc".into())), Some("abc".to_string()));
        assert_eq!(non_empty(Some(String::new())), None);
        assert_eq!(non_empty(None), None);
    }

    #[test]
    fn test_found_is_302_no_store() {
        let response = found("/dashboard");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "/dashboard");
        assert_eq!(response.headers()[CACHE_CONTROL], "no-store");
    }
}

//! Signed session tokens
//!
//! Sessions are HS256 JWTs carried in the `<app>_token` cookie. The issuer
//! mints them after a successful login; the validator checks signature and
//! expiry on later requests. Validation never says *why* a token was
//! rejected: a missing, malformed, forged or expired token all yield `None`.

use axum::http::{
    header::{AUTHORIZATION, COOKIE},
    HeaderMap, HeaderValue,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::user::User;
use crate::config::SessionSettings;

/// Claims carried by a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Local user id
    pub user_id: i64,
    /// Login handle
    pub username: String,
    /// Email, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Avatar URL, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Provider subject id
    pub provider_user_id: String,
    /// Random id for audit trails
    #[serde(rename = "sid")]
    pub session_id: String,
    /// Issued-at, seconds since the epoch
    #[serde(rename = "iat")]
    pub issued_at: i64,
    /// Expiry, seconds since the epoch
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

/// Session signing errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No signing secret configured
    #[error("session signing secret is empty")]
    MissingSecret,

    /// JWT encoding failed
    #[error("failed to sign session token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    /// Cookie could not be encoded as a header value
    #[error("session cookie is not a valid header value")]
    InvalidCookie,
}

/// A freshly signed session
#[derive(Clone)]
pub struct IssuedSession {
    /// Signed JWT
    pub token: String,
    /// Claims inside the token
    pub claims: SessionClaims,
}

impl std::fmt::Debug for IssuedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedSession")
            .field("token", &"<redacted>")
            .field("claims", &self.claims)
            .finish()
    }
}

/// Cookie attributes shared by issuer and validator
#[derive(Debug, Clone)]
pub struct CookieSettings {
    /// Cookie name
    pub name: String,
    /// Cookie path
    pub path: String,
    /// Add the `Secure` attribute
    pub secure: bool,
}

impl CookieSettings {
    /// Derive cookie attributes from session settings
    #[must_use]
    pub fn from_settings(settings: &SessionSettings) -> Self {
        Self {
            name: settings.cookie_name(),
            path: "/".to_string(),
            secure: settings.secure_cookies,
        }
    }

    fn render(&self, value: &str, max_age_secs: i64) -> Result<HeaderValue, SessionError> {
        let mut cookie = format!(
            "{}={}; Path={}; Max-Age={}; SameSite=Lax; HttpOnly",
            self.name, value, self.path, max_age_secs
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie).map_err(|_| SessionError::InvalidCookie)
    }

    /// `Set-Cookie` value carrying `token`
    ///
    /// # Errors
    ///
    /// Returns error if the cookie contains bytes not allowed in a header
    pub fn set_cookie(&self, token: &str, max_age_secs: i64) -> Result<HeaderValue, SessionError> {
        self.render(token, max_age_secs)
    }

    /// `Set-Cookie` value that removes the session cookie
    ///
    /// # Errors
    ///
    /// Returns error if the cookie name contains bytes not allowed in a header
    pub fn clear_cookie(&self) -> Result<HeaderValue, SessionError> {
        self.render("", 0)
    }

    /// Read this cookie from a request's `Cookie` headers
    #[must_use]
    pub fn extract<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|header| header.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| name.trim() == self.name)
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
    }
}

/// Mints signed session tokens
#[derive(Clone)]
pub struct SessionIssuer {
    key: EncodingKey,
    ttl_secs: i64,
    cookie: CookieSettings,
}

impl std::fmt::Debug for SessionIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIssuer")
            .field("ttl_secs", &self.ttl_secs)
            .field("cookie", &self.cookie)
            .finish_non_exhaustive()
    }
}

impl SessionIssuer {
    /// Build an issuer from session settings
    ///
    /// # Errors
    ///
    /// Returns error if the signing secret is empty
    pub fn new(settings: &SessionSettings) -> Result<Self, SessionError> {
        if settings.signing_secret.is_empty() {
            return Err(SessionError::MissingSecret);
        }
        Ok(Self {
            key: EncodingKey::from_secret(settings.signing_secret.as_bytes()),
            ttl_secs: i64::try_from(settings.ttl_secs).unwrap_or(i64::MAX / 2),
            cookie: CookieSettings::from_settings(settings),
        })
    }

    /// Sign a session for `user`
    ///
    /// # Errors
    ///
    /// Returns error if JWT encoding fails
    pub fn issue(&self, user: &User) -> Result<IssuedSession, SessionError> {
        let issued_at = Utc::now().timestamp();
        let claims = SessionClaims {
            user_id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            avatar_url: user.avatar_url.clone(),
            provider_user_id: user.provider_user_id.clone(),
            session_id: Uuid::new_v4().to_string(),
            issued_at,
            expires_at: issued_at.saturating_add(self.ttl_secs),
        };
        let token = self.sign(&claims)?;

        Ok(IssuedSession { token, claims })
    }

    /// Sign arbitrary claims with the session key
    ///
    /// # Errors
    ///
    /// Returns error if JWT encoding fails
    pub fn sign(&self, claims: &SessionClaims) -> Result<String, SessionError> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.key)?)
    }

    /// `Set-Cookie` value for an issued session, `Max-Age` matching `exp`
    ///
    /// # Errors
    ///
    /// Returns error if the cookie is not a valid header value
    pub fn cookie_for(&self, session: &IssuedSession) -> Result<HeaderValue, SessionError> {
        let max_age = session.claims.expires_at - session.claims.issued_at;
        self.cookie.set_cookie(&session.token, max_age)
    }

    /// `Set-Cookie` value that logs the browser out
    ///
    /// # Errors
    ///
    /// Returns error if the cookie is not a valid header value
    pub fn clearing_cookie(&self) -> Result<HeaderValue, SessionError> {
        self.cookie.clear_cookie()
    }

    /// Session lifetime in seconds
    #[must_use]
    pub const fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }
}

struct ValidatorInner {
    key: DecodingKey,
    validation: Validation,
    cookie: CookieSettings,
}

/// Verifies session tokens on incoming requests
///
/// Cheap to clone.
#[derive(Clone)]
pub struct SessionValidator {
    inner: Arc<ValidatorInner>,
}

impl std::fmt::Debug for SessionValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionValidator")
            .field("cookie", &self.inner.cookie)
            .finish_non_exhaustive()
    }
}

impl SessionValidator {
    /// Build a validator from session settings
    ///
    /// # Errors
    ///
    /// Returns error if the signing secret is empty
    pub fn new(settings: &SessionSettings) -> Result<Self, SessionError> {
        if settings.signing_secret.is_empty() {
            return Err(SessionError::MissingSecret);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Ok(Self {
            inner: Arc::new(ValidatorInner {
                key: DecodingKey::from_secret(settings.signing_secret.as_bytes()),
                validation,
                cookie: CookieSettings::from_settings(settings),
            }),
        })
    }

    /// Claims of the request's session, if it has a valid one
    ///
    /// The session cookie wins over an `Authorization: Bearer` header.
    #[must_use]
    pub fn validate(&self, headers: &HeaderMap) -> Option<SessionClaims> {
        let token = self
            .inner
            .cookie
            .extract(headers)
            .or_else(|| bearer_token(headers))?;
        self.validate_token(token)
    }

    /// Claims of `token`, if it is correctly signed and unexpired
    #[must_use]
    pub fn validate_token(&self, token: &str) -> Option<SessionClaims> {
        let claims = decode::<SessionClaims>(token, &self.inner.key, &self.inner.validation)
            .map_err(|e| tracing::debug!(error = %e, "Rejected session token"))
            .ok()?
            .claims;

        if claims.expires_at <= Utc::now().timestamp() {
            tracing::debug!(session_id = %claims.session_id, "Rejected expired session token");
            return None;
        }

        Some(claims)
    }

    /// Name of the session cookie
    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.inner.cookie.name
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{session_settings, user};

    fn pair() -> (SessionIssuer, SessionValidator) {
        let settings = session_settings();
        (
            SessionIssuer::new(&settings).unwrap(),
            SessionValidator::new(&settings).unwrap(),
        )
    }

    fn cookie_headers(name: &str, token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {name}={token}; other=1")).unwrap(),
        );
        headers
    }

    #[test]
    fn test_issue_then_validate_cookie() {
        let (issuer, validator) = pair();
        let session = issuer.issue(&user(7, "octocat")).unwrap();

        let claims = validator
            .validate(&cookie_headers(validator.cookie_name(), &session.token))
            .unwrap();

        assert_eq!(claims, session.claims);
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.expires_at - claims.issued_at, issuer.ttl_secs());
    }

    #[test]
    fn test_bearer_fallback() {
        let (issuer, validator) = pair();
        let session = issuer.issue(&user(1, "api")).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", session.token)).unwrap(),
        );

        assert!(validator.validate(&headers).is_some());
    }

    #[test]
    fn test_missing_token_is_none() {
        let (_, validator) = pair();
        assert!(validator.validate(&HeaderMap::new()).is_none());
        assert!(validator
            .validate(&cookie_headers(validator.cookie_name(), ""))
            .is_none());
    }

    #[test]
    fn test_garbage_token_is_none() {
        let (_, validator) = pair();
        assert!(validator.validate_token("not.a.jwt").is_none());
        assert!(validator.validate_token("").is_none());
    }

    #[test]
    fn test_foreign_key_is_none() {
        let (_, validator) = pair();
        let mut other = session_settings();
        other.signing_secret = "a-completely-different-signing-secret".to_string();
        let forger = SessionIssuer::new(&other).unwrap();

        let forged = forger.issue(&user(1, "mallory")).unwrap();

        assert!(validator.validate_token(&forged.token).is_none());
    }

    #[test]
    fn test_expired_token_is_none() {
        let (issuer, validator) = pair();
        let mut claims = issuer.issue(&user(1, "late")).unwrap().claims;
        claims.issued_at -= 7200;
        claims.expires_at = Utc::now().timestamp() - 1;

        let token = issuer.sign(&claims).unwrap();

        assert!(validator.validate_token(&token).is_none());
    }

    #[test]
    fn test_tampered_payload_is_none() {
        let (issuer, validator) = pair();
        let token = issuer.issue(&user(1, "user")).unwrap().token;
        let mut parts: Vec<&str> = token.split('.').collect();
        let admin = issuer.issue(&user(2, "admin")).unwrap().token;
        let admin_payload = admin.split('.').nth(1).unwrap();
        parts[1] = admin_payload;

        assert!(validator.validate_token(&parts.join(".")).is_none());
    }

    #[test]
    fn test_session_ids_are_unique() {
        let (issuer, _) = pair();
        let a = issuer.issue(&user(1, "a")).unwrap();
        let b = issuer.issue(&user(1, "a")).unwrap();
        assert_ne!(a.claims.session_id, b.claims.session_id);
    }

    #[test]
    fn test_cookie_attributes() {
        let mut settings = session_settings();
        settings.secure_cookies = true;
        let issuer = SessionIssuer::new(&settings).unwrap();
        let session = issuer.issue(&user(1, "a")).unwrap();

        let cookie = issuer.cookie_for(&session).unwrap();
        let cookie = cookie.to_str().unwrap();

        assert!(cookie.starts_with(&format!("{}={}", settings.cookie_name(), session.token)));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains(&format!("Max-Age={}", settings.ttl_secs)));
    }

    #[test]
    fn test_clearing_cookie() {
        let (issuer, _) = pair();
        let cookie = issuer.clearing_cookie().unwrap();
        let cookie = cookie.to_str().unwrap();

        assert!(cookie.starts_with("portal_token=;"));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn test_empty_secret_rejected() {
        let mut settings = session_settings();
        settings.signing_secret.clear();

        assert!(matches!(
            SessionIssuer::new(&settings),
            Err(SessionError::MissingSecret)
        ));
        assert!(SessionValidator::new(&settings).is_err());
    }
}

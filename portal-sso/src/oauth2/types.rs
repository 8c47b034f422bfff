//! OAuth2 types shared by the provider client and the handlers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Access token returned by the token endpoint
///
/// Only the access token is used, and only for the single profile fetch that
/// follows the exchange. It is never persisted.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthToken {
    /// Access token
    pub access_token: String,
    /// Token type (usually "Bearer")
    pub token_type: String,
    /// When the token expires, if the provider said
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Scopes granted, if the provider echoed them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
}

impl std::fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthToken")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Identity reported by the upstream provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderIdentity {
    /// Immutable subject id at the provider
    pub provider_user_id: String,
    /// Login handle, mutable at the provider
    pub username: String,
    /// Primary email, when the provider shares it
    pub email: Option<String>,
    /// Avatar image URL
    pub avatar_url: Option<String>,
}

/// Provider user ids arrive as numbers (GitHub) or strings (most OIDC providers)
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ProfileId {
    Number(i64),
    Text(String),
}

/// Raw profile document from the userinfo endpoint
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawProfile {
    #[serde(alias = "sub")]
    id: Option<ProfileId>,
    #[serde(alias = "preferred_username")]
    login: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default, alias = "picture")]
    avatar_url: Option<String>,
}

impl RawProfile {
    /// Reject profiles without a usable id or login
    pub(crate) fn into_identity(self) -> Result<ProviderIdentity, OAuthError> {
        let provider_user_id = match self.id {
            Some(ProfileId::Number(id)) if id != 0 => id.to_string(),
            Some(ProfileId::Text(id)) if !id.trim().is_empty() => id,
            _ => {
                return Err(OAuthError::UserInfoFailed(
                    "profile has no usable id".to_string(),
                ))
            }
        };

        let username = self
            .login
            .filter(|login| !login.trim().is_empty())
            .ok_or_else(|| OAuthError::UserInfoFailed("profile has no login".to_string()))?;

        Ok(ProviderIdentity {
            provider_user_id,
            username,
            email: self.email.filter(|email| !email.is_empty()),
            avatar_url: self.avatar_url.filter(|url| !url.is_empty()),
        })
    }
}

/// OAuth2 errors
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    /// Provider endpoints or credentials are unusable
    #[error("Invalid OAuth2 provider configuration: {0}")]
    InvalidConfig(String),

    /// Authorization code exchange failed
    #[error("Failed to exchange authorization code for token: {0}")]
    TokenExchangeFailed(String),

    /// Failed to fetch user info
    #[error("Failed to fetch user information: {0}")]
    UserInfoFailed(String),
}

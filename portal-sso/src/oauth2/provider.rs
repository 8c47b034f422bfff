//! Upstream identity provider client
//!
//! Wraps an `oauth2` client configured for the authorization-code grant with
//! client credentials sent in the request body, plus the profile endpoint.

use ::oauth2::{
    basic::BasicClient, AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use chrono::Utc;

use super::http::{build_client, execute};
use super::pkce::CHALLENGE_METHOD;
use super::types::{OAuthError, OAuthToken, ProviderIdentity, RawProfile};
use crate::config::ProviderSettings;

type ConfiguredClient = BasicClient<
    EndpointSet,    // HasAuthUrl
    EndpointNotSet, // HasDeviceAuthUrl
    EndpointNotSet, // HasIntrospectionUrl
    EndpointNotSet, // HasRevocationUrl
    EndpointSet,    // HasTokenUrl
>;

/// The single upstream identity provider
pub struct IdentityProvider {
    name: String,
    client: ConfiguredClient,
    http_client: reqwest::Client,
    scopes: Vec<String>,
    userinfo_url: String,
}

impl std::fmt::Debug for IdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityProvider")
            .field("name", &self.name)
            .field("scopes", &self.scopes)
            .field("userinfo_url", &self.userinfo_url)
            .finish_non_exhaustive()
    }
}

impl IdentityProvider {
    /// Build a provider from configuration
    ///
    /// # Errors
    ///
    /// Returns error if any endpoint URL is invalid or the HTTP client cannot
    /// be built
    pub fn new(settings: &ProviderSettings) -> Result<Self, OAuthError> {
        let client = BasicClient::new(ClientId::new(settings.client_id.clone()))
            .set_client_secret(ClientSecret::new(settings.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new(settings.auth_url.clone())
                    .map_err(|e| OAuthError::InvalidConfig(format!("Invalid auth URL: {e}")))?,
            )
            .set_token_uri(
                TokenUrl::new(settings.token_url.clone())
                    .map_err(|e| OAuthError::InvalidConfig(format!("Invalid token URL: {e}")))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(settings.redirect_uri.clone()).map_err(|e| {
                    OAuthError::InvalidConfig(format!("Invalid redirect URI: {e}"))
                })?,
            )
            .set_auth_type(AuthType::RequestBody);

        reqwest::Url::parse(&settings.userinfo_url)
            .map_err(|e| OAuthError::InvalidConfig(format!("Invalid userinfo URL: {e}")))?;

        Ok(Self {
            name: settings.name.clone(),
            client,
            http_client: build_client(settings.request_timeout(), &settings.user_agent)?,
            scopes: settings.scopes.clone(),
            userinfo_url: settings.userinfo_url.clone(),
        })
    }

    /// Route name of this provider
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Authorization URL carrying `state` and an S256 `challenge`
    ///
    /// `challenge` comes from [`PkcePair`](super::pkce::PkcePair); it is sent
    /// as is and never derived here.
    #[must_use]
    pub fn authorization_url(&self, state: &str, challenge: &str) -> String {
        let state = state.to_string();

        let (url, _) = self
            .client
            .authorize_url(move || CsrfToken::new(state))
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .add_extra_param("code_challenge", challenge)
            .add_extra_param("code_challenge_method", CHALLENGE_METHOD)
            .url();

        url.to_string()
    }

    /// Exchange an authorization code (and its PKCE verifier) for a token
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::TokenExchangeFailed`] on a non-2xx answer, a
    /// transport failure or timeout, a malformed body, or an empty token
    pub async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<OAuthToken, OAuthError> {
        let http_client = self.http_client.clone();
        let send = move |request: ::oauth2::HttpRequest| execute(http_client.clone(), request);

        let token_response = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_string()))
            .request_async(&send)
            .await
            .map_err(|e| OAuthError::TokenExchangeFailed(e.to_string()))?;

        let access_token = token_response.access_token().secret().clone();
        if access_token.is_empty() {
            return Err(OAuthError::TokenExchangeFailed(
                "provider returned an empty access token".to_string(),
            ));
        }

        Ok(OAuthToken {
            access_token,
            token_type: token_response.token_type().as_ref().to_string(),
            expires_at: token_response
                .expires_in()
                .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
                .map(|ttl| Utc::now() + ttl),
            scopes: token_response
                .scopes()
                .map(|scopes| scopes.iter().map(|s| s.to_string()).collect()),
        })
    }

    /// Fetch the profile behind an access token
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::UserInfoFailed`] on a non-2xx answer, a transport
    /// failure or timeout, or a profile without an id or login
    pub async fn fetch_identity(&self, access_token: &str) -> Result<ProviderIdentity, OAuthError> {
        let response = self
            .http_client
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| OAuthError::UserInfoFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OAuthError::UserInfoFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let profile: RawProfile = response
            .json()
            .await
            .map_err(|e| OAuthError::UserInfoFailed(format!("Failed to parse JSON: {e}")))?;

        profile.into_identity()
    }
}

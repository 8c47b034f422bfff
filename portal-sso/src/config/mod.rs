//! Configuration management for portal-sso
//!
//! Configuration is loaded from multiple sources with clear precedence:
//!
//! 1. Environment variables (highest priority, `PORTAL_` prefix, `__` nesting)
//! 2. `./config.toml` (development)
//! 3. `~/.config/portal-sso/config.toml` (user config)
//! 4. `/etc/portal-sso/config.toml` (system config)
//! 5. Hardcoded defaults (fallback)
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! bind_addr = "0.0.0.0:8080"
//! environment = "production"
//!
//! [provider]
//! name = "github"
//! client_id = "Iv1.0123456789"
//! client_secret = "…"
//! redirect_uri = "https://portal.example.com/auth/github/callback"
//!
//! [session]
//! app_name = "portal"
//! signing_secret = "…"
//! ttl_secs = 86400
//!
//! [state]
//! backend = "redis"
//! redis_url = "redis://127.0.0.1:6379"
//! ```
//!
//! The test-only login bypass is switched on with
//! `PORTAL_AUTH__ENABLE_TEST_LOGIN=true` and refused in production.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application directory name used for config lookups
pub const APP_DIR: &str = "portal-sso";

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development and CI
    #[default]
    Development,
    /// Anything reachable by real users
    Production,
}

impl Environment {
    /// Whether this is production
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Socket address to listen on
    pub bind_addr: String,
    /// Deployment environment
    pub environment: Environment,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            environment: Environment::Development,
        }
    }
}

/// Upstream identity provider settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Route segment, as in `/auth/<name>/login`
    pub name: String,
    /// OAuth2 client ID
    pub client_id: String,
    /// OAuth2 client secret
    pub client_secret: String,
    /// Callback URL registered with the provider
    pub redirect_uri: String,
    /// Authorization endpoint
    pub auth_url: String,
    /// Token endpoint
    pub token_url: String,
    /// Profile endpoint
    pub userinfo_url: String,
    /// Scopes to request
    pub scopes: Vec<String>,
    /// Timeout for each outbound call, in seconds
    pub request_timeout_secs: u64,
    /// User-Agent for outbound calls
    pub user_agent: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            name: "github".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "http://localhost:8080/auth/github/callback".to_string(),
            auth_url: "https://github.com/login/oauth/authorize".to_string(),
            token_url: "https://github.com/login/oauth/access_token".to_string(),
            userinfo_url: "https://api.github.com/user".to_string(),
            scopes: vec!["read:user".to_string(), "user:email".to_string()],
            request_timeout_secs: 10,
            user_agent: concat!("portal-sso/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("name", &self.name)
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("redirect_uri", &self.redirect_uri)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("userinfo_url", &self.userinfo_url)
            .field("scopes", &self.scopes)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl ProviderSettings {
    /// Outbound request timeout
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Path of the login route
    #[must_use]
    pub fn login_path(&self) -> String {
        format!("/auth/{}/login", self.name)
    }

    /// Path of the callback route
    #[must_use]
    pub fn callback_path(&self) -> String {
        format!("/auth/{}/callback", self.name)
    }
}

/// Session cookie and token settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Cookie is named `<app_name>_token`
    pub app_name: String,
    /// HS256 signing key
    pub signing_secret: String,
    /// Session lifetime in seconds
    pub ttl_secs: u64,
    /// Mark the cookie `Secure`
    pub secure_cookies: bool,
    /// Where the callback sends the browser after login
    pub landing_path: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            app_name: "portal".to_string(),
            signing_secret: String::new(),
            ttl_secs: 86400, // 24 hours
            secure_cookies: !cfg!(debug_assertions),
            landing_path: "/dashboard".to_string(),
        }
    }
}

impl std::fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSettings")
            .field("app_name", &self.app_name)
            .field("signing_secret", &redact(&self.signing_secret))
            .field("ttl_secs", &self.ttl_secs)
            .field("secure_cookies", &self.secure_cookies)
            .field("landing_path", &self.landing_path)
            .finish()
    }
}

impl SessionSettings {
    /// Name of the session cookie
    #[must_use]
    pub fn cookie_name(&self) -> String {
        format!("{}_token", self.app_name)
    }
}

/// Pending-login store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    /// In-process acton-reactive agent
    #[default]
    Memory,
    /// Shared Redis instance
    Redis,
}

/// Pending-login store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSettings {
    /// Login window in seconds
    pub ttl_secs: u64,
    /// How often the in-process store drops expired records
    pub sweep_interval_secs: u64,
    /// Which backend to use
    pub backend: StateBackend,
    /// Redis connection URL (redis backend only)
    pub redis_url: String,
    /// Upper bound on any single store operation
    pub operation_timeout_ms: u64,
    /// In-process capacity bound
    pub max_pending: usize,
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 600,
            sweep_interval_secs: 60,
            backend: StateBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            operation_timeout_ms: 2000,
            max_pending: 10_000,
        }
    }
}

impl StateSettings {
    /// Login window
    #[must_use]
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(u32::try_from(self.ttl_secs).unwrap_or(u32::MAX)))
    }

    /// Sweep period
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Store operation timeout
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

/// User directory database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// SQLite connection URL
    pub url: String,
    /// Pool size
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://portal.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

/// Authentication feature switches
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Register `POST /auth/test-login`
    pub enable_test_login: bool,
}

/// Complete portal-sso configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortalConfig {
    /// HTTP server
    #[serde(default)]
    pub server: ServerSettings,
    /// Identity provider
    #[serde(default)]
    pub provider: ProviderSettings,
    /// Session tokens
    #[serde(default)]
    pub session: SessionSettings,
    /// Pending-login store
    #[serde(default)]
    pub state: StateSettings,
    /// User directory
    #[serde(default)]
    pub database: DatabaseSettings,
    /// Feature switches
    #[serde(default)]
    pub auth: AuthSettings,
}

/// Configuration problems found by [`PortalConfig::validate`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Session signing secret is empty
    #[error("session.signing_secret must be set")]
    MissingSigningSecret,

    /// OAuth2 client credentials are incomplete
    #[error("provider.client_id and provider.client_secret must be set")]
    MissingClientCredentials,

    /// Redirect URI is empty
    #[error("provider.redirect_uri must be set")]
    MissingRedirectUri,

    /// Provider name is not usable as a path segment
    #[error("provider.name must be lowercase letters, digits or '-', got {0:?}")]
    InvalidProviderName(String),

    /// Landing path is not a local absolute path
    #[error("session.landing_path must start with a single '/', got {0:?}")]
    InvalidLandingPath(String),

    /// Test login requested in production
    #[error("auth.enable_test_login cannot be enabled in production")]
    TestLoginInProduction,

    /// Session cookies would be sent without `Secure` in production
    #[error("session.secure_cookies must be enabled in production")]
    InsecureCookiesInProduction,

    /// A duration or size is zero
    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
}

impl PortalConfig {
    /// Load configuration from the standard locations
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Default configuration cannot be serialized to TOML
    /// - A configuration file cannot be read or parsed
    /// - Configuration values fail type conversion
    pub fn load() -> anyhow::Result<Self> {
        let mut figment = Self::defaults()?;

        let system_config = PathBuf::from("/etc").join(APP_DIR).join("config.toml");
        if system_config.exists() {
            figment = figment.merge(Toml::file(&system_config));
        }

        let user_config = Self::recommended_path();
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }

        let local_config = PathBuf::from("./config.toml");
        if local_config.exists() {
            figment = figment.merge(Toml::file(&local_config));
        }

        Ok(figment.merge(Self::env()).extract()?)
    }

    /// Load configuration from a specific file, still honouring env overrides
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or values fail type conversion
    pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let config = Self::defaults()?
            .merge(Toml::file(path.as_ref()))
            .merge(Self::env())
            .extract()?;
        Ok(config)
    }

    fn defaults() -> anyhow::Result<Figment> {
        Ok(Figment::new().merge(Toml::string(&toml::to_string(&Self::default())?)))
    }

    fn env() -> Env {
        Env::prefixed("PORTAL_").split("__").lowercase(true)
    }

    /// Recommended user config path
    #[must_use]
    pub fn recommended_path() -> PathBuf {
        dirs::config_dir().map_or_else(
            || PathBuf::from("./config.toml"),
            |config_dir| config_dir.join(APP_DIR).join("config.toml"),
        )
    }

    /// Whether the test-login route should be registered
    #[must_use]
    pub const fn test_login_enabled(&self) -> bool {
        self.auth.enable_test_login && !self.server.environment.is_production()
    }

    /// Check the settings the server cannot start without
    ///
    /// # Errors
    ///
    /// Returns the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.signing_secret.is_empty() {
            return Err(ConfigError::MissingSigningSecret);
        }
        if self.provider.client_id.is_empty() || self.provider.client_secret.is_empty() {
            return Err(ConfigError::MissingClientCredentials);
        }
        if self.provider.redirect_uri.is_empty() {
            return Err(ConfigError::MissingRedirectUri);
        }

        let name = &self.provider.name;
        let valid_name = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid_name {
            return Err(ConfigError::InvalidProviderName(name.clone()));
        }

        let landing = &self.session.landing_path;
        if !landing.starts_with('/') || landing.starts_with("//") {
            return Err(ConfigError::InvalidLandingPath(landing.clone()));
        }

        if self.auth.enable_test_login && self.server.environment.is_production() {
            return Err(ConfigError::TestLoginInProduction);
        }
        if !self.session.secure_cookies && self.server.environment.is_production() {
            return Err(ConfigError::InsecureCookiesInProduction);
        }

        if self.session.ttl_secs == 0 {
            return Err(ConfigError::ZeroValue("session.ttl_secs"));
        }
        if self.state.ttl_secs == 0 {
            return Err(ConfigError::ZeroValue("state.ttl_secs"));
        }
        if self.state.sweep_interval_secs == 0 {
            return Err(ConfigError::ZeroValue("state.sweep_interval_secs"));
        }
        if self.provider.request_timeout_secs == 0 {
            return Err(ConfigError::ZeroValue("provider.request_timeout_secs"));
        }

        if self.session.signing_secret.len() < 32 {
            tracing::warn!("session.signing_secret is shorter than 32 bytes");
        }

        Ok(())
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

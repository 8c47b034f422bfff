//! Application state shared by every handler
//!
//! Holds the configuration, the provider client, the pending-login store,
//! the user directory and the session issuer/validator pair. Cloning is
//! cheap; everything heavy sits behind an `Arc` or a pool handle.

use acton_reactive::prelude::*;
use axum::extract::FromRef;
use std::sync::Arc;

use crate::auth::{SessionIssuer, SessionValidator, UserDirectory};
use crate::config::{PortalConfig, StateBackend};
use crate::oauth2::store::{AgentStateStore, StateStore};
use crate::oauth2::IdentityProvider;

/// Application state for portal-sso
///
/// # Example
///
/// ```rust,no_run
/// use portal_sso::{config::PortalConfig, state::PortalState};
/// use acton_reactive::prelude::ActonApp;
///
/// # async fn example() -> anyhow::Result<()> {
/// let mut runtime = ActonApp::launch();
/// let state = PortalState::build(&mut runtime, PortalConfig::load()?).await?;
/// let app = portal_sso::router::auth_router(state);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PortalState {
    config: Arc<PortalConfig>,
    provider: Arc<IdentityProvider>,
    state_store: Arc<dyn StateStore>,
    users: UserDirectory,
    issuer: SessionIssuer,
    validator: SessionValidator,
}

impl std::fmt::Debug for PortalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalState")
            .field("config", &self.config)
            .field("provider", &self.provider)
            .field("state_store", &"dyn StateStore")
            .field("users", &self.users)
            .finish_non_exhaustive()
    }
}

impl PortalState {
    /// Assemble state from already-constructed parts
    ///
    /// # Errors
    ///
    /// Returns error if the provider endpoints are invalid or the signing
    /// secret is empty
    pub fn new(
        config: PortalConfig,
        state_store: Arc<dyn StateStore>,
        users: UserDirectory,
    ) -> anyhow::Result<Self> {
        let provider = IdentityProvider::new(&config.provider)?;
        let issuer = SessionIssuer::new(&config.session)?;
        let validator = SessionValidator::new(&config.session)?;

        Ok(Self {
            config: Arc::new(config),
            provider: Arc::new(provider),
            state_store,
            users,
            issuer,
            validator,
        })
    }

    /// Open the database, start the configured state store backend and
    /// assemble state
    ///
    /// The in-process backend also gets a periodic sweep task.
    ///
    /// # Errors
    ///
    /// Returns error if the database, the store backend or the provider
    /// client cannot be initialised
    pub async fn build(runtime: &mut AgentRuntime, config: PortalConfig) -> anyhow::Result<Self> {
        let users = UserDirectory::connect(&config.database).await?;

        let state_store: Arc<dyn StateStore> = match config.state.backend {
            StateBackend::Memory => {
                let store = AgentStateStore::spawn(
                    runtime,
                    config.state.max_pending,
                    config.state.operation_timeout(),
                )
                .await?;
                // Detached: lives as long as the process
                drop(store.spawn_sweeper(config.state.sweep_interval()));
                tracing::info!(
                    sweep_interval_secs = config.state.sweep_interval_secs,
                    "Using in-process state store"
                );
                Arc::new(store)
            }
            #[cfg(feature = "redis")]
            StateBackend::Redis => {
                let store = crate::oauth2::store::RedisStateStore::connect(&config.state.redis_url)?;
                tracing::info!("Using Redis state store");
                Arc::new(store)
            }
            #[cfg(not(feature = "redis"))]
            StateBackend::Redis => {
                anyhow::bail!("state.backend = \"redis\" requires the `redis` feature")
            }
        };

        Self::new(config, state_store, users)
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    /// Upstream provider client
    #[must_use]
    pub fn provider(&self) -> &IdentityProvider {
        &self.provider
    }

    /// Pending-login store
    #[must_use]
    pub fn state_store(&self) -> &dyn StateStore {
        self.state_store.as_ref()
    }

    /// User directory
    #[must_use]
    pub const fn users(&self) -> &UserDirectory {
        &self.users
    }

    /// Session issuer
    #[must_use]
    pub const fn issuer(&self) -> &SessionIssuer {
        &self.issuer
    }

    /// Session validator
    #[must_use]
    pub const fn validator(&self) -> &SessionValidator {
        &self.validator
    }
}

impl FromRef<PortalState> for SessionValidator {
    fn from_ref(state: &PortalState) -> Self {
        state.validator.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{memory_directory, test_config};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_new_state() {
        let mut runtime = ActonApp::launch();
        let store = AgentStateStore::spawn(&mut runtime, 10, Duration::from_secs(1))
            .await
            .unwrap();

        let state =
            PortalState::new(test_config(), Arc::new(store), memory_directory().await).unwrap();

        assert_eq!(state.provider().name(), "github");
        assert_eq!(state.validator().cookie_name(), "portal_token");
        state.state_store().ping().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_secret_rejected() {
        let mut runtime = ActonApp::launch();
        let store = AgentStateStore::spawn(&mut runtime, 10, Duration::from_secs(1))
            .await
            .unwrap();
        let mut config = test_config();
        config.session.signing_secret.clear();

        let result = PortalState::new(config, Arc::new(store), memory_directory().await);

        assert!(result.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_build_with_memory_backend() {
        let mut runtime = ActonApp::launch();
        let mut config = test_config();
        config.database.url = "sqlite::memory:".to_string();
        config.database.max_connections = 1;

        let state = PortalState::build(&mut runtime, config).await.unwrap();

        assert_eq!(state.users().count().await.unwrap(), 0);
    }
}

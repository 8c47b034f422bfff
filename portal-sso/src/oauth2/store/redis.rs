//! Redis pending-login store
//!
//! Records are stored as JSON under `<prefix><state>` with a Redis TTL equal
//! to the login window. Consume uses `GETDEL`, so the read and the delete are
//! one server-side operation. Redis cannot tell a replay from an unknown
//! state once the key is gone; both surface as [`ConsumeOutcome::Unknown`].

use async_trait::async_trait;
use chrono::Utc;
use deadpool_redis::{redis::cmd, Config, Pool, Runtime};

use super::{state_hint, ConsumeOutcome, PendingLogin, StateStore, StoreError};

/// Key prefix for pending-login records
pub const KEY_PREFIX: &str = "portal:oauth_state:";

/// [`StateStore`] backed by Redis
#[derive(Clone)]
pub struct RedisStateStore {
    pool: Pool,
    prefix: String,
}

impl std::fmt::Debug for RedisStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStateStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl RedisStateStore {
    /// Build a store over a new connection pool for `url`
    ///
    /// # Errors
    ///
    /// Returns error if the pool cannot be created from the URL
    pub fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = Config::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Unavailable(format!("failed to create Redis pool: {e}")))?;

        Ok(Self::from_pool(pool))
    }

    /// Build a store over an existing pool
    #[must_use]
    pub fn from_pool(pool: Pool) -> Self {
        Self {
            pool,
            prefix: KEY_PREFIX.to_string(),
        }
    }

    /// Override the key prefix
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn key(&self, state: &str) -> String {
        format!("{}{state}", self.prefix)
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to get Redis connection: {e}")))
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn put(&self, pending: PendingLogin) -> Result<(), StoreError> {
        let ttl_secs = (pending.expires_at - Utc::now()).num_seconds().max(1);
        let value =
            serde_json::to_string(&pending).map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let mut conn = self.connection().await?;
        cmd("SET")
            .arg(self.key(&pending.state))
            .arg(value)
            .arg("EX")
            .arg(ttl_secs)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        tracing::debug!(
            state = pending.state_hint(),
            ttl_secs,
            "Stored pending login in Redis"
        );
        Ok(())
    }

    async fn consume_if_valid(&self, state: &str) -> Result<ConsumeOutcome, StoreError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = cmd("GETDEL")
            .arg(self.key(state))
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let Some(value) = value else {
            return Ok(ConsumeOutcome::Unknown);
        };

        let pending: PendingLogin =
            serde_json::from_str(&value).map_err(|e| StoreError::Corrupt(e.to_string()))?;

        if pending.consumed {
            return Ok(ConsumeOutcome::Replayed);
        }
        if pending.is_expired() {
            tracing::debug!(state = state_hint(state), "Redis returned an expired record");
            return Ok(ConsumeOutcome::Expired);
        }

        Ok(ConsumeOutcome::Valid(pending))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

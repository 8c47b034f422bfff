//! User directory
//!
//! Users are keyed by the provider's immutable subject id. Logging in again
//! refreshes the mutable profile fields (username, email, avatar) and keeps
//! the local id stable. Rows are never deleted here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;

use crate::config::DatabaseSettings;
use crate::oauth2::types::ProviderIdentity;

/// A user of the portal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    /// Local primary key
    pub id: i64,
    /// Provider subject id (unique)
    pub provider_user_id: String,
    /// Login handle at the provider
    pub username: String,
    /// Email address, if shared
    pub email: Option<String>,
    /// Avatar URL
    pub avatar_url: Option<String>,
    /// First login
    pub created_at: DateTime<Utc>,
    /// Most recent profile refresh
    pub updated_at: DateTime<Utc>,
}

/// Handle to the `users` table
#[derive(Debug, Clone)]
pub struct UserDirectory {
    pool: SqlitePool,
}

impl UserDirectory {
    /// Wrap an existing pool; migrations must already have run
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the database, run migrations and wrap the pool
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid, the database cannot be opened,
    /// or a migration fails
    pub async fn connect(settings: &DatabaseSettings) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(&settings.url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .connect_with(options)
            .await?;

        Self::migrate(&pool).await?;
        tracing::info!("User directory ready");
        Ok(Self::new(pool))
    }

    /// Apply pending schema migrations
    ///
    /// # Errors
    ///
    /// Returns error if a migration fails
    pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(pool).await
    }

    /// Underlying pool
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or refresh the user for `identity`
    ///
    /// A single `INSERT … ON CONFLICT … DO UPDATE … RETURNING` statement, so
    /// concurrent first logins for the same identity converge on one row.
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails
    pub async fn upsert(&self, identity: &ProviderIdentity) -> Result<User, sqlx::Error> {
        let now = Utc::now();

        sqlx::query_as::<_, User>(
            r"
            INSERT INTO users (provider_user_id, username, email, avatar_url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (provider_user_id)
            DO UPDATE SET
                username = excluded.username,
                email = excluded.email,
                avatar_url = excluded.avatar_url,
                updated_at = excluded.updated_at
            RETURNING id, provider_user_id, username, email, avatar_url, created_at, updated_at
            ",
        )
        .bind(&identity.provider_user_id)
        .bind(&identity.username)
        .bind(&identity.email)
        .bind(&identity.avatar_url)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
    }

    /// Find a user by provider subject id
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails
    pub async fn find_by_provider_user_id(
        &self,
        provider_user_id: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r"
            SELECT id, provider_user_id, username, email, avatar_url, created_at, updated_at
            FROM users
            WHERE provider_user_id = ?
            ",
        )
        .bind(provider_user_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Number of users
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails
    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// Cheap liveness probe for the health check
    ///
    /// # Errors
    ///
    /// Returns error if the database does not answer
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map(|_| ())
    }
}

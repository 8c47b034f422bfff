//! Fixtures for unit tests

use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::auth::{User, UserDirectory};
use crate::config::{PortalConfig, SessionSettings};
use crate::oauth2::types::ProviderIdentity;

pub const TEST_SECRET: &str = "test-signing-secret-0123456789abcdef";

/// Configuration with credentials and a signing secret filled in
pub fn test_config() -> PortalConfig {
    let mut config = PortalConfig::default();
    config.provider.client_id = "test-client-id".to_string();
    config.provider.client_secret = "test-client-secret".to_string();
    config.session = session_settings();
    config
}

pub fn session_settings() -> SessionSettings {
    SessionSettings {
        signing_secret: TEST_SECRET.to_string(),
        secure_cookies: false,
        ..SessionSettings::default()
    }
}

/// Single-connection in-memory database with migrations applied
///
/// One connection only: every `sqlite::memory:` connection is its own database.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    UserDirectory::migrate(&pool).await.unwrap();
    pool
}

pub async fn memory_directory() -> UserDirectory {
    UserDirectory::new(memory_pool().await)
}

pub fn identity(provider_user_id: &str, username: &str) -> ProviderIdentity {
    ProviderIdentity {
        provider_user_id: provider_user_id.to_string(),
        username: username.to_string(),
        email: Some(format!("{username}@example.com")),
        avatar_url: Some(format!("https://avatars.example.com/{provider_user_id}")),
    }
}

pub fn user(id: i64, username: &str) -> User {
    let now = Utc::now();
    User {
        id,
        provider_user_id: format!("gh-{id}"),
        username: username.to_string(),
        email: Some(format!("{username}@example.com")),
        avatar_url: None,
        created_at: now,
        updated_at: now,
    }
}

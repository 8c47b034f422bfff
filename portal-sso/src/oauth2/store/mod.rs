//! Server-side store for pending logins
//!
//! A [`PendingLogin`] binds a CSRF `state` token to the PKCE verifier that
//! was generated for it. It is written once by the login handler and consumed
//! at most once by the callback handler. The consume step is a single atomic
//! operation in every backend, so two callbacks racing on the same state can
//! never both succeed.
//!
//! Two backends are provided:
//!
//! - [`AgentStateStore`]: in-process, backed by an acton-reactive agent that
//!   serialises every operation through its mailbox.
//! - [`RedisStateStore`] (feature `redis`): `SET … EX` on write and `GETDEL`
//!   on consume, for deployments with more than one process.

mod agent;
#[cfg(feature = "redis")]
mod redis;

pub use agent::{AgentStateStore, StateAgent};
#[cfg(feature = "redis")]
pub use redis::RedisStateStore;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A login that has been started but not yet completed
#[derive(Clone, Serialize, Deserialize)]
pub struct PendingLogin {
    /// Opaque CSRF token, also the store key
    pub state: String,
    /// PKCE secret; cleared once the record is consumed
    pub code_verifier: String,
    /// When the login was started
    pub created_at: DateTime<Utc>,
    /// End of the TTL window
    pub expires_at: DateTime<Utc>,
    /// Set on the first successful consume
    #[serde(default)]
    pub consumed: bool,
}

impl PendingLogin {
    /// Create a fresh record valid for `ttl`
    #[must_use]
    pub fn new(state: String, code_verifier: String, ttl: Duration) -> Self {
        let created_at = Utc::now();
        Self {
            state,
            code_verifier,
            created_at,
            expires_at: created_at + ttl,
            consumed: false,
        }
    }

    /// Whether the TTL window has closed at `now`
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether the TTL window has closed
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Short prefix of the state token, safe to log
    #[must_use]
    pub fn state_hint(&self) -> &str {
        state_hint(&self.state)
    }
}

impl std::fmt::Debug for PendingLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingLogin")
            .field("state", &self.state_hint())
            .field("code_verifier", &"<redacted>")
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("consumed", &self.consumed)
            .finish()
    }
}

/// First eight characters of a state token
#[must_use]
pub fn state_hint(state: &str) -> &str {
    state.get(..8).unwrap_or(state)
}

/// Result of trying to consume a state token
///
/// Every variant other than [`ConsumeOutcome::Valid`] is reported to the
/// caller as the same failure; the distinction only feeds the logs.
#[derive(Debug, Clone)]
pub enum ConsumeOutcome {
    /// First use within the TTL window
    Valid(PendingLogin),
    /// Never issued, already swept, or evicted by the backend
    Unknown,
    /// Issued but the TTL window has closed
    Expired,
    /// Already consumed by an earlier callback
    Replayed,
}

impl ConsumeOutcome {
    /// Short label for log fields
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Valid(_) => "valid",
            Self::Unknown => "unknown",
            Self::Expired => "expired",
            Self::Replayed => "replayed",
        }
    }
}

/// State store failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Backend did not answer or returned an error
    #[error("State store unavailable: {0}")]
    Unavailable(String),

    /// Stored record could not be (de)serialised
    #[error("State store record is corrupt: {0}")]
    Corrupt(String),
}

/// Keyed, TTL-bound, single-use store of pending logins
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Persist a pending login under its `state` key
    async fn put(&self, pending: PendingLogin) -> Result<(), StoreError>;

    /// Atomically look up and consume `state`
    ///
    /// Only the first call for a given state within its TTL returns
    /// [`ConsumeOutcome::Valid`].
    async fn consume_if_valid(&self, state: &str) -> Result<ConsumeOutcome, StoreError>;

    /// Check that the backend is answering
    async fn ping(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_login_window() {
        let pending = PendingLogin::new("s".repeat(43), "v".repeat(43), Duration::minutes(10));

        assert!(!pending.is_expired());
        assert!(!pending.consumed);
        assert_eq!(pending.expires_at - pending.created_at, Duration::minutes(10));
        assert!(pending.is_expired_at(pending.expires_at));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let pending = PendingLogin::new(
            "abcdefghSECRETSTATE".to_string(),
            "verifier-secret".to_string(),
            Duration::minutes(10),
        );
        let debug = format!("{pending:?}");

        assert!(debug.contains("abcdefgh"));
        assert!(!debug.contains("SECRETSTATE"));
        assert!(!debug.contains("verifier-secret"));
    }

    #[test]
    fn test_state_hint_short_input() {
        assert_eq!(state_hint("abc"), "abc");
        assert_eq!(state_hint("0123456789"), "01234567");
    }
}

//! In-process pending-login store backed by an acton-reactive agent
//!
//! All reads and writes go through the agent's mailbox, so the
//! check-and-consume in [`ConsumePending`] cannot interleave with another
//! consume of the same state. Consumed records stay behind as tombstones
//! (verifier cleared) until the sweep drops them after their TTL, which lets
//! the logs tell a replayed callback apart from a forged one.

use acton_reactive::prelude::*;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use super::{state_hint, ConsumeOutcome, PendingLogin, StateStore, StoreError};

/// Response channel for web handler requests
pub type ResponseChannel<T> = Arc<Mutex<Option<oneshot::Sender<T>>>>;

fn create_request_reply<T>() -> (ResponseChannel<T>, oneshot::Receiver<T>) {
    let (tx, rx) = oneshot::channel();
    (Arc::new(Mutex::new(Some(tx))), rx)
}

async fn send_response<T>(response_tx: ResponseChannel<T>, value: T) {
    let sender = response_tx.lock().await.take();
    if let Some(tx) = sender {
        let _ = tx.send(value);
    }
}

type StateAgentBuilder = ManagedAgent<Idle, StateAgent>;

/// Default capacity bound for the in-process store
pub const DEFAULT_MAX_PENDING: usize = 10_000;

/// Pending-login agent model
#[derive(Debug, Clone)]
pub struct StateAgent {
    pending: HashMap<String, PendingLogin>,
    max_pending: usize,
}

impl Default for StateAgent {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

/// Store a new pending login
#[derive(Debug, Clone)]
pub struct StorePending {
    /// Record to store
    pub pending: PendingLogin,
    /// Response channel
    pub response_tx: ResponseChannel<Result<(), StoreError>>,
}

impl StorePending {
    /// Create a store request with response channel
    #[must_use]
    pub fn new(pending: PendingLogin) -> (Self, oneshot::Receiver<Result<(), StoreError>>) {
        let (response_tx, rx) = create_request_reply();
        (
            Self {
                pending,
                response_tx,
            },
            rx,
        )
    }
}

/// Atomically look up and consume a state token
#[derive(Debug, Clone)]
pub struct ConsumePending {
    /// State token from the callback
    pub state: String,
    /// Response channel
    pub response_tx: ResponseChannel<ConsumeOutcome>,
}

impl ConsumePending {
    /// Create a consume request with response channel
    #[must_use]
    pub fn new(state: String) -> (Self, oneshot::Receiver<ConsumeOutcome>) {
        let (response_tx, rx) = create_request_reply();
        (Self { state, response_tx }, rx)
    }
}

/// Count records currently held (live and tombstoned)
#[derive(Debug, Clone)]
pub struct CountPending {
    /// Response channel
    pub response_tx: ResponseChannel<usize>,
}

impl CountPending {
    /// Create a count request with response channel
    #[must_use]
    pub fn new() -> (Self, oneshot::Receiver<usize>) {
        let (response_tx, rx) = create_request_reply();
        (Self { response_tx }, rx)
    }
}

/// Drop every record whose TTL has passed
#[derive(Debug, Clone)]
pub struct SweepExpired;

impl StateAgent {
    /// Spawn the agent holding at most `max_pending` records
    ///
    /// # Errors
    ///
    /// Returns error if agent initialization fails
    pub async fn spawn_with_capacity(
        runtime: &mut AgentRuntime,
        max_pending: usize,
    ) -> anyhow::Result<AgentHandle> {
        let config = AgentConfig::new(Ern::with_root("pending_login_store")?, None, None)?;
        let mut builder = runtime.new_agent_with_config::<Self>(config).await;
        builder.model.max_pending = max_pending;
        Self::configure_handlers(builder).await
    }

    async fn configure_handlers(mut builder: StateAgentBuilder) -> anyhow::Result<AgentHandle> {
        builder
            .mutate_on::<StorePending>(|agent, envelope| {
                let pending = envelope.message().pending.clone();
                let response_tx = envelope.message().response_tx.clone();

                agent.model.insert(pending);

                AgentReply::from_async(async move {
                    send_response(response_tx, Ok(())).await;
                })
            })
            .mutate_on::<ConsumePending>(|agent, envelope| {
                let state = envelope.message().state.clone();
                let response_tx = envelope.message().response_tx.clone();

                let outcome = agent.model.consume(&state);
                tracing::debug!(
                    state = state_hint(&state),
                    outcome = outcome.reason(),
                    "Consumed pending login"
                );

                AgentReply::from_async(async move {
                    send_response(response_tx, outcome).await;
                })
            })
            .mutate_on::<CountPending>(|agent, envelope| {
                let count = agent.model.pending.len();
                let response_tx = envelope.message().response_tx.clone();

                AgentReply::from_async(async move {
                    send_response(response_tx, count).await;
                })
            })
            .mutate_on::<SweepExpired>(|agent, _envelope| {
                let removed = agent.model.sweep();
                if removed > 0 {
                    tracing::debug!(
                        removed,
                        remaining = agent.model.pending.len(),
                        "Swept expired pending logins"
                    );
                }
                AgentReply::immediate()
            })
            .after_start(|_agent| async {
                tracing::info!("Pending login store agent started");
            })
            .after_stop(|agent| {
                let remaining = agent.model.pending.len();
                async move {
                    tracing::info!(remaining, "Pending login store agent stopped");
                }
            });

        Ok(builder.start().await)
    }

    fn insert(&mut self, pending: PendingLogin) {
        if self.pending.len() >= self.max_pending {
            self.make_room();
        }
        self.pending.insert(pending.state.clone(), pending);
    }

    /// Free one slot: expired records first, then tombstones, then the
    /// oldest live login
    fn make_room(&mut self) {
        if self.sweep() > 0 {
            return;
        }

        let before = self.pending.len();
        self.pending.retain(|_, pending| !pending.consumed);
        if self.pending.len() < before {
            tracing::debug!(
                removed = before - self.pending.len(),
                "Dropped consumed tombstones to make room"
            );
            return;
        }

        let oldest = self
            .pending
            .values()
            .min_by_key(|pending| pending.created_at)
            .map(|pending| pending.state.clone());
        if let Some(state) = oldest {
            self.pending.remove(&state);
            tracing::warn!(
                max_pending = self.max_pending,
                evicted = state_hint(&state),
                "Pending login store is full, evicted oldest login"
            );
        }
    }

    fn consume(&mut self, state: &str) -> ConsumeOutcome {
        let now = Utc::now();

        let Some(entry) = self.pending.get_mut(state) else {
            return ConsumeOutcome::Unknown;
        };

        if entry.consumed {
            return ConsumeOutcome::Replayed;
        }

        if entry.is_expired_at(now) {
            self.pending.remove(state);
            return ConsumeOutcome::Expired;
        }

        let pending = entry.clone();
        entry.consumed = true;
        entry.code_verifier.clear();

        ConsumeOutcome::Valid(pending)
    }

    fn sweep(&mut self) -> usize {
        let now = Utc::now();
        let before = self.pending.len();
        self.pending.retain(|_, pending| !pending.is_expired_at(now));
        before - self.pending.len()
    }
}

/// [`StateStore`] backed by a spawned [`StateAgent`]
#[derive(Clone)]
pub struct AgentStateStore {
    handle: AgentHandle,
    timeout: Duration,
}

impl std::fmt::Debug for AgentStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentStateStore")
            .field("handle", &"AgentHandle")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl AgentStateStore {
    /// Wrap an agent handle; every request waits at most `timeout`
    #[must_use]
    pub const fn new(handle: AgentHandle, timeout: Duration) -> Self {
        Self { handle, timeout }
    }

    /// Spawn a [`StateAgent`] and wrap it
    ///
    /// # Errors
    ///
    /// Returns error if agent initialization fails
    pub async fn spawn(
        runtime: &mut AgentRuntime,
        max_pending: usize,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let handle = StateAgent::spawn_with_capacity(runtime, max_pending).await?;
        Ok(Self::new(handle, timeout))
    }

    /// Periodically send [`SweepExpired`] to the agent
    ///
    /// The task runs until aborted or the runtime shuts down.
    #[must_use]
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let handle = self.handle.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                handle.send(SweepExpired).await;
            }
        })
    }

    /// Number of records held, tombstones included
    ///
    /// # Errors
    ///
    /// Returns error if the agent does not answer in time
    pub async fn len(&self) -> Result<usize, StoreError> {
        let (request, rx) = CountPending::new();
        self.handle.send(request).await;
        self.await_reply(rx).await
    }

    /// Trigger a sweep immediately
    pub async fn sweep_now(&self) {
        self.handle.send(SweepExpired).await;
    }

    async fn await_reply<T>(&self, rx: oneshot::Receiver<T>) -> Result<T, StoreError> {
        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(StoreError::Unavailable(
                "state agent dropped the reply channel".to_string(),
            )),
            Err(_) => Err(StoreError::Unavailable(format!(
                "state agent did not answer within {:?}",
                self.timeout
            ))),
        }
    }
}

#[async_trait]
impl StateStore for AgentStateStore {
    async fn put(&self, pending: PendingLogin) -> Result<(), StoreError> {
        let (request, rx) = StorePending::new(pending);
        self.handle.send(request).await;
        self.await_reply(rx).await?
    }

    async fn consume_if_valid(&self, state: &str) -> Result<ConsumeOutcome, StoreError> {
        let (request, rx) = ConsumePending::new(state.to_string());
        self.handle.send(request).await;
        self.await_reply(rx).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.len().await.map(|_| ())
    }
}

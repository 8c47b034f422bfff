//! `GET /auth/health`
//!
//! Reports whether the login flow can work: the provider credentials,
//! redirect URI and signing secret are configured, and the state store and
//! user database answer. Any failed component makes the whole response
//! `503 Service Unavailable`.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

use crate::config::PortalConfig;
use crate::state::PortalState;

/// Health of one component or of the whole service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Working
    Healthy,
    /// Not working
    Unhealthy,
}

/// Individual component health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component status
    pub status: HealthStatus,
    /// What is wrong, for unhealthy components
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Round-trip time of the probe
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
}

impl ComponentHealth {
    /// A healthy component
    #[must_use]
    pub const fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: None,
            response_time_ms: None,
        }
    }

    /// An unhealthy component
    #[must_use]
    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            response_time_ms: None,
        }
    }

    /// Healthy if `configured`, otherwise unhealthy with `missing`
    fn configured(configured: bool, missing: &str) -> Self {
        if configured {
            Self::healthy()
        } else {
            Self::unhealthy(missing)
        }
    }

    /// Record the probe time
    #[must_use]
    pub const fn with_response_time(mut self, ms: u64) -> Self {
        self.response_time_ms = Some(ms);
        self
    }
}

/// Body of `GET /auth/health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    /// Overall status
    pub status: HealthStatus,
    /// Crate version
    pub version: String,
    /// Configured provider
    pub provider: String,
    /// Per-component results
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthCheckResponse {
    /// Empty (healthy) response
    #[must_use]
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            version: env!("CARGO_PKG_VERSION").to_string(),
            provider: provider.into(),
            components: BTreeMap::new(),
        }
    }

    /// Add a component; an unhealthy one makes the response unhealthy
    pub fn add_component(&mut self, name: impl Into<String>, health: ComponentHealth) {
        if health.status == HealthStatus::Unhealthy {
            self.status = HealthStatus::Unhealthy;
        }
        self.components.insert(name.into(), health);
    }

    /// Add the configuration checks for `config`
    pub fn add_config_checks(&mut self, config: &PortalConfig) {
        self.add_component(
            "client_id",
            ComponentHealth::configured(
                !config.provider.client_id.is_empty(),
                "provider.client_id is not set",
            ),
        );
        self.add_component(
            "client_secret",
            ComponentHealth::configured(
                !config.provider.client_secret.is_empty(),
                "provider.client_secret is not set",
            ),
        );
        self.add_component(
            "redirect_uri",
            ComponentHealth::configured(
                !config.provider.redirect_uri.is_empty(),
                "provider.redirect_uri is not set",
            ),
        );
        self.add_component(
            "signing_secret",
            ComponentHealth::configured(
                !config.session.signing_secret.is_empty(),
                "session.signing_secret is not set",
            ),
        );
    }

    /// HTTP status for this response
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self.status {
            HealthStatus::Healthy => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for HealthCheckResponse {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// `GET /auth/health`
pub async fn health_check(State(state): State<PortalState>) -> HealthCheckResponse {
    let mut response = HealthCheckResponse::new(state.provider().name());
    response.add_config_checks(state.config());

    let started = Instant::now();
    let store = match state.state_store().ping().await {
        Ok(()) => ComponentHealth::healthy(),
        Err(e) => {
            tracing::warn!(error = %e, "State store health check failed");
            ComponentHealth::unhealthy("state store is not responding")
        }
    };
    response.add_component("state_store", store.with_response_time(elapsed_ms(started)));

    let started = Instant::now();
    let database = match state.users().ping().await {
        Ok(()) => ComponentHealth::healthy(),
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            ComponentHealth::unhealthy("database is not responding")
        }
    };
    response.add_component("database", database.with_response_time(elapsed_ms(started)));

    response
}

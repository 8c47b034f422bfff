//! portal-sso: OAuth2 single sign-on with PKCE and signed session cookies
//!
//! Users log in through one upstream OAuth2 provider using the Authorization
//! Code grant with PKCE (S256). The server keeps the CSRF state and the PKCE
//! verifier, consumes the state exactly once on callback, upserts the user
//! into a local SQLite directory and sets an HMAC-signed session cookie.
//! Protected routes validate that cookie statelessly.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use acton_reactive::prelude::ActonApp;
//! use portal_sso::{config::PortalConfig, router::auth_router, state::PortalState};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PortalConfig::load()?;
//!     config.validate()?;
//!
//!     // The in-process state store runs as an agent
//!     let mut runtime = ActonApp::launch();
//!     let state = PortalState::build(&mut runtime, config).await?;
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//!     axum::serve(listener, auth_router(state)).await?;
//!
//!     runtime.shutdown_all().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `redis` (default): Redis backend for the pending-login store

#![allow(clippy::missing_errors_doc)]

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod oauth2;
pub mod observability;
pub mod router;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub mod prelude {
    //! Common imports for applications embedding portal-sso
    //!
    //! ```rust
    //! use portal_sso::prelude::*;
    //! ```

    pub use crate::auth::{Authenticated, OptionalAuth, SessionClaims, SessionValidator, User};
    pub use crate::config::PortalConfig;
    pub use crate::error::AuthError;
    pub use crate::middleware::{AuthMiddleware, SessionLayer};
    pub use crate::router::auth_router;
    pub use crate::state::PortalState;
}

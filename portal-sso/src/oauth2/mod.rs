//! OAuth2 Authorization Code flow with PKCE
//!
//! One upstream provider, named by `provider.name` in the configuration and
//! used as the route segment (`/auth/<name>/login`, `/auth/<name>/callback`).
//!
//! The state token and PKCE verifier never leave the server: both are kept in
//! a [`StateStore`](store::StateStore) between the login redirect and the
//! callback, and the browser only ever sees the state and the S256 challenge.

pub mod handlers;
pub mod http;
pub mod pkce;
pub mod provider;
pub mod store;
pub mod types;

pub use pkce::PkcePair;
pub use provider::IdentityProvider;
pub use store::{ConsumeOutcome, PendingLogin, StateStore, StoreError};
pub use types::{OAuthError, OAuthToken, ProviderIdentity};

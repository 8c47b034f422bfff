//! Route table for the auth endpoints
//!
//! | Method | Path | Handler |
//! |---|---|---|
//! | GET | `/auth/<provider>/login` | [`initiate_login`] |
//! | GET | `/auth/<provider>/callback` | [`handle_callback`] |
//! | POST | `/auth/logout` | [`logout`] |
//! | GET | `/auth/me` | [`me`] |
//! | GET | `/auth/health` | [`health_check`] |
//! | POST | `/auth/test-login` | [`test_login`] (only when enabled) |

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{health_check, logout, me, test_login};
use crate::oauth2::handlers::{handle_callback, initiate_login};
use crate::state::PortalState;

/// Path of the test login route
pub const TEST_LOGIN_PATH: &str = "/auth/test-login";

/// Build the auth router for `state`
#[must_use]
pub fn auth_router(state: PortalState) -> Router {
    let provider = &state.config().provider;

    let mut router = Router::new()
        .route(&provider.login_path(), get(initiate_login))
        .route(&provider.callback_path(), get(handle_callback))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/auth/health", get(health_check));

    if state.config().test_login_enabled() {
        tracing::warn!(path = TEST_LOGIN_PATH, "Test login route is enabled");
        router = router.route(TEST_LOGIN_PATH, post(test_login));
    }

    router.with_state(state)
}

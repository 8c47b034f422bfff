//! Middleware layers for session validation and route protection

pub mod auth;
pub mod session;

pub use auth::{AuthMiddleware, AuthMiddlewareError};
pub use session::{SessionLayer, SessionMiddleware};

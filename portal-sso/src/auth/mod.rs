//! Users and sessions
//!
//! - [`user`]: the user directory, keyed by provider subject id
//! - [`session`]: signing and validating session tokens
//! - [`extractors`]: handler extractors for the current session

pub mod extractors;
pub mod session;
pub mod user;

pub use extractors::{Authenticated, OptionalAuth, Unauthenticated};
pub use session::{
    CookieSettings, IssuedSession, SessionClaims, SessionError, SessionIssuer, SessionValidator,
};
pub use user::{User, UserDirectory};

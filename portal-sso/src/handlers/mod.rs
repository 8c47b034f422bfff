//! HTTP handlers outside the OAuth2 redirect flow
//!
//! The login and callback handlers live in [`crate::oauth2::handlers`].

pub mod health;
pub mod session;

pub use health::health_check;
pub use session::{logout, me, test_login};

//! PKCE (RFC 7636) verifier and challenge generation
//!
//! Verifiers are 32 bytes of CSPRNG output encoded as base64url without
//! padding, which yields exactly 43 characters. The challenge is always the
//! `S256` transform of the verifier; the `plain` method is never offered.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Only challenge method this server emits
pub const CHALLENGE_METHOD: &str = "S256";

/// Random bytes behind every verifier and state token
const TOKEN_BYTES: usize = 32;

/// A PKCE verifier together with its derived challenge
#[derive(Clone, PartialEq, Eq)]
pub struct PkcePair {
    verifier: String,
    challenge: String,
}

impl PkcePair {
    /// Generate a fresh verifier and derive its challenge
    #[must_use]
    pub fn generate() -> Self {
        Self::from_verifier(random_token())
    }

    /// Derive the challenge for an existing verifier
    #[must_use]
    pub fn from_verifier(verifier: String) -> Self {
        let challenge = challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }

    /// Secret half, kept server side
    #[must_use]
    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    /// Public half, sent in the authorization URL
    #[must_use]
    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    /// Split into `(verifier, challenge)`
    #[must_use]
    pub fn into_parts(self) -> (String, String) {
        (self.verifier, self.challenge)
    }
}

impl std::fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkcePair")
            .field("verifier", &"<redacted>")
            .field("challenge", &self.challenge)
            .finish()
    }
}

/// `base64url(SHA256(verifier))` without padding
#[must_use]
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// 32 random bytes, base64url encoded without padding
///
/// Used for PKCE verifiers and for the CSRF `state` parameter.
#[must_use]
pub fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

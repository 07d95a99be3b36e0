//! PKCE verifier/challenge generation and callback state validation.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::error::AuthError;

const VERIFIER_BYTES: usize = 32;
const STATE_BYTES: usize = 16;

/// Only challenge method the connector issues.
pub const CHALLENGE_METHOD: &str = "S256";

/// Random 32-byte PKCE code verifier, base64url without padding (43 chars).
pub fn new_verifier() -> String {
    let mut buf = [0u8; VERIFIER_BYTES];
    OsRng.fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// Random 16-byte CSRF state, drawn separately from the verifier.
pub fn new_state() -> String {
    let mut buf = [0u8; STATE_BYTES];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// `base64url(SHA-256(verifier))` without padding.
pub fn challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Transient state bound to one authorization redirect.
///
/// Consumed by [`HandshakeState::validate`], which takes `self` by value so a
/// handshake can only be checked once.
#[derive(Clone, Serialize, Deserialize)]
pub struct HandshakeState {
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
    pub issued_at: DateTime<Utc>,
}

impl HandshakeState {
    /// Fresh state plus PKCE verifier.
    pub fn issue() -> Self {
        Self {
            state: new_state(),
            code_verifier: Some(new_verifier()),
            issued_at: Utc::now(),
        }
    }

    pub fn code_challenge(&self) -> Option<String> {
        self.code_verifier.as_deref().map(challenge)
    }

    /// Check the callback's `state` and release the retained verifier.
    ///
    /// The comparison is exact and constant-time. Fails when the callback
    /// carries no state, the states differ, or no verifier was retained.
    pub fn validate(self, returned_state: Option<&str>) -> Result<ValidatedHandshake, AuthError> {
        let Some(returned_state) = returned_state.filter(|s| !s.is_empty()) else {
            return Err(AuthError::HandshakeValidation(
                "callback carried no state".to_string(),
            ));
        };
        if !states_match(&self.state, returned_state) {
            return Err(AuthError::HandshakeValidation("state mismatch".to_string()));
        }
        let code_verifier = self
            .code_verifier
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AuthError::HandshakeValidation("no code verifier retained".to_string()))?;
        Ok(ValidatedHandshake {
            state: self.state,
            code_verifier,
        })
    }
}

impl fmt::Debug for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeState")
            .field("state", &"[REDACTED]")
            .field(
                "code_verifier",
                &self.code_verifier.as_ref().map(|_| "[REDACTED]"),
            )
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// A handshake whose state matched; carries what the code exchange needs.
pub struct ValidatedHandshake {
    pub state: String,
    pub code_verifier: String,
}

fn states_match(expected: &str, returned: &str) -> bool {
    expected.as_bytes().ct_eq(returned.as_bytes()).into()
}

//! Signed, time-boxed cookie carrying a [`HandshakeState`] between the
//! authorization redirect and its callback.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use super::error::AuthError;
use super::pkce::HandshakeState;
use super::token::ProviderId;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_LEN: usize = 32;

/// Lifetime of a handshake slot, matching the cookie `Max-Age`.
pub const HANDSHAKE_TTL_SECS: i64 = 10 * 60;

/// Name of the cookie holding one provider's handshake slot.
pub fn cookie_name(provider: ProviderId) -> String {
    format!("{provider}_oauth")
}

/// Signs and verifies handshake slots with HMAC-SHA256.
///
/// The sealed form is `base64url(signature || json)`. A slot opens only if
/// the signature verifies and it was issued less than
/// [`HANDSHAKE_TTL_SECS`] ago.
#[derive(Clone)]
pub struct HandshakeSealer {
    key: Vec<u8>,
    ttl: Duration,
}

impl HandshakeSealer {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            ttl: Duration::seconds(HANDSHAKE_TTL_SECS),
        }
    }

    /// Sealer with a random key; slots do not survive a restart.
    pub fn ephemeral() -> Self {
        let mut key = vec![0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self::new(key)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn seal(&self, handshake: &HandshakeState) -> Result<String, AuthError> {
        let payload = serde_json::to_vec(handshake)?;
        let mut mac = self.mac()?;
        mac.update(&payload);
        let signature = mac.finalize().into_bytes();

        let mut combined = signature.to_vec();
        combined.extend_from_slice(&payload);
        Ok(URL_SAFE_NO_PAD.encode(&combined))
    }

    pub fn open(&self, sealed: &str) -> Result<HandshakeState, AuthError> {
        let combined = URL_SAFE_NO_PAD
            .decode(sealed.trim())
            .map_err(|_| invalid("handshake cookie is not valid base64"))?;
        if combined.len() <= SIGNATURE_LEN {
            return Err(invalid("handshake cookie is truncated"));
        }
        let (signature, payload) = combined.split_at(SIGNATURE_LEN);

        let mut mac = self.mac()?;
        mac.update(payload);
        mac.verify_slice(signature)
            .map_err(|_| invalid("handshake cookie signature mismatch"))?;

        let handshake: HandshakeState = serde_json::from_slice(payload)
            .map_err(|_| invalid("handshake cookie payload is malformed"))?;

        let age = Utc::now() - handshake.issued_at;
        if age > self.ttl || age < -Duration::seconds(60) {
            return Err(invalid("handshake expired"));
        }
        Ok(handshake)
    }

    fn mac(&self) -> Result<HmacSha256, AuthError> {
        <HmacSha256 as Mac>::new_from_slice(&self.key)
            .map_err(|e| AuthError::Io(format!("HMAC init failed: {e}")))
    }
}

impl fmt::Debug for HandshakeSealer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeSealer")
            .field("key", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

fn invalid(reason: &str) -> AuthError {
    AuthError::HandshakeValidation(reason.to_string())
}

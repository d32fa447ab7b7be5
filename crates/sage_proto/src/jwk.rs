//! Ephemeral X25519 public keys as JWKs (RFC 8037 OKP form).
//!
//! Only `{"kty":"OKP","crv":"X25519","x":"<b64url>"}` is accepted; anything
//! else is an unsupported key.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};

use crate::ProtoError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EphemeralJwk {
    pub kty: String,
    pub crv: String,
    /// Raw public key, base64url without padding.
    pub x: String,
}

impl EphemeralJwk {
    pub fn from_public(public: &[u8; 32]) -> Self {
        Self {
            kty: "OKP".into(),
            crv: "X25519".into(),
            x: URL_SAFE_NO_PAD.encode(public),
        }
    }

    /// Decode and validate the public key bytes.
    pub fn public_bytes(&self) -> Result<[u8; 32], ProtoError> {
        if self.kty != "OKP" || self.crv != "X25519" {
            return Err(ProtoError::UnsupportedJwk(format!(
                "kty={} crv={}",
                self.kty, self.crv
            )));
        }
        let bytes = URL_SAFE_NO_PAD.decode(&self.x)?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| ProtoError::InvalidKey("JWK x must decode to 32 bytes".into()))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtoError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtoError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

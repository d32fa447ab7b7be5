//! Key derivation: HKDF-SHA256 expansion and the session key schedule.
//!
//! Schedule (both handshake sides derive identical bytes):
//!
//! ```text
//! ss             = X25519(own_eph_sk, peer_eph_pk)
//! derived_secret = HKDF(salt = "sage/handshake/v1", ikm = ss,
//!                       info = context_id || "|" || sorted(eph_pks), 32)
//! aead_key       = HKDF(derived_secret, info = "sage/aead/v1", 32)
//! mac_key        = HKDF(derived_secret, info = "sage/mac/v1",  32)
//! ```
//!
//! The two ephemeral public keys are sorted bytewise before entering `info`,
//! so initiator and responder agree on the schedule regardless of role.
//! `derived_secret` is zeroized as soon as both subkeys are expanded.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

pub const HANDSHAKE_SALT: &[u8] = b"sage/handshake/v1";
pub const AEAD_INFO: &[u8] = b"sage/aead/v1";
pub const MAC_INFO: &[u8] = b"sage/mac/v1";

/// Expand `ikm` + `info` into `output.len()` bytes of key material.
///
/// `salt` may be `None` (HKDF will use a zeroed salt).
pub fn hkdf_expand(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    output: &mut [u8],
) -> Result<(), CryptoError> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    hk.expand(info, output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

/// The two symmetric keys a session runs on.  Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct SessionKeys {
    pub aead_key: [u8; 32],
    pub mac_key: [u8; 32],
}

/// Run the full session key schedule from a raw X25519 shared secret.
pub fn derive_session_keys(
    context_id: &str,
    shared_secret: &[u8; 32],
    eph_a: &[u8; 32],
    eph_b: &[u8; 32],
) -> Result<SessionKeys, CryptoError> {
    let (lo, hi) = if eph_a <= eph_b {
        (eph_a, eph_b)
    } else {
        (eph_b, eph_a)
    };

    let mut info = Vec::with_capacity(context_id.len() + 1 + 64);
    info.extend_from_slice(context_id.as_bytes());
    info.push(b'|');
    info.extend_from_slice(lo);
    info.extend_from_slice(hi);

    let mut derived = [0u8; 32];
    hkdf_expand(shared_secret, Some(HANDSHAKE_SALT), &info, &mut derived)?;

    let mut aead_key = [0u8; 32];
    let mut mac_key = [0u8; 32];
    hkdf_expand(&derived, None, AEAD_INFO, &mut aead_key)?;
    hkdf_expand(&derived, None, MAC_INFO, &mut mac_key)?;
    derived.zeroize();

    Ok(SessionKeys { aead_key, mac_key })
}

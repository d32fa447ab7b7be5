//! HMAC-SHA-256 tagging for session-signed signature bases.
//!
//! Verification is constant-time via the `hmac` crate's `verify_slice`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA-256 over `data`.
pub fn tag(key: &[u8; 32], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Constant-time verification of an HMAC-SHA-256 tag.
pub fn verify(key: &[u8; 32], data: &[u8], expected: &[u8]) -> Result<(), CryptoError> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.verify_slice(expected)
        .map_err(|_| CryptoError::SignatureVerification)
}

//! Authenticated Encryption with Associated Data
//!
//! Uses AES-256-GCM.  Key size: 32 bytes.  Nonce: 12 bytes, supplied by the
//! caller (the session layer derives it from its send counter).  Tag: 16 bytes.
//!
//! [`seal`]/[`open`] work on `ciphertext ‖ tag` as produced by the cipher;
//! the session wire format (`nonce ‖ tag ‖ ciphertext`) is assembled by
//! [`encode_wire`]/[`decode_wire`].

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Encrypt `plaintext` under a 32-byte key with the given 12-byte nonce.
/// Returns `ciphertext ‖ tag`.
pub fn seal(
    key: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::AeadEncrypt)
}

/// Decrypt `ciphertext ‖ tag` under a 32-byte key.
pub fn open(
    key: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::AeadDecrypt)?;
    Ok(Zeroizing::new(plaintext))
}

/// Assemble the session wire format: `nonce ‖ tag ‖ ciphertext`.
pub fn encode_wire(nonce: &[u8; NONCE_LEN], ct_and_tag: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if ct_and_tag.len() < TAG_LEN {
        return Err(CryptoError::AeadEncrypt);
    }
    let (ct, tag) = ct_and_tag.split_at(ct_and_tag.len() - TAG_LEN);
    let mut out = Vec::with_capacity(NONCE_LEN + ct_and_tag.len());
    out.extend_from_slice(nonce);
    out.extend_from_slice(tag);
    out.extend_from_slice(ct);
    Ok(out)
}

/// Split the session wire format back into (nonce, `ciphertext ‖ tag`).
pub fn decode_wire(wire: &[u8]) -> Result<([u8; NONCE_LEN], Vec<u8>), CryptoError> {
    if wire.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::AeadDecrypt);
    }
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&wire[..NONCE_LEN]);
    let tag = &wire[NONCE_LEN..NONCE_LEN + TAG_LEN];
    let ct = &wire[NONCE_LEN + TAG_LEN..];
    let mut ct_and_tag = Vec::with_capacity(ct.len() + TAG_LEN);
    ct_and_tag.extend_from_slice(ct);
    ct_and_tag.extend_from_slice(tag);
    Ok((nonce, ct_and_tag))
}

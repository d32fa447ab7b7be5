//! HPKE base-mode seal/open (RFC 9180).
//!
//! Fixed suite: KEM = DHKEM(X25519, HKDF-SHA256), KDF = HKDF-SHA256,
//! AEAD = AES-256-GCM.  Each payload gets a fresh single-shot context; the
//! handshake never reuses an encapsulation.
//!
//! Sealed wire format: `enc (32 bytes) ‖ ciphertext`, where `enc` is the
//! encapsulated KEM share.  Recipient keys are raw 32-byte X25519 keys, the
//! same material a [`crate::keys::KemKeyPair`] holds.

use hpke::{
    aead::AesGcm256, kdf::HkdfSha256, kem::X25519HkdfSha256, Deserializable, Kem as KemTrait,
    OpModeR, OpModeS, Serializable,
};
use rand::rngs::OsRng;

use crate::error::CryptoError;

type Kem = X25519HkdfSha256;

/// Length of the encapsulated KEM share prefix in the sealed wire format.
pub const ENCAPPED_KEY_LEN: usize = 32;

/// Seal `plaintext` to a recipient's raw X25519 public key.
/// Returns `enc ‖ ciphertext`.
pub fn seal(
    recipient_pk: &[u8; 32],
    info: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let pk = <Kem as KemTrait>::PublicKey::from_bytes(recipient_pk)
        .map_err(|_| CryptoError::InvalidKey("invalid X25519 recipient key".into()))?;

    let (enc, ciphertext) = hpke::single_shot_seal::<AesGcm256, HkdfSha256, Kem, _>(
        &OpModeS::Base,
        &pk,
        info,
        plaintext,
        aad,
        &mut OsRng,
    )
    .map_err(|_| CryptoError::HpkeSeal)?;

    let mut out = Vec::with_capacity(ENCAPPED_KEY_LEN + ciphertext.len());
    out.extend_from_slice(&enc.to_bytes());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open `enc ‖ ciphertext` with the recipient's raw X25519 secret key.
pub fn open(
    recipient_sk: &[u8; 32],
    sealed: &[u8],
    info: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < ENCAPPED_KEY_LEN {
        return Err(CryptoError::HpkeOpen);
    }
    let (enc_bytes, ciphertext) = sealed.split_at(ENCAPPED_KEY_LEN);

    let sk = <Kem as KemTrait>::PrivateKey::from_bytes(recipient_sk)
        .map_err(|_| CryptoError::InvalidKey("invalid X25519 recipient secret".into()))?;
    let enc = <Kem as KemTrait>::EncappedKey::from_bytes(enc_bytes)
        .map_err(|_| CryptoError::HpkeOpen)?;

    hpke::single_shot_open::<AesGcm256, HkdfSha256, Kem>(
        &OpModeR::Base,
        &sk,
        &enc,
        info,
        ciphertext,
        aad,
    )
    .map_err(|_| CryptoError::HpkeOpen)
}

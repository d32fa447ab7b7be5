//! Long-term agent key material.
//!
//! Each agent holds two long-term key pairs, both published through the DID
//! registry:
//!   - a `SigningKeyPair` (Ed25519) that signs handshake envelopes and
//!     RFC 9421 request bases, and
//!   - a `KemKeyPair` (X25519) that receives HPKE-sealed handshake payloads.
//!
//! Private halves never leave the owning process and are zeroized on drop.
//! Public halves travel base64url-encoded (no padding) on the wire.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;

/// Tag for the two long-term key algorithms an agent publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyAlgorithm {
    Ed25519,
    X25519,
}

/// All key material in this crate is exactly 32 bytes; everything that
/// crosses a boundary funnels through this check.
fn to_key32(bytes: &[u8], what: &str) -> Result<[u8; 32], CryptoError> {
    <[u8; 32]>::try_from(bytes).map_err(|_| {
        CryptoError::InvalidKey(format!("{what}: expected 32 bytes, have {}", bytes.len()))
    })
}

// ── Public key newtype ────────────────────────────────────────────────────────

/// 32-byte public key, base64url-encoded on the wire.  Fixed-size by
/// construction, so downstream consumers never re-validate length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKeyBytes([u8; 32]);

impl PublicKeyBytes {
    pub fn new(raw: [u8; 32]) -> Self {
        Self(raw)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    pub fn from_b64(s: &str) -> Result<Self, CryptoError> {
        let decoded = URL_SAFE_NO_PAD.decode(s)?;
        Ok(Self(to_key32(&decoded, "public key")?))
    }

    /// Short fingerprint for logs and operator display: SHA-256 of the key,
    /// truncated to 8 bytes, hex-encoded.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        hex::encode(&digest[..8])
    }
}

// ── Signing key pair (Ed25519) ────────────────────────────────────────────────

/// Long-term Ed25519 signing key.  Drop clears memory via ZeroizeOnDrop.
#[derive(ZeroizeOnDrop)]
pub struct SigningKeyPair {
    #[zeroize(skip)]
    pub public: PublicKeyBytes,
    secret_bytes: [u8; 32],
}

impl SigningKeyPair {
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let secret = to_key32(bytes, "Ed25519 secret")?;
        Ok(Self::from_signing_key(SigningKey::from_bytes(&secret)))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        Self {
            public: PublicKeyBytes::new(signing_key.verifying_key().to_bytes()),
            secret_bytes: signing_key.to_bytes(),
        }
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        KeyAlgorithm::Ed25519
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret_bytes
    }

    fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.secret_bytes)
    }

    /// Sign arbitrary bytes; returns the 64-byte raw Ed25519 signature.
    pub fn sign(&self, msg: &[u8]) -> Vec<u8> {
        self.signing_key().sign(msg).to_bytes().to_vec()
    }

    pub fn public_b64(&self) -> String {
        self.public.to_b64()
    }
}

/// Verify an Ed25519 signature against a published public key.
pub fn ed25519_verify(
    public: &PublicKeyBytes,
    msg: &[u8],
    sig_bytes: &[u8],
) -> Result<(), CryptoError> {
    let vk = VerifyingKey::from_bytes(public.as_bytes())
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let sig_raw: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("signature: expected 64 bytes".into()))?;
    vk.verify(msg, &Signature::from_bytes(&sig_raw))
        .map_err(|_| CryptoError::SignatureVerification)
}

// ── KEM key pair (X25519) ─────────────────────────────────────────────────────

/// Long-term X25519 key pair; the public half receives HPKE-sealed payloads.
#[derive(ZeroizeOnDrop)]
pub struct KemKeyPair {
    #[zeroize(skip)]
    pub public: PublicKeyBytes,
    secret_bytes: [u8; 32],
}

impl KemKeyPair {
    pub fn generate() -> Self {
        Self::from_secret(StaticSecret::random_from_rng(OsRng))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let secret = to_key32(bytes, "X25519 secret")?;
        Ok(Self::from_secret(StaticSecret::from(secret)))
    }

    fn from_secret(secret: StaticSecret) -> Self {
        Self {
            public: PublicKeyBytes::new(*X25519Public::from(&secret).as_bytes()),
            secret_bytes: secret.to_bytes(),
        }
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        KeyAlgorithm::X25519
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret_bytes
    }

    pub fn public_b64(&self) -> String {
        self.public.to_b64()
    }
}

// ── Ephemeral X25519 ──────────────────────────────────────────────────────────

/// Generate a fresh X25519 keypair as raw bytes.  Used for the per-handshake
/// ephemeral keys; the secret is discarded after key derivation.
pub fn x25519_keygen() -> ([u8; 32], [u8; 32]) {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = X25519Public::from(&secret);
    (*public.as_bytes(), secret.to_bytes())
}

/// X25519 Diffie-Hellman between a local secret and a peer public key.
pub fn x25519_dh(secret: &[u8; 32], peer_public: &[u8; 32]) -> [u8; 32] {
    let sk = StaticSecret::from(*secret);
    let pk = X25519Public::from(*peer_public);
    *sk.diffie_hellman(&pk).as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let kp = SigningKeyPair::generate();
        let sig = kp.sign(b"agent message");
        ed25519_verify(&kp.public, b"agent message", &sig).unwrap();
    }

    #[test]
    fn rejects_tampered_message() {
        let kp = SigningKeyPair::generate();
        let sig = kp.sign(b"agent message");
        assert!(ed25519_verify(&kp.public, b"agent massage", &sig).is_err());
    }

    #[test]
    fn rejects_wrong_key() {
        let kp = SigningKeyPair::generate();
        let other = SigningKeyPair::generate();
        let sig = kp.sign(b"agent message");
        assert!(ed25519_verify(&other.public, b"agent message", &sig).is_err());
    }

    #[test]
    fn from_bytes_restores_same_public_key() {
        let kp = SigningKeyPair::generate();
        let restored = SigningKeyPair::from_bytes(kp.secret_bytes()).unwrap();
        assert_eq!(restored.public, kp.public);
        assert!(SigningKeyPair::from_bytes(&[0u8; 31]).is_err());
    }

    #[test]
    fn dh_is_commutative() {
        let (pk_a, sk_a) = x25519_keygen();
        let (pk_b, sk_b) = x25519_keygen();
        assert_eq!(x25519_dh(&sk_a, &pk_b), x25519_dh(&sk_b, &pk_a));
    }

    #[test]
    fn fingerprint_is_short_stable_hex() {
        let key = PublicKeyBytes::new([9u8; 32]);
        let fp = key.fingerprint();
        assert_eq!(fp.len(), 16);
        assert_eq!(fp, key.fingerprint());
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn public_key_b64_roundtrip() {
        let kp = KemKeyPair::generate();
        let restored = PublicKeyBytes::from_b64(&kp.public_b64()).unwrap();
        assert_eq!(restored, kp.public);
    }

    #[test]
    fn from_b64_rejects_short_key() {
        let short = URL_SAFE_NO_PAD.encode([0u8; 16]);
        assert!(PublicKeyBytes::from_b64(&short).is_err());
    }
}

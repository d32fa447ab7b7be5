//! sage_crypto — SAGE cryptographic primitives
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - The suite is fixed: Ed25519 signatures, X25519 key agreement,
//!   HKDF-SHA256, AES-256-GCM, HPKE base mode with
//!   DHKEM(X25519, HKDF-SHA256) / HKDF-SHA256 / AES-256-GCM.
//! - Zeroize all secret material on drop.
//! - No operation partially succeeds; any tag or verification failure
//!   surfaces as a [`CryptoError`].
//!
//! # Module layout
//! - `keys`  — long-term Ed25519 signing and X25519 KEM key pairs
//! - `aead`  — AES-256-GCM seal/open with caller-supplied nonces
//! - `kdf`   — HKDF-SHA256 expansion + the session key schedule
//! - `hpke`  — HPKE base-mode single-shot seal/open
//! - `mac`   — HMAC-SHA-256 tag/verify (constant-time)
//! - `error` — unified error type

pub mod aead;
pub mod error;
pub mod hpke;
pub mod kdf;
pub mod keys;
pub mod mac;

pub use error::CryptoError;
pub use keys::{KeyAlgorithm, KemKeyPair, PublicKeyBytes, SigningKeyPair};

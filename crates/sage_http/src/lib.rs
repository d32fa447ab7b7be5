//! sage_http — RFC 9421 HTTP Message Signatures for the SAGE protected
//! endpoint
//!
//! The signer covers a fixed set of derived and header components
//! (`@method`, `@path`, `@authority`, `date`, `content-digest`), builds the
//! canonical signature base, signs it with either the agent's long-term
//! Ed25519 key or a session HMAC key, and emits the `Signature-Input` /
//! `Signature` header pair.  The verifier reverses the process and enforces
//! clock skew, maximum age, component presence, and algorithm agreement.
//!
//! This crate is transport-agnostic: callers describe the request through
//! [`RequestMeta`] rather than any specific HTTP library's types, and key
//! resolution is a callable so session/registry lookups stay outside.
//!
//! # Modules
//! - `component` — covered components and the request view
//! - `base`      — signature base construction (deterministic, side-effect-free)
//! - `params`    — signature parameters and header parsing/formatting
//! - `digest`    — `Content-Digest` helper (sha-256)
//! - `signer`    — produce the header pair
//! - `verifier`  — check the header pair
//! - `error`     — signature error kinds

pub mod base;
pub mod component;
pub mod digest;
pub mod error;
pub mod params;
pub mod signer;
pub mod verifier;

pub use base::signature_base;
pub use component::{default_components, CoveredComponent, RequestMeta};
pub use digest::{content_digest, verify_content_digest};
pub use error::SignatureError;
pub use params::{SignatureAlgorithm, SignatureInput, SignatureParams, DEFAULT_LABEL};
pub use signer::{sign_request, SignedHeaders, SignerKey};
pub use verifier::{verify_request, VerifierKey, VerifyOptions};

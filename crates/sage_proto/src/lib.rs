//! sage_proto — Handshake wire types for the SAGE secure channel
//!
//! All on-wire types are serialised to JSON and carried by whatever
//! transport the application chooses; the transport only adds framing.
//! Sealed material travels base64url-encoded without padding.
//!
//! # Modules
//! - `message`  — the four handshake phases as a tagged enum
//! - `envelope` — signing envelope binding a message to its sender key
//! - `jwk`      — ephemeral X25519 public keys as JWKs

pub mod envelope;
pub mod jwk;
pub mod message;

pub use envelope::SignedEnvelope;
pub use jwk::EphemeralJwk;
pub use message::{
    CompleteMessage, HandshakeMessage, InvitationMessage, ResponsePayload, SealedMessage,
};

#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    #[error("Envelope signature verification failed")]
    BadEnvelopeSignature,

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Unsupported JWK: {0}")]
    UnsupportedJwk(String),
}

use thiserror::Error;

use sage_crypto::CryptoError;
use sage_did::ResolverError;
use sage_proto::ProtoError;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found")]
    NotFound,

    #[error("Session closed")]
    Closed,

    #[error("Ciphertext counter already seen")]
    CounterReplayed,

    #[error("Decryption failed")]
    DecryptFailed,

    #[error("Crypto failure: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Store failure: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("Invitation rejected: {0}")]
    InvitationRejected(String),

    #[error("Handshake payload decryption failed")]
    DecryptFailed,

    #[error("Invalid ephemeral key material")]
    BadEphemeralKey,

    #[error("Envelope key does not match the registry record")]
    KeyMismatch,

    #[error("Handshake timed out")]
    Timeout,

    #[error("Wrong handshake phase: expected {expected}, got {got}")]
    Phase {
        expected: &'static str,
        got: &'static str,
    },

    #[error("Unknown handshake context `{0}`")]
    UnknownContext(String),

    #[error("Message addressed to wrong agent")]
    WrongReceiver,

    #[error("Resolver failure: {0}")]
    Resolver(#[from] ResolverError),

    #[error("Crypto failure: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Wire format error: {0}")]
    Proto(#[from] ProtoError),

    #[error("Session failure: {0}")]
    Session(#[from] SessionError),
}

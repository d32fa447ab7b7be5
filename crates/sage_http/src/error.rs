use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("Malformed signature header: {0}")]
    MalformedSignature(String),

    #[error("Unknown key id `{0}`")]
    UnknownKeyId(String),

    #[error("Algorithm mismatch: signature says {claimed}, key is {actual}")]
    AlgorithmMismatch { claimed: String, actual: String },

    #[error("Signature expired or not yet valid (created={created}, now={now})")]
    Expired { created: i64, now: i64 },

    #[error("Covered component `{0}` missing from message")]
    MissingComponent(String),

    #[error("Signature verification failed")]
    BadSignature,

    #[error("Content-Digest mismatch")]
    DigestMismatch,
}

//! HTTP status mapping.
//!
//! Bodies stay generic: a network caller learns `replay`, `no session`, or
//! `unauthorized`, never which cryptographic check failed.  Handlers log the
//! specifics under their correlation id before constructing one of these.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use sage_did::ResolverError;
use sage_session::HandshakeError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub reason: &'static str,
}

impl ApiError {
    pub fn bad_request(reason: &'static str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            reason,
        }
    }

    pub fn unauthorized(reason: &'static str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            reason,
        }
    }

    pub fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            reason: "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.reason }))).into_response()
    }
}

impl From<&HandshakeError> for ApiError {
    fn from(err: &HandshakeError) -> Self {
        match err {
            HandshakeError::Proto(_) => ApiError::bad_request("malformed handshake message"),
            HandshakeError::Phase { .. }
            | HandshakeError::UnknownContext(_)
            | HandshakeError::WrongReceiver => ApiError::bad_request("handshake phase error"),
            HandshakeError::InvitationRejected(_)
            | HandshakeError::KeyMismatch
            | HandshakeError::DecryptFailed
            | HandshakeError::BadEphemeralKey
            | HandshakeError::Timeout => ApiError::unauthorized("handshake rejected"),
            HandshakeError::Resolver(ResolverError::Transient(_)) => ApiError::internal(),
            HandshakeError::Resolver(_) => ApiError::unauthorized("handshake rejected"),
            HandshakeError::Crypto(_) | HandshakeError::Session(_) => ApiError::internal(),
        }
    }
}

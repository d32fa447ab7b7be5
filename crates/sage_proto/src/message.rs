//! Handshake phase payloads.
//!
//! Four phases travel between initiator and responder:
//!   Invitation (clear)  →  Request (sealed)  →  Response (sealed, reverse
//!   direction)  →  Complete (clear).
//!
//! Clear phases are JSON under a signing envelope.  Sealed phases carry
//! `enc ‖ ciphertext` HPKE output, base64url-encoded without padding, inside
//! the same envelope shape.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};

use sage_did::AgentDid;

use crate::jwk::EphemeralJwk;
use crate::ProtoError;

/// HPKE `info` string for every sealed handshake payload.
pub const HANDSHAKE_INFO: &[u8] = b"sage/handshake/v1";

/// One handshake message, tagged by phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandshakeMessage {
    Invitation(InvitationMessage),
    Request(SealedMessage),
    Response(SealedMessage),
    Complete(CompleteMessage),
}

impl HandshakeMessage {
    pub fn context_id(&self) -> &str {
        match self {
            Self::Invitation(m) => &m.context_id,
            Self::Request(m) | Self::Response(m) => &m.context_id,
            Self::Complete(m) => &m.context_id,
        }
    }

    pub fn sender_did(&self) -> &AgentDid {
        match self {
            Self::Invitation(m) => &m.sender_did,
            Self::Request(m) | Self::Response(m) => &m.sender_did,
            Self::Complete(m) => &m.sender_did,
        }
    }

    pub fn receiver_did(&self) -> &AgentDid {
        match self {
            Self::Invitation(m) => &m.receiver_did,
            Self::Request(m) | Self::Response(m) => &m.receiver_did,
            Self::Complete(m) => &m.receiver_did,
        }
    }

    pub fn phase_name(&self) -> &'static str {
        match self {
            Self::Invitation(_) => "invitation",
            Self::Request(_) => "request",
            Self::Response(_) => "response",
            Self::Complete(_) => "complete",
        }
    }
}

/// Phase 1 — clear-text opener carrying the context id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationMessage {
    pub context_id: String,
    pub sender_did: AgentDid,
    pub receiver_did: AgentDid,
    /// Free-form application payload, authenticated by the envelope signature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Phases 2 and 3 — HPKE-sealed material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedMessage {
    pub context_id: String,
    pub sender_did: AgentDid,
    pub receiver_did: AgentDid,
    /// `enc ‖ ciphertext`, base64url without padding.
    pub b64: String,
}

impl SealedMessage {
    pub fn encode(
        context_id: &str,
        sender_did: AgentDid,
        receiver_did: AgentDid,
        sealed: &[u8],
    ) -> Self {
        Self {
            context_id: context_id.to_string(),
            sender_did,
            receiver_did,
            b64: URL_SAFE_NO_PAD.encode(sealed),
        }
    }

    pub fn sealed_bytes(&self) -> Result<Vec<u8>, ProtoError> {
        Ok(URL_SAFE_NO_PAD.decode(&self.b64)?)
    }
}

/// Phase 4 — clear-text acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteMessage {
    pub context_id: String,
    pub sender_did: AgentDid,
    pub receiver_did: AgentDid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Plaintext inside the sealed Response: the responder's ephemeral key plus
/// the session identifiers it minted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub jwk: EphemeralJwk,
    pub session_id: String,
    pub key_id: String,
}

impl ResponsePayload {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtoError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtoError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn did(s: &str) -> AgentDid {
        AgentDid::parse(s).unwrap()
    }

    #[test]
    fn tagged_serialisation() {
        let msg = HandshakeMessage::Invitation(InvitationMessage {
            context_id: "ctx-42".into(),
            sender_did: did("did:sage:ethereum:alice"),
            receiver_did: did("did:sage:ethereum:server001"),
            payload: None,
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "invitation");
        assert_eq!(json["context_id"], "ctx-42");
        assert!(json.get("payload").is_none());
    }

    #[test]
    fn sealed_message_roundtrip() {
        let msg = SealedMessage::encode(
            "ctx-1",
            did("did:sage:local:a"),
            did("did:sage:local:b"),
            &[0xde, 0xad, 0xbe, 0xef],
        );
        assert_eq!(msg.sealed_bytes().unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        // URL-safe alphabet, no padding
        assert!(!msg.b64.contains('='));
    }

    #[test]
    fn response_payload_roundtrip() {
        let payload = ResponsePayload {
            jwk: EphemeralJwk::from_public(&[5u8; 32]),
            session_id: "sid".into(),
            key_id: "kid".into(),
        };
        let restored = ResponsePayload::from_bytes(&payload.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.key_id, "kid");
        assert_eq!(restored.jwk.public_bytes().unwrap(), [5u8; 32]);
    }
}

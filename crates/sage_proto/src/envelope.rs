//! Signing envelope for handshake messages.
//!
//! Every handshake message travels with the sender's long-term Ed25519
//! public key and a signature over the message's deterministic
//! serialisation.  The receiver verifies the signature against the embedded
//! key AND checks that key against the sender's registry record; a mismatch
//! means the envelope was not produced by the DID it claims.
//!
//! The signing payload is built with `serde_json::json!` — field ordering is
//! stable (serde_json sorts map keys alphabetically by default), so both
//! ends serialise identical bytes.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::json;

use sage_crypto::{keys::ed25519_verify, PublicKeyBytes, SigningKeyPair};

use crate::message::HandshakeMessage;
use crate::ProtoError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedEnvelope {
    pub message: HandshakeMessage,
    /// Sender's Ed25519 public key, base64url without padding.
    pub sender_pubkey: String,
    /// Ed25519 signature over the deterministic message serialisation,
    /// base64url without padding.
    pub signature: String,
}

impl SignedEnvelope {
    /// Sign `message` with the sender's long-term key.
    pub fn seal(message: HandshakeMessage, identity: &SigningKeyPair) -> Result<Self, ProtoError> {
        let payload = signing_payload(&message)?;
        let sig = identity.sign(&payload);
        Ok(Self {
            message,
            sender_pubkey: identity.public_b64(),
            signature: URL_SAFE_NO_PAD.encode(sig),
        })
    }

    /// Verify the signature against the embedded sender key.
    pub fn verify(&self) -> Result<(), ProtoError> {
        let payload = signing_payload(&self.message)?;
        let key = self.sender_public_key()?;
        let sig = URL_SAFE_NO_PAD.decode(&self.signature)?;
        ed25519_verify(&key, &payload, &sig).map_err(|_| ProtoError::BadEnvelopeSignature)
    }

    pub fn sender_public_key(&self) -> Result<PublicKeyBytes, ProtoError> {
        PublicKeyBytes::from_b64(&self.sender_pubkey)
            .map_err(|e| ProtoError::InvalidKey(e.to_string()))
    }
}

/// Deterministic bytes the envelope signature covers.
fn signing_payload(message: &HandshakeMessage) -> Result<Vec<u8>, ProtoError> {
    let value = match message {
        HandshakeMessage::Invitation(m) => json!({
            "context_id": m.context_id,
            "payload": m.payload,
            "receiver_did": m.receiver_did,
            "sender_did": m.sender_did,
            "type": "invitation",
        }),
        HandshakeMessage::Request(m) => json!({
            "b64": m.b64,
            "context_id": m.context_id,
            "receiver_did": m.receiver_did,
            "sender_did": m.sender_did,
            "type": "request",
        }),
        HandshakeMessage::Response(m) => json!({
            "b64": m.b64,
            "context_id": m.context_id,
            "receiver_did": m.receiver_did,
            "sender_did": m.sender_did,
            "type": "response",
        }),
        HandshakeMessage::Complete(m) => json!({
            "context_id": m.context_id,
            "payload": m.payload,
            "receiver_did": m.receiver_did,
            "sender_did": m.sender_did,
            "type": "complete",
        }),
    };
    Ok(serde_json::to_vec(&value)?)
}

#[cfg(test)]
mod tests {
    use sage_did::AgentDid;

    use super::*;
    use crate::message::InvitationMessage;

    fn invitation() -> HandshakeMessage {
        HandshakeMessage::Invitation(InvitationMessage {
            context_id: "ctx-42".into(),
            sender_did: AgentDid::parse("did:sage:ethereum:alice").unwrap(),
            receiver_did: AgentDid::parse("did:sage:ethereum:server001").unwrap(),
            payload: Some(serde_json::json!({"hello": true})),
        })
    }

    #[test]
    fn seal_verify_roundtrip() {
        let identity = SigningKeyPair::generate();
        let env = SignedEnvelope::seal(invitation(), &identity).unwrap();
        env.verify().unwrap();
        assert_eq!(env.sender_public_key().unwrap(), identity.public);
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let identity = SigningKeyPair::generate();
        let mut env = SignedEnvelope::seal(invitation(), &identity).unwrap();
        if let HandshakeMessage::Invitation(ref mut m) = env.message {
            m.context_id = "ctx-43".into();
        }
        assert!(env.verify().is_err());
    }

    #[test]
    fn verify_rejects_swapped_key() {
        let identity = SigningKeyPair::generate();
        let other = SigningKeyPair::generate();
        let mut env = SignedEnvelope::seal(invitation(), &identity).unwrap();
        env.sender_pubkey = other.public_b64();
        assert!(env.verify().is_err());
    }

    #[test]
    fn envelope_survives_json_transport() {
        let identity = SigningKeyPair::generate();
        let env = SignedEnvelope::seal(invitation(), &identity).unwrap();
        let wire = serde_json::to_string(&env).unwrap();
        let parsed: SignedEnvelope = serde_json::from_str(&wire).unwrap();
        parsed.verify().unwrap();
    }
}

//! Three-phase handshake: Invitation → Request → Complete.
//!
//! Protocol (initiator left, responder right):
//!
//! ```text
//!   Invitation  ──────────▶   clear JSON, signed with the long-term key
//!   Request     ──────────▶   initiator ephemeral X25519 as JWK,
//!                             HPKE-sealed to the responder's KEM key
//!               ◀──────────   Response: responder ephemeral JWK + freshly
//!                             minted session_id/key_id, HPKE-sealed to the
//!                             initiator's KEM key
//!   Complete    ──────────▶   clear JSON acknowledgement, signed
//! ```
//!
//! Every envelope is verified two ways: the signature must check out against
//! the embedded sender key, and that key must equal the sender's published
//! registry record (`KeyMismatch` otherwise).
//!
//! Both sides run the same key schedule over `X25519(own_eph, peer_eph)`;
//! ephemeral secrets are zeroized right after the derivation.  A phase not
//! advanced within 30 s fails the handshake and destroys the context; a
//! responder context that dies before Complete also closes the session it
//! provisioned.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;
use zeroize::Zeroizing;

use sage_crypto::{hpke, kdf, keys, KemKeyPair, SigningKeyPair};
use sage_did::{resolve_with_retry, AgentDid, DidResolver, ResolverError};
use sage_proto::{
    CompleteMessage, EphemeralJwk, HandshakeMessage, InvitationMessage, ProtoError,
    ResponsePayload, SealedMessage, SignedEnvelope,
};

use crate::error::HandshakeError;
use crate::manager::{SessionManager, SessionParams};
use crate::session::{KeyId, SecureSession, SessionId};

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    AwaitingInvitation,
    AwaitingRequest,
    AwaitingComplete,
    Established,
    Failed,
}

impl HandshakePhase {
    fn name(&self) -> &'static str {
        match self {
            Self::AwaitingInvitation => "awaiting_invitation",
            Self::AwaitingRequest => "awaiting_request",
            Self::AwaitingComplete => "awaiting_complete",
            Self::Established => "established",
            Self::Failed => "failed",
        }
    }
}

/// Verify an envelope and check its key against the sender's registry record.
async fn authenticate_sender(
    envelope: &SignedEnvelope,
    resolver: &dyn DidResolver,
) -> Result<(), HandshakeError> {
    envelope.verify()?;
    let published = resolve_with_retry(resolver, envelope.message.sender_did())
        .await?
        .signing_key;
    if published != envelope.sender_public_key()? {
        return Err(HandshakeError::KeyMismatch);
    }
    Ok(())
}

// ── Initiator ────────────────────────────────────────────────────────────────

/// Client half of the handshake.  One instance per attempt; drives the
/// phases in order and hands the finished session to the manager.
pub struct Initiator {
    own_did: AgentDid,
    peer_did: AgentDid,
    identity: Arc<SigningKeyPair>,
    kem: Arc<KemKeyPair>,
    resolver: Arc<dyn DidResolver>,
    manager: Arc<SessionManager>,
    context_id: String,
    phase: HandshakePhase,
    eph_secret: Option<Zeroizing<[u8; 32]>>,
    eph_public: Option<[u8; 32]>,
    started_at: Instant,
    timeout: Duration,
}

impl Initiator {
    pub fn new(
        own_did: AgentDid,
        peer_did: AgentDid,
        identity: Arc<SigningKeyPair>,
        kem: Arc<KemKeyPair>,
        resolver: Arc<dyn DidResolver>,
        manager: Arc<SessionManager>,
    ) -> Self {
        Self {
            own_did,
            peer_did,
            identity,
            kem,
            resolver,
            manager,
            context_id: Uuid::new_v4().to_string(),
            phase: HandshakePhase::AwaitingInvitation,
            eph_secret: None,
            eph_public: None,
            started_at: Instant::now(),
            timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    fn expect_phase(&mut self, expected: HandshakePhase) -> Result<(), HandshakeError> {
        if self.started_at.elapsed() > self.timeout {
            self.phase = HandshakePhase::Failed;
            return Err(HandshakeError::Timeout);
        }
        if self.phase != expected {
            return Err(HandshakeError::Phase {
                expected: expected.name(),
                got: self.phase.name(),
            });
        }
        Ok(())
    }

    /// Phase 1: signed clear-text invitation.
    pub fn invitation(
        &mut self,
        payload: Option<serde_json::Value>,
    ) -> Result<SignedEnvelope, HandshakeError> {
        self.expect_phase(HandshakePhase::AwaitingInvitation)?;
        let message = HandshakeMessage::Invitation(InvitationMessage {
            context_id: self.context_id.clone(),
            sender_did: self.own_did.clone(),
            receiver_did: self.peer_did.clone(),
            payload,
        });
        let envelope = SignedEnvelope::seal(message, &self.identity)?;
        self.phase = HandshakePhase::AwaitingRequest;
        debug!(context_id = %self.context_id, peer = %self.peer_did, "invitation sent");
        Ok(envelope)
    }

    /// Phase 2: generate the ephemeral key and seal it to the responder.
    pub async fn request(&mut self) -> Result<SignedEnvelope, HandshakeError> {
        self.expect_phase(HandshakePhase::AwaitingRequest)?;

        let peer_kem = resolve_with_retry(self.resolver.as_ref(), &self.peer_did)
            .await?
            .kem_key;

        let (eph_public, eph_secret) = keys::x25519_keygen();
        let jwk = EphemeralJwk::from_public(&eph_public).to_bytes()?;
        let sealed = hpke::seal(
            peer_kem.as_bytes(),
            sage_proto::message::HANDSHAKE_INFO,
            b"",
            &jwk,
        )?;

        self.eph_secret = Some(Zeroizing::new(eph_secret));
        self.eph_public = Some(eph_public);

        let message = HandshakeMessage::Request(SealedMessage::encode(
            &self.context_id,
            self.own_did.clone(),
            self.peer_did.clone(),
            &sealed,
        ));
        let envelope = SignedEnvelope::seal(message, &self.identity)?;
        self.phase = HandshakePhase::AwaitingComplete;
        debug!(context_id = %self.context_id, "request sent");
        Ok(envelope)
    }

    /// Process the responder's sealed Response, derive the session, and
    /// produce the final Complete acknowledgement.
    pub async fn complete(
        &mut self,
        response: &SignedEnvelope,
    ) -> Result<(Arc<SecureSession>, SignedEnvelope), HandshakeError> {
        self.expect_phase(HandshakePhase::AwaitingComplete)?;

        authenticate_sender(response, self.resolver.as_ref()).await?;
        let sealed = match &response.message {
            HandshakeMessage::Response(m) => {
                if m.context_id != self.context_id {
                    return Err(HandshakeError::UnknownContext(m.context_id.clone()));
                }
                if m.sender_did != self.peer_did || m.receiver_did != self.own_did {
                    return Err(HandshakeError::WrongReceiver);
                }
                m.sealed_bytes()?
            }
            other => {
                return Err(HandshakeError::Phase {
                    expected: "response",
                    got: other.phase_name(),
                })
            }
        };

        let opened = hpke::open(
            self.kem.secret_bytes(),
            &sealed,
            sage_proto::message::HANDSHAKE_INFO,
            b"",
        )
        .map_err(|_| HandshakeError::DecryptFailed)?;
        let payload =
            ResponsePayload::from_bytes(&opened).map_err(|_| HandshakeError::BadEphemeralKey)?;
        let peer_eph = payload
            .jwk
            .public_bytes()
            .map_err(|_| HandshakeError::BadEphemeralKey)?;

        let eph_secret = self
            .eph_secret
            .take()
            .ok_or(HandshakeError::BadEphemeralKey)?;
        let eph_public = self.eph_public.ok_or(HandshakeError::BadEphemeralKey)?;
        let shared = Zeroizing::new(keys::x25519_dh(&eph_secret, &peer_eph));
        let session_keys = kdf::derive_session_keys(&self.context_id, &shared, &eph_public, &peer_eph)?;

        let session = self
            .manager
            .new_session(SessionParams {
                peer_did: self.peer_did.clone(),
                keys: session_keys,
                session_id: Some(SessionId::from(payload.session_id)),
                key_id: Some(KeyId::from(payload.key_id)),
                config: None,
            })
            .await?;

        let message = HandshakeMessage::Complete(CompleteMessage {
            context_id: self.context_id.clone(),
            sender_did: self.own_did.clone(),
            receiver_did: self.peer_did.clone(),
            payload: None,
        });
        let envelope = SignedEnvelope::seal(message, &self.identity)?;
        self.phase = HandshakePhase::Established;
        info!(
            context_id = %self.context_id,
            session_id = %session.session_id(),
            "handshake established (initiator)"
        );
        Ok((session, envelope))
    }
}

// ── Responder ────────────────────────────────────────────────────────────────

struct ResponderContext {
    peer_did: AgentDid,
    phase: HandshakePhase,
    session_id: Option<SessionId>,
    started_at: Instant,
}

/// Server half of the handshake.  Tracks one context per `context_id` and
/// provisions the session when the Request arrives.
pub struct Responder {
    own_did: AgentDid,
    identity: Arc<SigningKeyPair>,
    kem: Arc<KemKeyPair>,
    resolver: Arc<dyn DidResolver>,
    manager: Arc<SessionManager>,
    contexts: Mutex<HashMap<String, ResponderContext>>,
    timeout: Duration,
}

impl Responder {
    pub fn new(
        own_did: AgentDid,
        identity: Arc<SigningKeyPair>,
        kem: Arc<KemKeyPair>,
        resolver: Arc<dyn DidResolver>,
        manager: Arc<SessionManager>,
    ) -> Self {
        Self {
            own_did,
            identity,
            kem,
            resolver,
            manager,
            contexts: Mutex::new(HashMap::new()),
            timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn own_did(&self) -> &AgentDid {
        &self.own_did
    }

    /// Phase 1: authenticate the invitation and open a context.
    pub async fn on_invitation(&self, envelope: &SignedEnvelope) -> Result<(), HandshakeError> {
        let invitation = match &envelope.message {
            HandshakeMessage::Invitation(m) => m,
            other => {
                return Err(HandshakeError::Phase {
                    expected: "invitation",
                    got: other.phase_name(),
                })
            }
        };
        if invitation.receiver_did != self.own_did {
            return Err(HandshakeError::WrongReceiver);
        }

        match authenticate_sender(envelope, self.resolver.as_ref()).await {
            Ok(()) => {}
            Err(HandshakeError::KeyMismatch) => return Err(HandshakeError::KeyMismatch),
            Err(HandshakeError::Resolver(e @ ResolverError::Transient(_))) => {
                return Err(HandshakeError::Resolver(e))
            }
            Err(HandshakeError::Resolver(_)) => {
                return Err(HandshakeError::InvitationRejected(
                    "unknown or inactive sender".into(),
                ))
            }
            Err(HandshakeError::Proto(ProtoError::BadEnvelopeSignature)) => {
                return Err(HandshakeError::InvitationRejected("invalid signature".into()))
            }
            Err(other) => return Err(other),
        }

        let mut contexts = self.contexts.lock();
        if contexts.contains_key(&invitation.context_id) {
            return Err(HandshakeError::InvitationRejected(
                "duplicate context id".into(),
            ));
        }
        contexts.insert(
            invitation.context_id.clone(),
            ResponderContext {
                peer_did: invitation.sender_did.clone(),
                phase: HandshakePhase::AwaitingRequest,
                session_id: None,
                started_at: Instant::now(),
            },
        );
        debug!(context_id = %invitation.context_id, peer = %invitation.sender_did, "invitation accepted");
        Ok(())
    }

    /// Phase 2+3: open the sealed ephemeral, provision the session, and
    /// return the sealed Response.
    pub async fn on_request(
        &self,
        envelope: &SignedEnvelope,
    ) -> Result<SignedEnvelope, HandshakeError> {
        let request = match &envelope.message {
            HandshakeMessage::Request(m) => m,
            other => {
                return Err(HandshakeError::Phase {
                    expected: "request",
                    got: other.phase_name(),
                })
            }
        };
        if request.receiver_did != self.own_did {
            return Err(HandshakeError::WrongReceiver);
        }
        authenticate_sender(envelope, self.resolver.as_ref()).await?;
        self.advance_context(
            &request.context_id,
            &request.sender_did,
            HandshakePhase::AwaitingRequest,
        )?;

        let opened = hpke::open(
            self.kem.secret_bytes(),
            &request.sealed_bytes()?,
            sage_proto::message::HANDSHAKE_INFO,
            b"",
        )
        .map_err(|_| HandshakeError::DecryptFailed)?;
        let peer_eph = EphemeralJwk::from_bytes(&opened)
            .map_err(|_| HandshakeError::BadEphemeralKey)?
            .public_bytes()
            .map_err(|_| HandshakeError::BadEphemeralKey)?;

        let (eph_public, eph_secret) = keys::x25519_keygen();
        let eph_secret = Zeroizing::new(eph_secret);
        let shared = Zeroizing::new(keys::x25519_dh(&eph_secret, &peer_eph));
        let session_keys =
            kdf::derive_session_keys(&request.context_id, &shared, &eph_public, &peer_eph)?;

        let session = self
            .manager
            .new_session(SessionParams {
                peer_did: request.sender_did.clone(),
                keys: session_keys,
                session_id: None,
                key_id: None,
                config: None,
            })
            .await?;

        // Seal the response to the initiator's published KEM key.
        let initiator_kem = resolve_with_retry(self.resolver.as_ref(), &request.sender_did)
            .await?
            .kem_key;
        let payload = ResponsePayload {
            jwk: EphemeralJwk::from_public(&eph_public),
            session_id: session.session_id().to_string(),
            key_id: session.key_id().to_string(),
        };
        let sealed = hpke::seal(
            initiator_kem.as_bytes(),
            sage_proto::message::HANDSHAKE_INFO,
            b"",
            &payload.to_bytes()?,
        )?;

        {
            let mut contexts = self.contexts.lock();
            if let Some(ctx) = contexts.get_mut(&request.context_id) {
                ctx.phase = HandshakePhase::AwaitingComplete;
                ctx.session_id = Some(session.session_id().clone());
            }
        }

        let message = HandshakeMessage::Response(SealedMessage::encode(
            &request.context_id,
            self.own_did.clone(),
            request.sender_did.clone(),
            &sealed,
        ));
        debug!(
            context_id = %request.context_id,
            session_id = %session.session_id(),
            "request processed, session provisioned"
        );
        Ok(SignedEnvelope::seal(message, &self.identity)?)
    }

    /// Phase 4: mark the session established and retire the context.
    pub async fn on_complete(
        &self,
        envelope: &SignedEnvelope,
    ) -> Result<SessionId, HandshakeError> {
        let complete = match &envelope.message {
            HandshakeMessage::Complete(m) => m,
            other => {
                return Err(HandshakeError::Phase {
                    expected: "complete",
                    got: other.phase_name(),
                })
            }
        };
        if complete.receiver_did != self.own_did {
            return Err(HandshakeError::WrongReceiver);
        }
        authenticate_sender(envelope, self.resolver.as_ref()).await?;
        self.advance_context(
            &complete.context_id,
            &complete.sender_did,
            HandshakePhase::AwaitingComplete,
        )?;

        let ctx = self
            .contexts
            .lock()
            .remove(&complete.context_id)
            .ok_or_else(|| HandshakeError::UnknownContext(complete.context_id.clone()))?;
        let session_id = ctx
            .session_id
            .ok_or_else(|| HandshakeError::UnknownContext(complete.context_id.clone()))?;
        info!(
            context_id = %complete.context_id,
            session_id = %session_id,
            "handshake established (responder)"
        );
        Ok(session_id)
    }

    /// Validate phase and peer for a context; handles per-context timeout.
    fn advance_context(
        &self,
        context_id: &str,
        sender: &AgentDid,
        expected: HandshakePhase,
    ) -> Result<(), HandshakeError> {
        let mut contexts = self.contexts.lock();
        let timed_out = contexts
            .get(context_id)
            .map(|ctx| ctx.started_at.elapsed() > self.timeout)
            .ok_or_else(|| HandshakeError::UnknownContext(context_id.to_string()))?;
        if timed_out {
            contexts.remove(context_id);
            return Err(HandshakeError::Timeout);
        }
        let ctx = &contexts[context_id];
        if &ctx.peer_did != sender {
            return Err(HandshakeError::WrongReceiver);
        }
        if ctx.phase != expected {
            return Err(HandshakeError::Phase {
                expected: expected.name(),
                got: ctx.phase.name(),
            });
        }
        Ok(())
    }

    /// Destroy contexts that ran past the handshake timeout; sessions
    /// provisioned by a context that never completed are closed.
    pub async fn sweep_expired(&self) -> usize {
        let dead: Vec<(String, Option<SessionId>)> = {
            let mut contexts = self.contexts.lock();
            let expired: Vec<String> = contexts
                .iter()
                .filter(|(_, ctx)| ctx.started_at.elapsed() > self.timeout)
                .map(|(id, _)| id.clone())
                .collect();
            expired
                .into_iter()
                .filter_map(|id| contexts.remove(&id).map(|ctx| (id, ctx.session_id)))
                .collect()
        };

        let count = dead.len();
        for (context_id, session_id) in dead {
            debug!(context_id = %context_id, "handshake context timed out");
            if let Some(sid) = session_id {
                let _ = self.manager.close(&sid).await;
            }
        }
        count
    }

    #[cfg(test)]
    fn context_phase(&self, context_id: &str) -> Option<HandshakePhase> {
        self.contexts.lock().get(context_id).map(|c| c.phase)
    }
}

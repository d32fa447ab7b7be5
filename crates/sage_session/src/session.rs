//! The established symmetric session.
//!
//! # Wire format
//! `encrypt` produces `nonce (12) ‖ tag (16) ‖ ciphertext`.  The nonce is
//! the big-endian send counter in the low 8 bytes, top 4 bytes zero; AAD is
//! `session_id ‖ key_id`, so a ciphertext cannot be replayed into another
//! session even if keys ever collided.
//!
//! # Counters
//! `send_counter` only grows.  `recv_counter` stores one past the highest
//! counter accepted, so a replayed (or reordered-below-high-water) message
//! always fails; gaps from lost messages are tolerated.
//!
//! # Lifetime caps
//! A session expires on age, idle time, or total message count.  Every
//! operation fails with `SessionError::Closed` once expired, and an AEAD
//! failure during `decrypt` closes the session permanently.
//!
//! State sits behind one mutex per session: encrypt/decrypt/close on a
//! single session serialise, distinct sessions never contend.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sage_crypto::{aead, kdf::SessionKeys, mac};
use sage_did::AgentDid;

use crate::error::SessionError;

// ── Identifiers ──────────────────────────────────────────────────────────────

/// 128-bit random session identifier, returned to the initiator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable public session handle, used as the `keyid` signature parameter.
/// Distinct from [`SessionId`]: a peer holding only the key id can still
/// reach the session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyId(String);

impl KeyId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for KeyId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Configuration ────────────────────────────────────────────────────────────

/// Per-session lifetime caps.  Sessions keep their birth-time configuration
/// even if the manager defaults change later.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub max_age: Duration,
    pub idle_timeout: Duration,
    pub max_messages: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(3600),
            idle_timeout: Duration::from_secs(2),
            max_messages: 1000,
        }
    }
}

// ── Session ──────────────────────────────────────────────────────────────────

struct SessionState {
    send_counter: u64,
    /// One past the highest counter accepted by `decrypt`.
    recv_counter: u64,
    /// Successful encrypts + decrypts.
    message_count: u64,
    last_activity_at: DateTime<Utc>,
    closed: bool,
}

/// The post-handshake authenticated/encrypted channel.
pub struct SecureSession {
    session_id: SessionId,
    key_id: KeyId,
    peer_did: AgentDid,
    keys: SessionKeys,
    config: SessionConfig,
    created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
}

impl SecureSession {
    pub fn new(
        session_id: SessionId,
        key_id: KeyId,
        peer_did: AgentDid,
        keys: SessionKeys,
        config: SessionConfig,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            key_id,
            peer_did,
            keys,
            config,
            created_at: now,
            state: Mutex::new(SessionState {
                send_counter: 0,
                recv_counter: 0,
                message_count: 0,
                last_activity_at: now,
                closed: false,
            }),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    pub fn peer_did(&self) -> &AgentDid {
        &self.peer_did
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn aad(&self) -> Vec<u8> {
        let mut aad =
            Vec::with_capacity(self.session_id.as_str().len() + self.key_id.as_str().len());
        aad.extend_from_slice(self.session_id.as_str().as_bytes());
        aad.extend_from_slice(self.key_id.as_str().as_bytes());
        aad
    }

    fn counter_nonce(counter: u64) -> [u8; aead::NONCE_LEN] {
        let mut nonce = [0u8; aead::NONCE_LEN];
        nonce[4..].copy_from_slice(&counter.to_be_bytes());
        nonce
    }

    /// Age/idle/closed check, without the message cap.  Replies to an
    /// already-admitted request may still be encrypted once the cap is hit;
    /// the cap gates new inbound work via [`expired_state`](Self::is_expired).
    fn lifetime_expired(&self, state: &SessionState, now: DateTime<Utc>) -> bool {
        state.closed
            || now - self.created_at > to_chrono(self.config.max_age)
            || now - state.last_activity_at > to_chrono(self.config.idle_timeout)
    }

    fn expired_state(&self, state: &SessionState, now: DateTime<Utc>) -> bool {
        self.lifetime_expired(state, now) || state.message_count >= self.config.max_messages
    }

    /// Age, idle, or message-cap check.  A closed session is always expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expired_state(&self.state.lock(), now)
    }

    /// Mark the session permanently closed.  Idempotent.
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Encrypt an outbound payload.  Returns the wire bytes
    /// (`nonce ‖ tag ‖ ciphertext`) and advances the send counter.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, SessionError> {
        let mut state = self.state.lock();
        let now = Utc::now();
        if self.lifetime_expired(&state, now) {
            return Err(SessionError::Closed);
        }

        let nonce = Self::counter_nonce(state.send_counter);
        let ct = aead::seal(&self.keys.aead_key, &nonce, &self.aad(), plaintext)?;
        let wire = aead::encode_wire(&nonce, &ct)?;

        state.send_counter += 1;
        state.message_count += 1;
        state.last_activity_at = now;
        Ok(wire)
    }

    /// Decrypt an inbound wire message.  Rejects counters at or below the
    /// high-water mark; an authentication failure closes the session.
    pub fn decrypt(&self, wire: &[u8]) -> Result<Vec<u8>, SessionError> {
        let mut state = self.state.lock();
        let now = Utc::now();
        if self.expired_state(&state, now) {
            return Err(SessionError::Closed);
        }

        let (nonce, ct) = aead::decode_wire(wire).map_err(|_| SessionError::DecryptFailed)?;
        if nonce[..4] != [0u8; 4] {
            return Err(SessionError::DecryptFailed);
        }
        let counter = u64::from_be_bytes(nonce[4..].try_into().expect("nonce tail is 8 bytes"));
        if counter < state.recv_counter {
            return Err(SessionError::CounterReplayed);
        }

        let plaintext = match aead::open(&self.keys.aead_key, &nonce, &self.aad(), &ct) {
            Ok(pt) => pt,
            Err(_) => {
                state.closed = true;
                return Err(SessionError::DecryptFailed);
            }
        };

        state.recv_counter = counter + 1;
        state.message_count += 1;
        state.last_activity_at = now;
        Ok(plaintext.to_vec())
    }

    /// HMAC-SHA-256 over an RFC 9421 signature base, under the session MAC key.
    pub fn sign_covered(&self, base: &[u8]) -> Result<Vec<u8>, SessionError> {
        let state = self.state.lock();
        if self.expired_state(&state, Utc::now()) {
            return Err(SessionError::Closed);
        }
        Ok(mac::tag(&self.keys.mac_key, base))
    }

    /// Constant-time check of a covered-base MAC.
    pub fn verify_covered(&self, base: &[u8], tag: &[u8]) -> Result<(), SessionError> {
        let state = self.state.lock();
        if self.expired_state(&state, Utc::now()) {
            return Err(SessionError::Closed);
        }
        mac::verify(&self.keys.mac_key, base, tag).map_err(|_| SessionError::DecryptFailed)
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::max_value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sage_crypto::kdf::SessionKeys;

    fn keys(seed: u8) -> SessionKeys {
        SessionKeys {
            aead_key: [seed; 32],
            mac_key: [seed.wrapping_add(1); 32],
        }
    }

    fn session_with(config: SessionConfig) -> SecureSession {
        SecureSession::new(
            SessionId::generate(),
            KeyId::generate(),
            AgentDid::parse("did:sage:local:peer").unwrap(),
            keys(7),
            config,
        )
    }

    fn session() -> SecureSession {
        session_with(SessionConfig {
            max_age: Duration::from_secs(3600),
            idle_timeout: Duration::from_secs(3600),
            max_messages: 1000,
        })
    }

    /// Build the peer's view of the same session (shared keys and ids).
    fn peer_of(s: &SecureSession) -> SecureSession {
        SecureSession::new(
            s.session_id().clone(),
            s.key_id().clone(),
            AgentDid::parse("did:sage:local:other").unwrap(),
            keys(7),
            SessionConfig {
                max_age: Duration::from_secs(3600),
                idle_timeout: Duration::from_secs(3600),
                max_messages: 1000,
            },
        )
    }

    #[test]
    fn encrypt_decrypt_across_peers() {
        let a = session();
        let b = peer_of(&a);
        let wire = a.encrypt(b"{\"op\":\"ping\",\"ts\":1}").unwrap();
        assert_eq!(b.decrypt(&wire).unwrap(), b"{\"op\":\"ping\",\"ts\":1}");
    }

    #[test]
    fn nonces_strictly_increase() {
        let a = session();
        let w0 = a.encrypt(b"zero").unwrap();
        let w1 = a.encrypt(b"one").unwrap();
        assert_eq!(&w0[..12], &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&w1[..12], &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn replayed_wire_message_fails() {
        let a = session();
        let b = peer_of(&a);
        let wire = a.encrypt(b"once").unwrap();
        b.decrypt(&wire).unwrap();
        assert!(matches!(
            b.decrypt(&wire),
            Err(SessionError::CounterReplayed)
        ));
    }

    #[test]
    fn older_counter_fails_after_gap() {
        let a = session();
        let b = peer_of(&a);
        let w0 = a.encrypt(b"zero").unwrap();
        let w1 = a.encrypt(b"one").unwrap();
        b.decrypt(&w1).unwrap();
        assert!(matches!(b.decrypt(&w0), Err(SessionError::CounterReplayed)));
    }

    #[test]
    fn tampered_ciphertext_closes_session() {
        let a = session();
        let b = peer_of(&a);
        let mut wire = a.encrypt(b"payload").unwrap();
        let last = wire.len() - 1;
        wire[last] ^= 0x01;
        assert!(matches!(b.decrypt(&wire), Err(SessionError::DecryptFailed)));
        // Session is now closed for everything.
        let wire2 = a.encrypt(b"again").unwrap();
        assert!(matches!(b.decrypt(&wire2), Err(SessionError::Closed)));
    }

    #[test]
    fn cross_session_isolation() {
        let a = session();
        let other = SecureSession::new(
            SessionId::generate(),
            KeyId::generate(),
            AgentDid::parse("did:sage:local:peer").unwrap(),
            keys(99),
            SessionConfig::default(),
        );
        let wire = a.encrypt(b"for a only").unwrap();
        assert!(other.decrypt(&wire).is_err());
    }

    #[test]
    fn message_cap_expires_session_for_inbound_work() {
        let a = session_with(SessionConfig {
            max_age: Duration::from_secs(3600),
            idle_timeout: Duration::from_secs(3600),
            max_messages: 1,
        });
        let b = peer_of(&a);
        let wire = b.encrypt(b"first").unwrap();
        a.decrypt(&wire).unwrap();
        // Cap reached: the session is expired and rejects new inbound work,
        // though a reply to the admitted request could still be encrypted.
        assert!(a.is_expired(Utc::now()));
        let wire2 = b.encrypt(b"second").unwrap();
        assert!(matches!(a.decrypt(&wire2), Err(SessionError::Closed)));
        assert!(matches!(a.sign_covered(b"base"), Err(SessionError::Closed)));
    }

    #[test]
    fn age_expiry_rejects_operations() {
        let a = session_with(SessionConfig {
            max_age: Duration::ZERO,
            idle_timeout: Duration::from_secs(3600),
            max_messages: 1000,
        });
        let later = Utc::now() + chrono::Duration::seconds(1);
        assert!(a.is_expired(later));
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(a.encrypt(b"x"), Err(SessionError::Closed)));
    }

    #[test]
    fn idle_expiry_is_time_based() {
        let a = session_with(SessionConfig {
            max_age: Duration::from_secs(3600),
            idle_timeout: Duration::from_secs(2),
            max_messages: 1000,
        });
        assert!(!a.is_expired(Utc::now()));
        let later = Utc::now() + chrono::Duration::seconds(3);
        assert!(a.is_expired(later));
    }

    #[test]
    fn closed_session_rejects_everything() {
        let a = session();
        a.close();
        assert!(matches!(a.encrypt(b"x"), Err(SessionError::Closed)));
        assert!(matches!(a.decrypt(b"x"), Err(SessionError::Closed)));
        assert!(matches!(a.sign_covered(b"x"), Err(SessionError::Closed)));
    }

    #[test]
    fn covered_base_mac_roundtrip() {
        let a = session();
        let b = peer_of(&a);
        let tag = a.sign_covered(b"\"@method\": POST").unwrap();
        b.verify_covered(b"\"@method\": POST", &tag).unwrap();
        assert!(b.verify_covered(b"\"@method\": GET", &tag).is_err());
    }
}

//! sage_session — session layer of the SAGE secure channel
//!
//! A completed handshake yields two 32-byte symmetric keys; everything in
//! this crate runs on top of them:
//!
//! - [`session`]   — `SecureSession`: counter-nonce AES-256-GCM encryption,
//!   HMAC over RFC 9421 signature bases, age/idle/message caps
//! - [`manager`]   — `SessionManager`: dual-index lookup, default config,
//!   background sweepers, replay-guard coordination
//! - [`replay`]    — TTL-bounded `(key_id, nonce)` replay guard
//! - [`store`]     — `SessionStore` / `NonceStore` contracts + in-memory
//!   reference implementations
//! - [`handshake`] — three-phase Invitation → Request → Complete state
//!   machines for initiator and responder
//! - [`error`]     — session and handshake error kinds

pub mod error;
pub mod handshake;
pub mod manager;
pub mod replay;
pub mod session;
pub mod store;

pub use error::{HandshakeError, SessionError};
pub use handshake::{HandshakePhase, Initiator, Responder};
pub use manager::{ManagerConfig, SessionManager, SessionParams};
pub use replay::ReplayGuard;
pub use session::{KeyId, SecureSession, SessionConfig, SessionId};
pub use store::{
    InMemoryNonceStore, InMemorySessionStore, NonceStore, SessionStore, StoreError,
};

//! sage_server — HTTP surface of a SAGE agent
//!
//! Routes:
//! - `POST /protected`             — signed + encrypted application traffic
//! - `POST /handshake/invitation`  — handshake phase 1
//! - `POST /handshake/request`     — handshake phase 2 (the sealed Response
//!   rides back in the HTTP reply)
//! - `POST /handshake/complete`    — handshake phase 4
//!
//! The protected handler is the glue described in the session layer: parse
//! `Signature-Input`, replay-check the nonce, look up the session by key id,
//! resolve the caller's DID-published key, verify the RFC 9421 signature,
//! decrypt, call the application, and encrypt the reply.  Error bodies are
//! deliberately generic; full detail is logged under a per-request
//! correlation id.
//!
//! # Modules
//! - `state`     — shared [`AppState`] and the application callback trait
//! - `routes`    — router construction and `serve`
//! - `protected` — the protected-endpoint handler
//! - `handshake` — the three handshake endpoints
//! - `error`     — HTTP status mapping

pub mod error;
pub mod handshake;
pub mod protected;
pub mod routes;
pub mod state;

pub use routes::{router, serve};
pub use state::{AppState, ProtectedService};

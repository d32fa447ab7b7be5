//! sage_did — Agent DIDs and the registry resolver contract
//!
//! An agent is named by a DID of the form `did:sage:<chain>:<locator>` and
//! publishes two long-term public keys (Ed25519 signing, X25519 KEM) plus an
//! active flag through a chain-backed registry.  The core consumes that
//! registry through the read-only [`DidResolver`] trait and never caches
//! metadata beyond a single handshake attempt.
//!
//! # Modules
//! - `did`      — `AgentDid` identifier type and chain tags
//! - `resolver` — `AgentMetadata`, `DidResolver`, failure modes, retry policy
//! - `registry` — in-memory reference registry (local chain / tests)

pub mod did;
pub mod registry;
pub mod resolver;

pub use did::{AgentDid, Chain, DidError};
pub use registry::InMemoryDidRegistry;
pub use resolver::{resolve_with_retry, AgentMetadata, DidResolver, ResolverError};

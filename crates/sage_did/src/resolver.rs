//! Registry resolver contract.
//!
//! The chain registry (smart contracts, RPC, persistence) lives outside the
//! core; everything here is the read-only view the core consumes.  `Unknown`
//! and `Inactive` are rejected identically by callers.  `Transient` failures
//! are retried once with a short backoff during a handshake and otherwise
//! abort it; established sessions never touch the resolver.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sage_crypto::PublicKeyBytes;

use crate::did::AgentDid;

const TRANSIENT_RETRY_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("Agent `{0}` is not registered")]
    Unknown(AgentDid),

    #[error("Agent `{0}` is deactivated")]
    Inactive(AgentDid),

    #[error("Transient registry failure: {0}")]
    Transient(String),
}

impl ResolverError {
    /// Whether a retry could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Public agent record as published on the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub did: AgentDid,
    pub name: String,
    pub active: bool,
    /// Long-term Ed25519 signing public key.
    pub signing_key: PublicKeyBytes,
    /// Long-term X25519 KEM public key.
    pub kem_key: PublicKeyBytes,
}

/// Read-only view of the DID registry.
///
/// Implementations MUST fail every lookup for an inactive agent; the default
/// key accessors inherit that by delegating to [`resolve`](Self::resolve).
#[async_trait]
pub trait DidResolver: Send + Sync {
    async fn resolve(&self, did: &AgentDid) -> Result<AgentMetadata, ResolverError>;

    async fn resolve_signing_key(&self, did: &AgentDid) -> Result<PublicKeyBytes, ResolverError> {
        Ok(self.resolve(did).await?.signing_key)
    }

    async fn resolve_kem_key(&self, did: &AgentDid) -> Result<PublicKeyBytes, ResolverError> {
        Ok(self.resolve(did).await?.kem_key)
    }
}

/// Resolve with the handshake retry policy: one retry after 100 ms on a
/// transient failure, then give up.
pub async fn resolve_with_retry(
    resolver: &dyn DidResolver,
    did: &AgentDid,
) -> Result<AgentMetadata, ResolverError> {
    match resolver.resolve(did).await {
        Err(e) if e.is_transient() => {
            tracing::debug!(did = %did, error = %e, "transient resolver failure, retrying");
            tokio::time::sleep(TRANSIENT_RETRY_BACKOFF).await;
            resolver.resolve(did).await
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct FlakyResolver {
        calls: AtomicUsize,
        fail_first: usize,
        meta: AgentMetadata,
    }

    #[async_trait]
    impl DidResolver for FlakyResolver {
        async fn resolve(&self, _did: &AgentDid) -> Result<AgentMetadata, ResolverError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(ResolverError::Transient("rpc timeout".into()))
            } else {
                Ok(self.meta.clone())
            }
        }
    }

    fn meta(did: &AgentDid) -> AgentMetadata {
        AgentMetadata {
            did: did.clone(),
            name: "test".into(),
            active: true,
            signing_key: PublicKeyBytes::new([1u8; 32]),
            kem_key: PublicKeyBytes::new([2u8; 32]),
        }
    }

    #[tokio::test]
    async fn retries_once_on_transient() {
        let did = AgentDid::parse("did:sage:local:a").unwrap();
        let r = FlakyResolver {
            calls: AtomicUsize::new(0),
            fail_first: 1,
            meta: meta(&did),
        };
        resolve_with_retry(&r, &did).await.unwrap();
        assert_eq!(r.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_second_transient() {
        let did = AgentDid::parse("did:sage:local:a").unwrap();
        let r = FlakyResolver {
            calls: AtomicUsize::new(0),
            fail_first: 2,
            meta: meta(&did),
        };
        let err = resolve_with_retry(&r, &did).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(r.calls.load(Ordering::SeqCst), 2);
    }
}

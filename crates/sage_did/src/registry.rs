//! In-memory reference registry.
//!
//! Backs local-chain deployments and tests.  Lookups behave exactly like a
//! chain-backed resolver: unknown DIDs fail, deactivated agents fail every
//! lookup, and nothing is cached by callers.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::did::AgentDid;
use crate::resolver::{AgentMetadata, DidResolver, ResolverError};

#[derive(Default)]
pub struct InMemoryDidRegistry {
    agents: RwLock<HashMap<AgentDid, AgentMetadata>>,
}

impl InMemoryDidRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an agent record.
    pub fn register(&self, metadata: AgentMetadata) {
        tracing::debug!(
            did = %metadata.did,
            active = metadata.active,
            signing_key = %metadata.signing_key.fingerprint(),
            "registering agent"
        );
        self.agents.write().insert(metadata.did.clone(), metadata);
    }

    /// Flip an agent's active flag.  Returns false if the DID is unknown.
    pub fn set_active(&self, did: &AgentDid, active: bool) -> bool {
        match self.agents.write().get_mut(did) {
            Some(meta) => {
                meta.active = active;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, did: &AgentDid) -> bool {
        self.agents.write().remove(did).is_some()
    }
}

#[async_trait]
impl DidResolver for InMemoryDidRegistry {
    async fn resolve(&self, did: &AgentDid) -> Result<AgentMetadata, ResolverError> {
        let agents = self.agents.read();
        let meta = agents
            .get(did)
            .ok_or_else(|| ResolverError::Unknown(did.clone()))?;
        if !meta.active {
            return Err(ResolverError::Inactive(did.clone()));
        }
        Ok(meta.clone())
    }
}

#[cfg(test)]
mod tests {
    use sage_crypto::PublicKeyBytes;

    use super::*;

    fn sample(did: &str) -> AgentMetadata {
        AgentMetadata {
            did: AgentDid::parse(did).unwrap(),
            name: "sample".into(),
            active: true,
            signing_key: PublicKeyBytes::new([1u8; 32]),
            kem_key: PublicKeyBytes::new([2u8; 32]),
        }
    }

    #[tokio::test]
    async fn resolves_registered_agent() {
        let registry = InMemoryDidRegistry::new();
        let meta = sample("did:sage:local:alice");
        registry.register(meta.clone());
        let got = registry.resolve(&meta.did).await.unwrap();
        assert_eq!(got.signing_key, meta.signing_key);
    }

    #[tokio::test]
    async fn unknown_agent_fails() {
        let registry = InMemoryDidRegistry::new();
        let did = AgentDid::parse("did:sage:local:ghost").unwrap();
        assert!(matches!(
            registry.resolve(&did).await,
            Err(ResolverError::Unknown(_))
        ));
    }

    #[tokio::test]
    async fn inactive_agent_fails_every_lookup() {
        let registry = InMemoryDidRegistry::new();
        let meta = sample("did:sage:local:alice");
        registry.register(meta.clone());
        assert!(registry.set_active(&meta.did, false));

        assert!(matches!(
            registry.resolve(&meta.did).await,
            Err(ResolverError::Inactive(_))
        ));
        assert!(registry.resolve_signing_key(&meta.did).await.is_err());
        assert!(registry.resolve_kem_key(&meta.did).await.is_err());
    }
}

//! Replay guard: TTL-bounded set of `(key_id, nonce)` pairs.
//!
//! First sighting admits, any repeat within the TTL rejects.  Decisions are
//! globally serialisable per pair: if two requests race on the same nonce,
//! exactly one is admitted.  An admitted-but-unused nonce (e.g. after a
//! cancelled request) simply occupies its slot until the TTL passes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::store::{NonceStore, StoreError};

pub const DEFAULT_NONCE_TTL: Duration = Duration::from_secs(300);

pub struct ReplayGuard {
    store: Arc<dyn NonceStore>,
    ttl: Duration,
}

impl ReplayGuard {
    pub fn new(store: Arc<dyn NonceStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Returns `true` if the pair was already seen within the TTL; records
    /// it and returns `false` otherwise.
    pub async fn seen_once(&self, key_id: &str, nonce: &str) -> Result<bool, StoreError> {
        self.store.see_once(key_id, nonce, Utc::now(), self.ttl).await
    }

    /// Drop expired entries.  Returns how many were removed.
    pub async fn sweep(&self) -> Result<usize, StoreError> {
        self.store.sweep_expired(Utc::now(), self.ttl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryNonceStore;

    #[tokio::test]
    async fn guard_round_trip() {
        let guard = ReplayGuard::new(Arc::new(InMemoryNonceStore::new()), DEFAULT_NONCE_TTL);
        assert!(!guard.seen_once("kid", "nonce-a").await.unwrap());
        assert!(guard.seen_once("kid", "nonce-a").await.unwrap());
        assert!(!guard.seen_once("kid", "nonce-b").await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_inserts_admit_exactly_one() {
        let guard = Arc::new(ReplayGuard::new(
            Arc::new(InMemoryNonceStore::new()),
            DEFAULT_NONCE_TTL,
        ));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let g = Arc::clone(&guard);
            handles.push(tokio::spawn(
                async move { g.seen_once("kid", "raced").await },
            ));
        }
        let mut admitted = 0;
        for h in handles {
            if !h.await.unwrap().unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }
}

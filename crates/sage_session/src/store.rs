//! Store contracts and the in-memory reference implementations.
//!
//! Remote backends (SQL, KV) plug in behind the same traits and MUST keep
//! the semantics: sessions reachable by both `session_id` and `key_id`,
//! nonces keyed by `(key_id, nonce)` and swept by `first_seen_at`.
//!
//! Index writers take one exclusive lock for the duration of the update;
//! readers only hold it long enough to clone a handle.  Session bodies carry
//! their own lock, so store access never serialises two sessions' traffic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use thiserror::Error;

use crate::session::{KeyId, SecureSession, SessionId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Duplicate identifier `{0}`")]
    DuplicateId(String),
}

// ── Session store ────────────────────────────────────────────────────────────

/// Dual-index session storage.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a session under both indices.  Fails with `DuplicateId` if
    /// either identifier is already present.
    async fn insert(&self, session: Arc<SecureSession>) -> Result<(), StoreError>;

    async fn get_by_session_id(
        &self,
        id: &SessionId,
    ) -> Result<Option<Arc<SecureSession>>, StoreError>;

    async fn get_by_key_id(&self, key_id: &KeyId)
        -> Result<Option<Arc<SecureSession>>, StoreError>;

    /// Drop a session from both indices, returning it if present.
    async fn remove(&self, id: &SessionId) -> Result<Option<Arc<SecureSession>>, StoreError>;

    /// Remove every session expired at `now`.  Returns how many went.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}

#[derive(Default)]
struct SessionIndices {
    by_session: HashMap<SessionId, Arc<SecureSession>>,
    by_key: HashMap<KeyId, SessionId>,
}

/// Reference in-memory session store.
#[derive(Default)]
pub struct InMemorySessionStore {
    inner: RwLock<SessionIndices>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: Arc<SecureSession>) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner.by_session.contains_key(session.session_id()) {
            return Err(StoreError::DuplicateId(session.session_id().to_string()));
        }
        if inner.by_key.contains_key(session.key_id()) {
            return Err(StoreError::DuplicateId(session.key_id().to_string()));
        }
        inner
            .by_key
            .insert(session.key_id().clone(), session.session_id().clone());
        inner
            .by_session
            .insert(session.session_id().clone(), session);
        Ok(())
    }

    async fn get_by_session_id(
        &self,
        id: &SessionId,
    ) -> Result<Option<Arc<SecureSession>>, StoreError> {
        Ok(self.inner.read().by_session.get(id).cloned())
    }

    async fn get_by_key_id(
        &self,
        key_id: &KeyId,
    ) -> Result<Option<Arc<SecureSession>>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .by_key
            .get(key_id)
            .and_then(|sid| inner.by_session.get(sid))
            .cloned())
    }

    async fn remove(&self, id: &SessionId) -> Result<Option<Arc<SecureSession>>, StoreError> {
        let mut inner = self.inner.write();
        let session = inner.by_session.remove(id);
        if let Some(ref s) = session {
            inner.by_key.remove(s.key_id());
        }
        Ok(session)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut inner = self.inner.write();
        let expired: Vec<SessionId> = inner
            .by_session
            .iter()
            .filter(|(_, s)| s.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            if let Some(s) = inner.by_session.remove(id) {
                inner.by_key.remove(s.key_id());
            }
        }
        Ok(expired.len())
    }
}

// ── Nonce store ──────────────────────────────────────────────────────────────

/// Replay-guard storage: `(key_id, nonce) → first_seen_at`.
#[async_trait]
pub trait NonceStore: Send + Sync {
    /// Insert if absent (or expired) and return `false`; return `true` when
    /// the pair is present and still within `ttl`.  Concurrent inserts of
    /// the same pair serialise: exactly one caller sees `false`.
    async fn see_once(
        &self,
        key_id: &str,
        nonce: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Drop entries whose `first_seen_at` is older than `ttl`.
    async fn sweep_expired(&self, now: DateTime<Utc>, ttl: Duration) -> Result<usize, StoreError>;
}

/// Reference in-memory nonce store.
#[derive(Default)]
pub struct InMemoryNonceStore {
    entries: RwLock<HashMap<(String, String), DateTime<Utc>>>,
}

impl InMemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn within_ttl(first_seen: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    now - first_seen
        <= chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::max_value())
}

#[async_trait]
impl NonceStore for InMemoryNonceStore {
    async fn see_once(
        &self,
        key_id: &str,
        nonce: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.write();
        let key = (key_id.to_string(), nonce.to_string());
        match entries.get(&key) {
            Some(&first_seen) if within_ttl(first_seen, now, ttl) => Ok(true),
            _ => {
                // Absent or expired: (re)admit and record first sighting.
                entries.insert(key, now);
                Ok(false)
            }
        }
    }

    async fn sweep_expired(&self, now: DateTime<Utc>, ttl: Duration) -> Result<usize, StoreError> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, &mut first_seen| within_ttl(first_seen, now, ttl));
        Ok(before - entries.len())
    }
}

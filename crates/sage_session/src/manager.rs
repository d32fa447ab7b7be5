//! Session manager: materialises sessions from handshake output, indexes
//! them by `session_id` and `key_id`, coordinates the replay guard, and
//! sweeps expired state in the background.
//!
//! Lookups never return an expired session; the sweepers only reclaim
//! memory.  Sweepers are explicit (`start_sweepers`) so the manager can be
//! constructed outside a runtime, and shut down cleanly via a watch channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use sage_crypto::kdf::SessionKeys;
use sage_did::AgentDid;

use crate::error::SessionError;
use crate::replay::{ReplayGuard, DEFAULT_NONCE_TTL};
use crate::session::{KeyId, SecureSession, SessionConfig, SessionId};
use crate::store::{InMemoryNonceStore, InMemorySessionStore, NonceStore, SessionStore};

#[derive(Debug, Clone, Copy)]
pub struct ManagerConfig {
    /// Defaults applied to new sessions (each keeps its birth-time copy).
    pub session: SessionConfig,
    /// Period of the expired-session and expired-nonce sweeps.
    pub cleanup_interval: Duration,
    /// Replay-guard TTL.
    pub nonce_ttl: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            cleanup_interval: Duration::from_secs(60),
            nonce_ttl: DEFAULT_NONCE_TTL,
        }
    }
}

/// Inputs for materialising one session from handshake output.
pub struct SessionParams {
    pub peer_did: AgentDid,
    pub keys: SessionKeys,
    /// Responder side mints fresh ids; the initiator passes the ids it
    /// received in the handshake Response so both sides index identically.
    pub session_id: Option<SessionId>,
    pub key_id: Option<KeyId>,
    /// Per-session override; defaults to the manager's current config.
    pub config: Option<SessionConfig>,
}

pub struct SessionManager {
    sessions: Arc<dyn SessionStore>,
    replay: ReplayGuard,
    defaults: RwLock<SessionConfig>,
    cleanup_interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    sweepers: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionManager {
    /// Manager over the in-memory reference stores.
    pub fn new(config: ManagerConfig) -> Arc<Self> {
        Self::with_stores(
            config,
            Arc::new(InMemorySessionStore::new()),
            Arc::new(InMemoryNonceStore::new()),
        )
    }

    /// Manager over caller-supplied store backends.
    pub fn with_stores(
        config: ManagerConfig,
        sessions: Arc<dyn SessionStore>,
        nonces: Arc<dyn NonceStore>,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            sessions,
            replay: ReplayGuard::new(nonces, config.nonce_ttl),
            defaults: RwLock::new(config.session),
            cleanup_interval: config.cleanup_interval,
            shutdown_tx,
            sweepers: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the periodic session and nonce sweeps.  Requires a tokio
    /// runtime; call once at startup.
    pub fn start_sweepers(self: &Arc<Self>) {
        let mgr = Arc::clone(self);
        let mut shutdown = self.shutdown_tx.subscribe();
        let session_sweep = tokio::spawn(async move {
            let mut tick = tokio::time::interval(mgr.cleanup_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => match mgr.sessions.sweep_expired(Utc::now()).await {
                        Ok(0) => {}
                        Ok(n) => debug!(swept = n, "expired sessions removed"),
                        Err(e) => warn!(error = %e, "session sweep failed; retrying next tick"),
                    },
                    _ = shutdown.changed() => break,
                }
            }
        });

        let mgr = Arc::clone(self);
        let mut shutdown = self.shutdown_tx.subscribe();
        let nonce_sweep = tokio::spawn(async move {
            let mut tick = tokio::time::interval(mgr.cleanup_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => match mgr.replay.sweep().await {
                        Ok(0) => {}
                        Ok(n) => debug!(swept = n, "expired nonces removed"),
                        Err(e) => warn!(error = %e, "nonce sweep failed; retrying next tick"),
                    },
                    _ = shutdown.changed() => break,
                }
            }
        });

        self.sweepers.lock().extend([session_sweep, nonce_sweep]);
    }

    /// Receiver that flips to `true` when [`shutdown`](Self::shutdown) runs.
    /// Lets callers tie their own background tasks to the manager's lifetime.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Stop the sweepers.  Idempotent; safe to call without `start_sweepers`.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<_> = self.sweepers.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Create and index a session.  Ids are minted unless supplied; a
    /// collision on either index fails the call.
    pub async fn new_session(
        &self,
        params: SessionParams,
    ) -> Result<Arc<SecureSession>, SessionError> {
        let session_id = params.session_id.unwrap_or_else(SessionId::generate);
        let key_id = params.key_id.unwrap_or_else(KeyId::generate);
        let config = params.config.unwrap_or_else(|| *self.defaults.read());

        let session = Arc::new(SecureSession::new(
            session_id,
            key_id,
            params.peer_did,
            params.keys,
            config,
        ));
        self.sessions.insert(Arc::clone(&session)).await?;
        info!(
            session_id = %session.session_id(),
            key_id = %session.key_id(),
            peer = %session.peer_did(),
            "session established"
        );
        Ok(session)
    }

    pub async fn get_by_session_id(
        &self,
        id: &SessionId,
    ) -> Result<Arc<SecureSession>, SessionError> {
        match self.sessions.get_by_session_id(id).await? {
            Some(s) if !s.is_expired(Utc::now()) => Ok(s),
            _ => Err(SessionError::NotFound),
        }
    }

    pub async fn get_by_key_id(&self, key_id: &KeyId) -> Result<Arc<SecureSession>, SessionError> {
        match self.sessions.get_by_key_id(key_id).await? {
            Some(s) if !s.is_expired(Utc::now()) => Ok(s),
            _ => Err(SessionError::NotFound),
        }
    }

    /// Replay-guard check; see [`ReplayGuard::seen_once`].
    pub async fn replay_guard_seen_once(
        &self,
        key_id: &str,
        nonce: &str,
    ) -> Result<bool, SessionError> {
        Ok(self.replay.seen_once(key_id, nonce).await?)
    }

    /// Close a session and drop it from both indices.  A closed session can
    /// never be reopened.
    pub async fn close(&self, id: &SessionId) -> Result<(), SessionError> {
        match self.sessions.remove(id).await? {
            Some(session) => {
                session.close();
                info!(session_id = %id, "session closed");
                Ok(())
            }
            None => Err(SessionError::NotFound),
        }
    }

    /// Update defaults for future sessions.  Existing sessions keep their
    /// birth-time configuration.
    pub fn set_default_config(&self, config: SessionConfig) {
        *self.defaults.write() = config;
    }

    pub fn default_config(&self) -> SessionConfig {
        *self.defaults.read()
    }
}

//! Shared application state for the router.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use sage_did::{AgentDid, DidResolver};
use sage_session::{Responder, SessionManager};

/// Application callback behind the protected endpoint.  Receives the
/// decrypted request body and returns the plaintext reply; the server
/// encrypts it before it leaves the process.
#[async_trait]
pub trait ProtectedService: Send + Sync {
    async fn call(&self, peer: &AgentDid, plaintext: &[u8]) -> anyhow::Result<Vec<u8>>;
}

/// Everything a handler needs.  Cheap to clone (Arcs all the way down).
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
    pub resolver: Arc<dyn DidResolver>,
    pub responder: Arc<Responder>,
    pub service: Arc<dyn ProtectedService>,
}

impl AppState {
    pub fn new(
        manager: Arc<SessionManager>,
        resolver: Arc<dyn DidResolver>,
        responder: Arc<Responder>,
        service: Arc<dyn ProtectedService>,
    ) -> Self {
        Self {
            manager,
            resolver,
            responder,
            service,
        }
    }

    /// Start the manager sweepers plus a handshake-context sweep, all tied
    /// to the manager's shutdown signal.
    pub fn start_background(&self, handshake_sweep_interval: Duration) {
        self.manager.start_sweepers();

        let responder = Arc::clone(&self.responder);
        let mut shutdown = self.manager.shutdown_signal();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(handshake_sweep_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let swept = responder.sweep_expired().await;
                        if swept > 0 {
                            debug!(swept, "handshake contexts timed out");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        });
    }
}

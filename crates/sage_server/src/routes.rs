//! Router construction and the blocking `serve` entry point.

use std::error::Error;
use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

use axum::routing::post;
use axum::Router;
use tracing::debug;

use crate::handshake;
use crate::protected::protected;
use crate::state::AppState;

const HANDSHAKE_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/protected", post(protected))
        .route("/handshake/invitation", post(handshake::invitation))
        .route("/handshake/request", post(handshake::request))
        .route("/handshake/complete", post(handshake::complete))
        .with_state(state)
}

/// Bind and serve until the task is cancelled.  Starts the background
/// sweepers before accepting traffic.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), Box<dyn Error>> {
    let listener = TcpListener::bind(addr)?;
    debug!("listening on {}", addr);

    state.start_background(HANDSHAKE_SWEEP_INTERVAL);
    let app = router(state);
    axum::Server::from_tcp(listener)?
        .serve(app.into_make_service())
        .await?;
    Ok(())
}

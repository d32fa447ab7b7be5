//! Handshake endpoints.
//!
//! Each phase is one POST of a [`SignedEnvelope`].  The sealed Response for
//! phase 2 rides back in the HTTP reply of `/handshake/request`, so no
//! server-initiated connection is needed.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

use sage_proto::SignedEnvelope;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn invitation(
    State(state): State<AppState>,
    Json(envelope): Json<SignedEnvelope>,
) -> Response {
    let span = info_span!("handshake_invitation", correlation_id = %Uuid::new_v4());
    async move {
        match state.responder.on_invitation(&envelope).await {
            Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
            Err(e) => {
                warn!(error = %e, "invitation rejected");
                ApiError::from(&e).into_response()
            }
        }
    }
    .instrument(span)
    .await
}

pub async fn request(
    State(state): State<AppState>,
    Json(envelope): Json<SignedEnvelope>,
) -> Response {
    let span = info_span!("handshake_request", correlation_id = %Uuid::new_v4());
    async move {
        match state.responder.on_request(&envelope).await {
            Ok(response) => (StatusCode::OK, Json(response)).into_response(),
            Err(e) => {
                warn!(error = %e, "request rejected");
                ApiError::from(&e).into_response()
            }
        }
    }
    .instrument(span)
    .await
}

pub async fn complete(
    State(state): State<AppState>,
    Json(envelope): Json<SignedEnvelope>,
) -> Response {
    let span = info_span!("handshake_complete", correlation_id = %Uuid::new_v4());
    async move {
        match state.responder.on_complete(&envelope).await {
            Ok(session_id) => (
                StatusCode::OK,
                Json(json!({ "session_id": session_id.to_string() })),
            )
                .into_response(),
            Err(e) => {
                warn!(error = %e, "complete rejected");
                ApiError::from(&e).into_response()
            }
        }
    }
    .instrument(span)
    .await
}

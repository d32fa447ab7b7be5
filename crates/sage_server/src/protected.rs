//! The protected endpoint.
//!
//! Inbound checks, in order: parse `Signature-Input`, enforce the fixed
//! covered-component set, extract `keyid`/`nonce`, replay guard, session
//! lookup, caller DID resolution, RFC 9421 verification, body digest,
//! decrypt.  The covered set is mandated by the server, never negotiated:
//! a signature over fewer components (e.g. without `content-digest`) is
//! rejected outright.  Replay detection runs before any cryptographic
//! verification so floods fail fast — which also means a request that
//! later fails signature checks still burns its nonce.
//!
//! Responses carry `{"cipher_b64": "<base64>"}` with
//! `Content-Type: application/json`; request bodies are the raw session
//! ciphertext even though they also travel under `application/json` (kept
//! for wire compatibility with existing agents).

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use serde_json::json;
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

use sage_did::AgentDid;
use sage_http::{
    default_components, verify_content_digest, verify_request, RequestMeta, SignatureError,
    SignatureInput, VerifierKey, VerifyOptions,
};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn protected(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let correlation_id = Uuid::new_v4();
    let span = info_span!("protected", %correlation_id);
    match handle(&state, &method, &uri, &headers, &body)
        .instrument(span)
        .await
    {
        Ok(cipher) => (
            StatusCode::OK,
            Json(json!({ "cipher_b64": STANDARD.encode(cipher) })),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn handle(
    state: &AppState,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Vec<u8>, ApiError> {
    // 1. Parse Signature-Input.
    let signature_input_header = header_str(headers, "signature-input")
        .ok_or_else(|| ApiError::bad_request("missing signature-input"))?;
    let parsed = SignatureInput::parse(signature_input_header).map_err(|e| {
        warn!(error = %e, "malformed Signature-Input");
        ApiError::bad_request("malformed signature")
    })?;

    // The covered set is fixed for this endpoint; the caller does not get
    // to shrink what the signature binds.
    if parsed.components != default_components() {
        warn!("covered components do not match the required set");
        return Err(ApiError::bad_request("invalid covered components"));
    }

    // 2. keyid and nonce must both be present.
    let key_id = parsed.params.key_id.clone();
    let nonce = parsed.params.nonce.clone().unwrap_or_default();
    if key_id.is_empty() || nonce.is_empty() {
        return Err(ApiError::bad_request("missing keyid or nonce"));
    }

    // 3. Replay detection precedes all cryptographic work.
    let replayed = state
        .manager
        .replay_guard_seen_once(&key_id, &nonce)
        .await
        .map_err(|e| {
            warn!(error = %e, "replay guard unavailable");
            ApiError::internal()
        })?;
    if replayed {
        warn!(%key_id, "nonce replayed");
        return Err(ApiError::unauthorized("replay"));
    }

    // 4. Session lookup by key id.
    let session = state
        .manager
        .get_by_key_id(&sage_session::KeyId::from(key_id.clone()))
        .await
        .map_err(|e| {
            warn!(%key_id, error = %e, "no live session for key id");
            ApiError::unauthorized("no session")
        })?;

    // 5. Resolve the caller's published signing key.
    let did_header = header_str(headers, "x-agent-did")
        .ok_or_else(|| ApiError::bad_request("missing x-agent-did"))?;
    let caller_did = AgentDid::parse(did_header)
        .map_err(|_| ApiError::bad_request("invalid x-agent-did"))?;
    let signing_key = state
        .resolver
        .resolve_signing_key(&caller_did)
        .await
        .map_err(|e| {
            warn!(did = %caller_did, error = %e, "caller DID rejected");
            if e.is_transient() {
                ApiError::internal()
            } else {
                ApiError::unauthorized("unauthorized")
            }
        })?;

    // 6. RFC 9421 verification over the fixed component set.
    let meta = request_meta(method, uri, headers);
    let signature_header = header_str(headers, "signature")
        .ok_or_else(|| ApiError::bad_request("missing signature"))?;
    verify_request(
        &meta,
        signature_input_header,
        signature_header,
        &VerifyOptions::default(),
        Utc::now().timestamp(),
        |kid| {
            if kid == key_id {
                Ok(VerifierKey::Ed25519(signing_key.clone()))
            } else {
                Err(SignatureError::UnknownKeyId(kid.to_string()))
            }
        },
    )
    .map_err(|e| {
        warn!(error = %e, "signature verification failed");
        ApiError::unauthorized("unauthorized")
    })?;

    // The digest is a covered component, so it is always present here; one
    // that does not match the body would bind the signature to nothing.
    let digest = header_str(headers, "content-digest")
        .ok_or_else(|| ApiError::bad_request("missing content-digest"))?;
    verify_content_digest(digest, body).map_err(|e| {
        warn!(error = %e, "content digest mismatch");
        ApiError::bad_request("bad content-digest")
    })?;

    // 7. Decrypt the body.
    let plaintext = session.decrypt(body).map_err(|e| {
        warn!(session_id = %session.session_id(), error = %e, "decrypt failed");
        ApiError::unauthorized("unauthorized")
    })?;

    // 8. Application callback.
    let reply = state
        .service
        .call(session.peer_did(), &plaintext)
        .await
        .map_err(|e| {
            warn!(error = %e, "application callback failed");
            ApiError::internal()
        })?;

    // 9. Encrypt the reply.  No crypto detail leaves the process.
    session.encrypt(&reply).map_err(|e| {
        warn!(session_id = %session.session_id(), error = %e, "response encryption failed");
        ApiError::internal()
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Project the axum request pieces into the signature engine's view.
/// `@authority` comes from the `Host` header.
fn request_meta(method: &Method, uri: &Uri, headers: &HeaderMap) -> RequestMeta {
    let authority = header_str(headers, "host").unwrap_or_default();
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let mut meta = RequestMeta::new(method.as_str(), path_and_query, authority);
    for (name, value) in headers {
        if let Ok(v) = value.to_str() {
            meta = meta.with_header(name.as_str(), v);
        }
    }
    meta
}

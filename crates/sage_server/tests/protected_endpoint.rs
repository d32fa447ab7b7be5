//! End-to-end exercises of the protected endpoint: a client agent completes
//! the handshake against the router, then drives signed + encrypted
//! requests through it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use serde_json::json;
use tower::ServiceExt;

use sage_crypto::{KemKeyPair, SigningKeyPair};
use sage_did::{AgentDid, AgentMetadata, DidResolver, InMemoryDidRegistry};
use sage_http::{
    content_digest, default_components, sign_request, RequestMeta, SignatureAlgorithm,
    SignatureParams, SignerKey, DEFAULT_LABEL,
};
use sage_proto::SignedEnvelope;
use sage_server::{router, AppState, ProtectedService};
use sage_session::{
    Initiator, ManagerConfig, Responder, SecureSession, SessionConfig, SessionManager,
};

const AUTHORITY: &str = "agent.example.com";

fn long_lived() -> SessionConfig {
    SessionConfig {
        max_age: Duration::from_secs(3600),
        idle_timeout: Duration::from_secs(3600),
        max_messages: 1000,
    }
}

struct Agent {
    did: AgentDid,
    identity: Arc<SigningKeyPair>,
    kem: Arc<KemKeyPair>,
}

fn agent(did: &str) -> Agent {
    Agent {
        did: AgentDid::parse(did).unwrap(),
        identity: Arc::new(SigningKeyPair::generate()),
        kem: Arc::new(KemKeyPair::generate()),
    }
}

/// Echoes the decrypted request back, wrapped in a JSON envelope, and
/// counts invocations.
struct EchoService {
    calls: AtomicUsize,
}

#[async_trait]
impl ProtectedService for EchoService {
    async fn call(&self, _peer: &AgentDid, plaintext: &[u8]) -> anyhow::Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let echoed: serde_json::Value = serde_json::from_slice(plaintext)?;
        Ok(serde_json::to_vec(
            &json!({"from": "server", "ok": true, "echo": echoed}),
        )?)
    }
}

struct Rig {
    app: Router,
    alice: Agent,
    client_session: Arc<SecureSession>,
    service: Arc<EchoService>,
}

/// Stand up registry + server + client, run the full handshake over the
/// router, and hand back the client's established session.
async fn rig_with(server_session_config: SessionConfig) -> Rig {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let registry = Arc::new(InMemoryDidRegistry::new());
    let alice = agent("did:sage:ethereum:alice");
    let server = agent("did:sage:ethereum:server001");
    for a in [&alice, &server] {
        registry.register(AgentMetadata {
            did: a.did.clone(),
            name: a.did.locator().to_string(),
            active: true,
            signing_key: a.identity.public.clone(),
            kem_key: a.kem.public.clone(),
        });
    }

    let server_mgr = SessionManager::new(ManagerConfig {
        session: server_session_config,
        ..ManagerConfig::default()
    });
    let responder = Arc::new(Responder::new(
        server.did.clone(),
        Arc::clone(&server.identity),
        Arc::clone(&server.kem),
        registry.clone() as Arc<dyn DidResolver>,
        Arc::clone(&server_mgr),
    ));
    let service = Arc::new(EchoService {
        calls: AtomicUsize::new(0),
    });
    let app = router(AppState::new(
        server_mgr,
        registry.clone() as Arc<dyn DidResolver>,
        responder,
        service.clone(),
    ));

    let client_mgr = SessionManager::new(ManagerConfig {
        session: long_lived(),
        ..ManagerConfig::default()
    });
    let mut initiator = Initiator::new(
        alice.did.clone(),
        server.did.clone(),
        Arc::clone(&alice.identity),
        Arc::clone(&alice.kem),
        registry.clone() as Arc<dyn DidResolver>,
        client_mgr,
    );

    let invitation = initiator.invitation(None).unwrap();
    let resp = post_envelope(&app, "/handshake/invitation", &invitation).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let request = initiator.request().await.unwrap();
    let resp = post_envelope(&app, "/handshake/request", &request).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let response: SignedEnvelope = serde_json::from_slice(&body_bytes(resp).await).unwrap();

    let (client_session, complete) = initiator.complete(&response).await.unwrap();
    let resp = post_envelope(&app, "/handshake/complete", &complete).await;
    assert_eq!(resp.status(), StatusCode::OK);

    Rig {
        app,
        alice,
        client_session,
        service,
    }
}

async fn rig() -> Rig {
    rig_with(long_lived()).await
}

async fn post_envelope(
    app: &Router,
    path: &str,
    envelope: &SignedEnvelope,
) -> axum::response::Response {
    let req = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(envelope).unwrap()))
        .unwrap();
    app.clone().oneshot(req).await.unwrap()
}

async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
    hyper::body::to_bytes(resp.into_body()).await.unwrap().to_vec()
}

async fn error_reason(resp: axum::response::Response) -> String {
    let value: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    value["error"].as_str().unwrap_or_default().to_string()
}

struct SignedRequest {
    date: String,
    digest: String,
    signature_input: String,
    signature: String,
    body: Vec<u8>,
}

/// Client-side construction of one protected request.
fn build_request(rig: &Rig, plaintext: &[u8], nonce: &str) -> SignedRequest {
    let body = rig.client_session.encrypt(plaintext).unwrap();
    let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    let digest = content_digest(&body);

    let meta = RequestMeta::new("POST", "/protected", AUTHORITY)
        .with_header("date", &date)
        .with_header("content-digest", &digest);
    let params = SignatureParams {
        alg: SignatureAlgorithm::Ed25519,
        key_id: rig.client_session.key_id().to_string(),
        created: Utc::now().timestamp(),
        nonce: Some(nonce.to_string()),
    };
    let headers = sign_request(
        &meta,
        &default_components(),
        &params,
        &SignerKey::Ed25519(&rig.alice.identity),
        DEFAULT_LABEL,
    )
    .unwrap();

    SignedRequest {
        date,
        digest,
        signature_input: headers.signature_input,
        signature: headers.signature,
        body,
    }
}

fn to_http(rig: &Rig, req: &SignedRequest) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/protected")
        .header("host", AUTHORITY)
        .header("content-type", "application/json")
        .header("date", &req.date)
        .header("content-digest", &req.digest)
        .header("x-agent-did", rig.alice.did.as_str())
        .header("signature-input", &req.signature_input)
        .header("signature", &req.signature)
        .body(Body::from(req.body.clone()))
        .unwrap()
}

async fn send(rig: &Rig, req: &SignedRequest) -> axum::response::Response {
    rig.app.clone().oneshot(to_http(rig, req)).await.unwrap()
}

#[tokio::test]
async fn happy_path_roundtrip() {
    let rig = rig().await;
    let signed = build_request(&rig, br#"{"op":"ping","ts":1}"#, "nonce-happy");

    let resp = send(&rig, &signed).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()["content-type"].to_str().unwrap(),
        "application/json"
    );

    let value: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    let cipher = STANDARD.decode(value["cipher_b64"].as_str().unwrap()).unwrap();
    let reply = rig.client_session.decrypt(&cipher).unwrap();
    let reply: serde_json::Value = serde_json::from_slice(&reply).unwrap();
    assert_eq!(
        reply,
        json!({"from": "server", "ok": true, "echo": {"op": "ping", "ts": 1}})
    );
    assert_eq!(rig.service.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn replayed_nonce_is_rejected() {
    let rig = rig().await;
    let signed = build_request(&rig, br#"{"op":"ping","ts":1}"#, "nonce-replay");

    let first = send(&rig, &signed).await;
    assert_eq!(first.status(), StatusCode::OK);

    // Bit-for-bit identical retry: same Signature-Input, same nonce.
    let second = send(&rig, &signed).await;
    assert_eq!(second.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_reason(second).await, "replay");
    // The application ran exactly once.
    assert_eq!(rig.service.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn idle_session_yields_no_session() {
    let rig = rig_with(SessionConfig {
        max_age: Duration::from_secs(3600),
        idle_timeout: Duration::from_millis(200),
        max_messages: 1000,
    })
    .await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    let signed = build_request(&rig, br#"{"op":"late"}"#, "nonce-idle");
    let resp = send(&rig, &signed).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_reason(resp).await, "no session");
    assert_eq!(rig.service.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn message_cap_closes_after_first_exchange() {
    let rig = rig_with(SessionConfig {
        max_age: Duration::from_secs(3600),
        idle_timeout: Duration::from_secs(3600),
        max_messages: 1,
    })
    .await;

    let first = build_request(&rig, br#"{"op":"one"}"#, "nonce-cap-1");
    let resp = send(&rig, &first).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let second = build_request(&rig, br#"{"op":"two"}"#, "nonce-cap-2");
    let resp = send(&rig, &second).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tampered_date_fails_but_burns_the_nonce() {
    let rig = rig().await;
    let signed = build_request(&rig, br#"{"op":"ping"}"#, "nonce-tamper");

    // Tamper with the covered Date header after signing.
    let mut req = to_http(&rig, &signed);
    req.headers_mut().insert(
        "date",
        "Mon, 02 Jan 2034 00:00:00 GMT".parse().unwrap(),
    );
    let resp = rig.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_reason(resp).await, "unauthorized");
    assert_eq!(rig.service.calls.load(Ordering::SeqCst), 0);

    // The replay guard recorded the nonce before verification failed.
    let retry = send(&rig, &signed).await;
    assert_eq!(retry.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_reason(retry).await, "replay");
}

#[tokio::test]
async fn unknown_did_is_unauthorized() {
    let rig = rig().await;
    let signed = build_request(&rig, br#"{"op":"ping"}"#, "nonce-ghost");

    let mut req = to_http(&rig, &signed);
    req.headers_mut().insert(
        "x-agent-did",
        "did:sage:ethereum:ghost".parse().unwrap(),
    );
    let resp = rig.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    // Generic body only; the AgentUnknown detail stays in the server log.
    assert_eq!(error_reason(resp).await, "unauthorized");
    assert_eq!(rig.service.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_did_header_is_bad_request() {
    let rig = rig().await;
    let signed = build_request(&rig, br#"{"op":"ping"}"#, "nonce-nodid");

    let mut req = to_http(&rig, &signed);
    req.headers_mut().remove("x-agent-did");
    let resp = rig.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_signature_input_is_bad_request() {
    let rig = rig().await;
    let signed = build_request(&rig, br#"{"op":"ping"}"#, "nonce-garbage");

    let mut req = to_http(&rig, &signed);
    req.headers_mut()
        .insert("signature-input", "not a signature".parse().unwrap());
    let resp = rig.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reduced_component_set_is_rejected() {
    let rig = rig().await;

    // Sign over everything except content-digest, and send no digest
    // header at all.  The signature itself is valid for what it covers.
    let body = rig.client_session.encrypt(br#"{"op":"ping"}"#).unwrap();
    let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    let components = vec![
        sage_http::CoveredComponent::Method,
        sage_http::CoveredComponent::Path,
        sage_http::CoveredComponent::Authority,
        sage_http::CoveredComponent::header("date"),
    ];
    let meta = RequestMeta::new("POST", "/protected", AUTHORITY).with_header("date", &date);
    let params = SignatureParams {
        alg: SignatureAlgorithm::Ed25519,
        key_id: rig.client_session.key_id().to_string(),
        created: Utc::now().timestamp(),
        nonce: Some("nonce-shrunk".to_string()),
    };
    let headers = sign_request(
        &meta,
        &components,
        &params,
        &SignerKey::Ed25519(&rig.alice.identity),
        DEFAULT_LABEL,
    )
    .unwrap();

    let req = Request::builder()
        .method("POST")
        .uri("/protected")
        .header("host", AUTHORITY)
        .header("content-type", "application/json")
        .header("date", &date)
        .header("x-agent-did", rig.alice.did.as_str())
        .header("signature-input", &headers.signature_input)
        .header("signature", &headers.signature)
        .body(Body::from(body))
        .unwrap();
    let resp = rig.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_reason(resp).await, "invalid covered components");
    assert_eq!(rig.service.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_digest_header_fails_verification() {
    let rig = rig().await;
    let signed = build_request(&rig, br#"{"op":"ping"}"#, "nonce-nodigest");

    // Full covered set in Signature-Input, but the header itself stripped:
    // verification fails on the missing component before the digest step.
    let mut req = to_http(&rig, &signed);
    req.headers_mut().remove("content-digest");
    let resp = rig.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(rig.service.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn tampered_body_fails_digest_check() {
    let rig = rig().await;
    let mut signed = build_request(&rig, br#"{"op":"ping"}"#, "nonce-body");
    signed.body[0] ^= 0x01;

    let resp = send(&rig, &signed).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(rig.service.calls.load(Ordering::SeqCst), 0);
}

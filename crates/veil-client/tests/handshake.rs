//! Integration tests for the session handshake and secure requests over HTTP.
//!
//! Each test runs a local axum server that plays the server side of the
//! protocol with a real RSA key pair: it unwraps session keys, keeps them in
//! memory, and answers secure requests with encrypted replies.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey};
use serde_json::{json, Value};
use sha2::Sha256;

use veil_client::{
    ClientConfig, ClientError, CredentialStore, NoCredentials, SecureService, SessionEstablisher,
    StaticToken,
};
use veil_common::{Method, SecureEnvelope, SessionCreateRequest};
use veil_crypto::{decode_text_to_bytes, EncryptedMessage, SessionKey, SESSION_KEY_LEN};

struct ServerState {
    private_key: RsaPrivateKey,
    public_pem: String,
    pubkey_delay: Duration,
    serve_garbage_key: AtomicBool,
    fail_next_sessions: AtomicUsize,
    pubkey_requests: AtomicUsize,
    session_requests: AtomicUsize,
    authorization: Mutex<Vec<Option<String>>>,
    sessions: Mutex<HashMap<String, Arc<SessionKey>>>,
}

type Shared = Arc<ServerState>;

async fn serve_pubkey(State(state): State<Shared>) -> String {
    state.pubkey_requests.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(state.pubkey_delay).await;
    if state.serve_garbage_key.load(Ordering::SeqCst) {
        return "-----BEGIN PUBLIC KEY-----\naGVsbG8gd29ybGQ=\n-----END PUBLIC KEY-----\n".into();
    }
    state.public_pem.clone()
}

async fn create_session(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(request): Json<SessionCreateRequest>,
) -> (StatusCode, Json<Value>) {
    let n = state.session_requests.fetch_add(1, Ordering::SeqCst) + 1;
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned);
    state.authorization.lock().unwrap().push(auth);

    let should_fail = state
        .fail_next_sessions
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if should_fail {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "session store unavailable" })),
        );
    }

    let wrapped = match decode_text_to_bytes(&request.encrypted_key) {
        Ok(bytes) => bytes,
        Err(_) => return (StatusCode::BAD_REQUEST, Json(json!({ "message": "bad base64" }))),
    };
    let raw = match state.private_key.decrypt(Oaep::new::<Sha256>(), &wrapped) {
        Ok(raw) => raw,
        Err(_) => return (StatusCode::BAD_REQUEST, Json(json!({ "message": "unwrap failed" }))),
    };
    let raw: [u8; SESSION_KEY_LEN] = match raw.try_into() {
        Ok(raw) => raw,
        Err(_) => return (StatusCode::BAD_REQUEST, Json(json!({ "message": "bad key length" }))),
    };

    let session_id = format!("sess-{}", n);
    state
        .sessions
        .lock()
        .unwrap()
        .insert(session_id.clone(), Arc::new(SessionKey::from_bytes(raw)));
    (StatusCode::OK, Json(json!({ "sessionId": session_id })))
}

async fn echo(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(envelope): Json<SecureEnvelope>,
) -> Result<Json<SecureEnvelope>, (StatusCode, Json<Value>)> {
    let header_id = headers
        .get("x-session-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if header_id != envelope.session_id {
        return Err((StatusCode::BAD_REQUEST, Json(json!({ "message": "session mismatch" }))));
    }

    let key = state
        .sessions
        .lock()
        .unwrap()
        .get(&envelope.session_id)
        .cloned()
        .ok_or((StatusCode::GONE, Json(json!({ "message": "unknown session" }))))?;

    let aad = envelope.aad.clone();
    let message = EncryptedMessage {
        iv: envelope.iv,
        ciphertext: envelope.ciphertext,
        aad: aad.clone(),
    };
    let plaintext = veil_crypto::decrypt(&key, &message, aad.as_deref())
        .map_err(|_| (StatusCode::BAD_REQUEST, Json(json!({ "message": "bad envelope" }))))?;

    let payload: Value = serde_json::from_str(&plaintext).unwrap_or(Value::Null);
    let reply = json!({ "echo": payload }).to_string();
    let sealed = veil_crypto::encrypt(&key, &reply, aad.as_deref())
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({}))))?;
    Ok(Json(SecureEnvelope {
        session_id: envelope.session_id,
        iv: sealed.iv,
        ciphertext: sealed.ciphertext,
        aad: sealed.aad,
    }))
}

async fn plain() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn empty() -> StatusCode {
    StatusCode::OK
}

async fn text() -> &'static str {
    "accepted"
}

async fn forbidden() -> (StatusCode, Json<Value>) {
    (StatusCode::FORBIDDEN, Json(json!({ "message": "not allowed" })))
}

async fn start_server(pubkey_delay: Duration) -> (SocketAddr, Shared) {
    let private_key = RsaPrivateKey::new(&mut rand::rngs::OsRng, 1024).unwrap();
    let public_pem = private_key
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)
        .unwrap();

    let state = Arc::new(ServerState {
        private_key,
        public_pem,
        pubkey_delay,
        serve_garbage_key: AtomicBool::new(false),
        fail_next_sessions: AtomicUsize::new(0),
        pubkey_requests: AtomicUsize::new(0),
        session_requests: AtomicUsize::new(0),
        authorization: Mutex::new(Vec::new()),
        sessions: Mutex::new(HashMap::new()),
    });

    let app = Router::new()
        .route("/api/crypto/pubkey", get(serve_pubkey))
        .route("/api/crypto/session", post(create_session))
        .route("/api/echo", post(echo))
        .route("/api/plain", post(plain))
        .route("/api/empty", post(empty))
        .route("/api/text", post(text))
        .route("/api/forbidden", post(forbidden))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

fn config_for(addr: SocketAddr) -> ClientConfig {
    ClientConfig::new(&format!("http://{}", addr))
        .unwrap()
        .with_timeout(Duration::from_secs(10))
}

fn establisher_for(addr: SocketAddr) -> SessionEstablisher {
    SessionEstablisher::new(config_for(addr), Arc::new(NoCredentials)).unwrap()
}

#[tokio::test]
async fn test_handshake_and_encrypted_round_trip() {
    let (addr, state) = start_server(Duration::ZERO).await;
    let credentials: Arc<dyn CredentialStore> = Arc::new(StaticToken::new("jwt-abc"));
    let service = SecureService::over_http(config_for(addr), credentials).unwrap();

    let session = service.establish_session().await.unwrap();
    assert_eq!(session.id().as_str(), "sess-1");
    assert!(service.is_established());
    assert_eq!(
        state.authorization.lock().unwrap().as_slice(),
        &[Some("Bearer jwt-abc".to_string())]
    );

    let reply = service
        .secure_send("/api/echo", Method::Post, &json!({ "message": "test payload" }))
        .await
        .unwrap();
    assert_eq!(reply, json!({ "echo": { "message": "test payload" } }));

    let reply = service
        .secure_send_with_context("/api/echo", Method::Post, &json!([1, 2, 3]), "POST /api/echo")
        .await
        .unwrap();
    assert_eq!(reply, json!({ "echo": [1, 2, 3] }));
}

#[tokio::test]
async fn test_anonymous_handshake_sends_no_authorization() {
    let (addr, state) = start_server(Duration::ZERO).await;
    let establisher = establisher_for(addr);

    establisher.establish().await.unwrap();
    assert_eq!(state.authorization.lock().unwrap().as_slice(), &[None]);
}

#[tokio::test]
async fn test_concurrent_establish_is_single_flight() {
    let (addr, state) = start_server(Duration::from_millis(300)).await;
    let establisher = establisher_for(addr);

    let (a, b) = tokio::join!(establisher.establish(), establisher.establish());
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(state.pubkey_requests.load(Ordering::SeqCst), 1);
    assert_eq!(state.session_requests.load(Ordering::SeqCst), 1);

    // The memo is cleared once resolved; a later call runs a new handshake.
    let c = establisher.establish().await.unwrap();
    assert_ne!(a.id(), c.id());
    assert_eq!(state.pubkey_requests.load(Ordering::SeqCst), 2);
    assert_eq!(state.session_requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cloned_establishers_share_the_flight() {
    let (addr, state) = start_server(Duration::from_millis(300)).await;
    let establisher = establisher_for(addr);
    let other = establisher.clone();

    let (a, b) = tokio::join!(establisher.establish(), other.establish());
    assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    assert_eq!(state.session_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_abandoned_handshake_is_resumed() {
    let (addr, state) = start_server(Duration::from_millis(300)).await;
    let establisher = establisher_for(addr);

    let abandoned = tokio::time::timeout(Duration::from_millis(50), establisher.establish()).await;
    assert!(abandoned.is_err());

    let session = establisher.establish().await.unwrap();
    assert_eq!(session.id().as_str(), "sess-1");
    assert_eq!(state.pubkey_requests.load(Ordering::SeqCst), 1);
    assert_eq!(state.session_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_handshake_is_shared_then_retryable() {
    let (addr, state) = start_server(Duration::from_millis(300)).await;
    state.fail_next_sessions.store(1, Ordering::SeqCst);
    let establisher = establisher_for(addr);

    let (a, b) = tokio::join!(establisher.establish(), establisher.establish());
    let expected = ClientError::SessionCreate("session store unavailable".into());
    assert_eq!(a.unwrap_err(), expected);
    assert_eq!(b.unwrap_err(), expected);
    assert_eq!(state.session_requests.load(Ordering::SeqCst), 1);

    let session = establisher.establish().await.unwrap();
    assert_eq!(session.id().as_str(), "sess-2");
    assert_eq!(state.pubkey_requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_public_key_fetch_failure() {
    let (addr, state) = start_server(Duration::ZERO).await;
    let mut config = config_for(addr);
    config.public_key_path = "/api/crypto/missing".into();
    let establisher = SessionEstablisher::new(config, Arc::new(NoCredentials)).unwrap();

    let err = establisher.establish().await.unwrap_err();
    assert!(matches!(err, ClientError::PublicKeyFetch(ref m) if m.contains("404")));
    assert_eq!(state.session_requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unreachable_server_is_a_fetch_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = establisher_for(addr).establish().await.unwrap_err();
    assert!(matches!(err, ClientError::PublicKeyFetch(_)));
}

#[tokio::test]
async fn test_invalid_public_key_aborts_handshake() {
    let (addr, state) = start_server(Duration::ZERO).await;
    state.serve_garbage_key.store(true, Ordering::SeqCst);

    let err = establisher_for(addr).establish().await.unwrap_err();
    assert!(matches!(err, ClientError::KeyImport(_)));
    assert_eq!(state.session_requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_response_without_session_id() {
    let (addr, _state) = start_server(Duration::ZERO).await;
    let mut config = config_for(addr);
    config.session_path = "/api/plain".into();
    let establisher = SessionEstablisher::new(config, Arc::new(NoCredentials)).unwrap();

    let err = establisher.establish().await.unwrap_err();
    assert!(matches!(err, ClientError::SessionCreate(ref m) if m.contains("without a session id")));
}

#[tokio::test]
async fn test_server_invalidation_requires_new_handshake() {
    let (addr, state) = start_server(Duration::ZERO).await;
    let service = SecureService::over_http(config_for(addr), Arc::new(NoCredentials)).unwrap();
    service.establish_session().await.unwrap();

    state.sessions.lock().unwrap().clear();
    let err = service
        .secure_send("/api/echo", Method::Post, &json!({ "n": 1 }))
        .await
        .unwrap_err();
    assert_eq!(err, ClientError::SessionInvalidated);
    assert!(!service.is_established());

    let err = service
        .secure_send("/api/echo", Method::Post, &json!({ "n": 2 }))
        .await
        .unwrap_err();
    assert_eq!(err, ClientError::UninitializedChannel);

    let session = service.establish_session().await.unwrap();
    assert_eq!(session.id().as_str(), "sess-2");
    let reply = service
        .secure_send("/api/echo", Method::Post, &json!({ "n": 3 }))
        .await
        .unwrap();
    assert_eq!(reply, json!({ "echo": { "n": 3 } }));
}

#[tokio::test]
async fn test_plain_and_error_replies() {
    let (addr, _state) = start_server(Duration::ZERO).await;
    let service = SecureService::over_http(config_for(addr), Arc::new(NoCredentials)).unwrap();
    service.establish_session().await.unwrap();

    let reply = service
        .secure_send("/api/plain", Method::Post, &json!({}))
        .await
        .unwrap();
    assert_eq!(reply, json!({ "ok": true }));

    let reply = service
        .secure_send("/api/empty", Method::Post, &json!({}))
        .await
        .unwrap();
    assert_eq!(reply, Value::Null);

    let err = service
        .secure_send("/api/text", Method::Post, &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Transport(ref m) if m.contains("invalid response")));

    let err = service
        .secure_send("/api/forbidden", Method::Post, &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Transport(ref m) if m.contains("403") && m.contains("not allowed")));
    assert!(service.is_established());
}

//! Session handshake.
//!
//! # Handshake Flow
//!
//! ```text
//! Client                                         Server
//!   |  GET  /api/crypto/pubkey                      |
//!   |---------------------------------------------->|
//!   |  <- PEM RSA public key                        |
//!   |<----------------------------------------------|
//!   |                                               |
//!   |  generate AES-256 key K                       |
//!   |  W = RSA-OAEP-SHA256(pub, K)                  |
//!   |                                               |
//!   |  POST /api/crypto/session {encryptedKey: W}   |
//!   |  (Authorization: Bearer <token> if present)   |
//!   |---------------------------------------------->|
//!   |  <- {sessionId}                               |
//!   |<----------------------------------------------|
//! ```
//!
//! K never leaves the client except wrapped under the server's public key.
//!
//! # Single flight
//!
//! Concurrent [`SessionEstablisher::establish`] calls share one in-flight
//! handshake and all receive its result. The memo is cleared as soon as the
//! handshake resolves, so a failure can be retried by the next call.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use veil_common::SessionCreateRequest;
use veil_common::SessionCreateResponse;
use veil_crypto::{encode_bytes_to_text, import_public_key, SessionKey};

use crate::config::ClientConfig;
use crate::credentials::CredentialStore;
use crate::error::ClientError;
use crate::session::{Session, SessionId};

type HandshakeOutcome = Result<Arc<Session>, ClientError>;
type HandshakeFuture = Shared<BoxFuture<'static, HandshakeOutcome>>;

struct InFlight {
    generation: u64,
    future: HandshakeFuture,
}

#[derive(Default)]
struct FlightState {
    next_generation: u64,
    current: Option<InFlight>,
}

/// Runs handshakes against one server, at most one at a time.
#[derive(Clone)]
pub struct SessionEstablisher {
    handshake: Handshake,
    flight: Arc<Mutex<FlightState>>,
}

impl SessionEstablisher {
    pub fn new(
        config: ClientConfig,
        credentials: Arc<dyn CredentialStore>,
    ) -> veil_common::Result<Self> {
        let http = config.http_client()?;
        Ok(Self::with_http_client(config, credentials, http))
    }

    /// Build with an existing HTTP client (shared connection pool).
    pub fn with_http_client(
        config: ClientConfig,
        credentials: Arc<dyn CredentialStore>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            handshake: Handshake {
                http,
                config: Arc::new(config),
                credentials,
            },
            flight: Arc::new(Mutex::new(FlightState::default())),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.handshake.config
    }

    /// Establish a session, joining a handshake already in flight if any.
    ///
    /// Cancelling every caller does not cancel the handshake: it stays
    /// memoized, paused, and the next call resumes it. Until then the paused
    /// future (and any connection it holds) lives as long as the establisher.
    pub async fn establish(&self) -> Result<Arc<Session>, ClientError> {
        let (generation, future) = {
            let mut flight = self.flight.lock().await;
            // A resolved memo left behind by a cancelled caller is stale.
            let pending = flight
                .current
                .as_ref()
                .filter(|in_flight| in_flight.future.peek().is_none());
            match pending {
                Some(in_flight) => {
                    debug!("joining in-flight handshake");
                    (in_flight.generation, in_flight.future.clone())
                }
                None => {
                    flight.next_generation = flight.next_generation.wrapping_add(1);
                    let generation = flight.next_generation;
                    let future = self.handshake.clone().run().boxed().shared();
                    flight.current = Some(InFlight {
                        generation,
                        future: future.clone(),
                    });
                    (generation, future)
                }
            }
        };

        let outcome = future.await;

        let mut flight = self.flight.lock().await;
        if flight
            .current
            .as_ref()
            .is_some_and(|in_flight| in_flight.generation == generation)
        {
            flight.current = None;
        }

        outcome
    }
}

/// Everything one handshake needs, owned so the future is `'static`.
#[derive(Clone)]
struct Handshake {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    credentials: Arc<dyn CredentialStore>,
}

impl Handshake {
    async fn run(self) -> HandshakeOutcome {
        match self.perform().await {
            Ok(session) => {
                info!("session established: {}", session.id());
                Ok(Arc::new(session))
            }
            Err(e) => {
                warn!("handshake failed: {}", e);
                Err(e)
            }
        }
    }

    async fn perform(&self) -> Result<Session, ClientError> {
        // 1. Fetch the server's current public key
        let pubkey_url = self.config.public_key_url();
        info!("fetching public key from {}", pubkey_url);
        let response = self
            .http
            .get(&pubkey_url)
            .send()
            .await
            .map_err(|e| ClientError::PublicKeyFetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::PublicKeyFetch(format!(
                "server returned {}",
                status
            )));
        }
        let pem = response
            .text()
            .await
            .map_err(|e| ClientError::PublicKeyFetch(e.to_string()))?;
        debug!("received public key ({} bytes)", pem.len());

        // 2. Import it as an encrypt-only handle
        let public_key = import_public_key(&pem)?;

        // 3. Generate the session key
        let key = SessionKey::generate();

        // 4. Wrap the key; the handle is consumed here
        let wrapped = public_key.wrap_session_key(&key)?;
        let body = SessionCreateRequest {
            encrypted_key: encode_bytes_to_text(&wrapped),
        };
        debug!("wrapped session key ({} bytes base64)", body.encrypted_key.len());

        // 5. Register the wrapped key
        let mut request = self.http.post(self.config.session_url()).json(&body);
        if let Some(token) = self.credentials.bearer_token() {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ClientError::SessionCreate(e.to_string()))?;

        let status = response.status();
        let payload: SessionCreateResponse = response.json().await.unwrap_or_default();

        match payload.session_id.as_deref() {
            Some(id) if status.is_success() && !id.is_empty() => {
                Ok(Session::new(SessionId::new(id), key))
            }
            _ => {
                let message = payload
                    .server_message()
                    .map(ToOwned::to_owned)
                    .unwrap_or_else(|| format!("server returned {} without a session id", status));
                Err(ClientError::SessionCreate(message))
            }
        }
    }
}

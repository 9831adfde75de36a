//! Secure request facade.
//!
//! [`SecureService`] binds an attached [`Session`] to outbound application
//! requests: it serializes the payload, seals it under the session key, and
//! hands the envelope to the [`Transport`]. It never starts a handshake on
//! its own; call [`SecureService::establish_session`] (or attach a session)
//! first, so the handshake and its network failures stay visible to the
//! caller.

use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use veil_common::Method;
use veil_crypto::EncryptedMessage;

use crate::config::ClientConfig;
use crate::credentials::CredentialStore;
use crate::error::ClientError;
use crate::establish::SessionEstablisher;
use crate::session::Session;
use crate::transport::{HttpTransport, SecureRequest, Transport};

pub struct SecureService {
    establisher: SessionEstablisher,
    transport: Arc<dyn Transport>,
    session: RwLock<Option<Arc<Session>>>,
}

impl SecureService {
    pub fn new(establisher: SessionEstablisher, transport: Arc<dyn Transport>) -> Self {
        Self {
            establisher,
            transport,
            session: RwLock::new(None),
        }
    }

    /// HTTP-backed service; the handshake and the transport share one
    /// connection pool.
    pub fn over_http(
        config: ClientConfig,
        credentials: Arc<dyn CredentialStore>,
    ) -> veil_common::Result<Self> {
        let http = config.http_client()?;
        let establisher =
            SessionEstablisher::with_http_client(config.clone(), credentials.clone(), http.clone());
        let transport = HttpTransport::with_http_client(config, credentials, http);
        Ok(Self::new(establisher, Arc::new(transport)))
    }

    /// Run the handshake and attach the resulting session.
    pub async fn establish_session(&self) -> Result<Arc<Session>, ClientError> {
        let session = self.establisher.establish().await?;
        self.attach(session.clone());
        Ok(session)
    }

    /// Attach an already established session, replacing any previous one.
    pub fn attach(&self, session: Arc<Session>) {
        let mut slot = self.session.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(session);
    }

    /// Drop the current session; the next request needs a new handshake.
    pub fn logout(&self) -> Option<Arc<Session>> {
        let mut slot = self.session.write().unwrap_or_else(|e| e.into_inner());
        let previous = slot.take();
        if let Some(session) = &previous {
            info!("session {} dropped", session.id());
        }
        previous
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_established(&self) -> bool {
        self.session().is_some()
    }

    /// Seal `data` and send it to `endpoint`.
    pub async fn secure_send<T: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        method: Method,
        data: &T,
    ) -> Result<Value, ClientError> {
        self.send_sealed(endpoint, method, data, None).await
    }

    /// Like [`secure_send`](Self::secure_send), with the envelope bound to
    /// `context` as associated data. The reply, if encrypted, must be bound
    /// to the same context. An empty context is the same as none.
    pub async fn secure_send_with_context<T: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        method: Method,
        data: &T,
        context: &str,
    ) -> Result<Value, ClientError> {
        self.send_sealed(endpoint, method, data, Some(context)).await
    }

    async fn send_sealed<T: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        method: Method,
        data: &T,
        aad: Option<&str>,
    ) -> Result<Value, ClientError> {
        let session = self.session().ok_or(ClientError::UninitializedChannel)?;

        let plaintext = serde_json::to_string(data)?;
        let envelope = session.encrypt(&plaintext, aad)?;

        let request = SecureRequest {
            endpoint: endpoint.to_string(),
            method,
            envelope,
            session_id: session.id().clone(),
        };

        match self.transport.send(request).await {
            Ok(reply) => open_reply(&session, reply, aad),
            Err(e) => {
                let err = ClientError::from(e);
                if err == ClientError::SessionInvalidated {
                    warn!("session {} invalidated by server", session.id());
                    self.detach_if_current(&session);
                }
                Err(err)
            }
        }
    }

    // Only drop the session the failed request used; a newer one may
    // already be attached.
    fn detach_if_current(&self, session: &Arc<Session>) {
        let mut slot = self.session.write().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, session)) {
            *slot = None;
        }
    }

    pub fn assignments(&self) -> Assignments<'_> {
        Assignments { service: self }
    }
}

/// Decrypt the reply when it is a sealed envelope, otherwise pass it through.
///
/// A sealed reply has the request envelope's shape: string `iv` and
/// `ciphertext` tagged with the `sessionId` of the session it was sealed
/// under. Anything else is plain JSON, whatever fields it has.
fn open_reply(session: &Session, reply: Value, aad: Option<&str>) -> Result<Value, ClientError> {
    let sealed = match (
        reply.get("sessionId"),
        reply.get("iv"),
        reply.get("ciphertext"),
    ) {
        (Some(Value::String(id)), Some(Value::String(iv)), Some(Value::String(ciphertext)))
            if id == session.id().as_str() =>
        {
            EncryptedMessage {
                iv: iv.clone(),
                ciphertext: ciphertext.clone(),
                aad: None,
            }
        }
        _ => return Ok(reply),
    };

    let plaintext = session.decrypt(&sealed, aad)?;
    debug!("decrypted reply ({} bytes)", plaintext.len());
    Ok(serde_json::from_str(&plaintext).unwrap_or(Value::String(plaintext)))
}

/// Assignment operations, sent through the secure channel.
pub struct Assignments<'a> {
    service: &'a SecureService,
}

impl Assignments<'_> {
    pub async fn create<T: Serialize + ?Sized>(&self, assignment: &T) -> Result<Value, ClientError> {
        self.service
            .secure_send("/api/assignments", Method::Post, assignment)
            .await
    }

    pub async fn update<T: Serialize + ?Sized>(
        &self,
        id: &str,
        assignment: &T,
    ) -> Result<Value, ClientError> {
        self.service
            .secure_send(&format!("/api/assignments/{}", id), Method::Post, assignment)
            .await
    }

    pub async fn update_stage(&self, id: &str, stage: &str) -> Result<Value, ClientError> {
        self.service
            .secure_send(
                &format!("/api/assignments/{}/stage", id),
                Method::Post,
                &json!({ "stage": stage }),
            )
            .await
    }
}

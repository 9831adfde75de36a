//! Transport seam for secure requests.
//!
//! The facade hands every sealed request to a [`Transport`]. Retry policy,
//! timeouts, and status handling belong to the transport, not to the core.
//! [`HttpTransport`] is the stock implementation over `reqwest`.
//!
//! # Wire Format
//!
//! ```text
//! {METHOD} {api_base}{endpoint}
//! X-Session-Id: <session id>
//! Authorization: Bearer <token>        (when a token is present)
//!
//! { "sessionId": "...", "iv": "...", "ciphertext": "...", "aad"?: "..." }
//! ```
//!
//! A `410 Gone` reply means the server no longer knows the session.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, warn};

use veil_common::helpers::server_message;
use veil_common::{Method, SecureEnvelope};
use veil_crypto::EncryptedMessage;

use crate::config::ClientConfig;
use crate::credentials::CredentialStore;
use crate::session::SessionId;

/// Header carrying the session id alongside the envelope.
pub const SESSION_HEADER: &str = "X-Session-Id";

/// A sealed application request.
#[derive(Debug, Clone)]
pub struct SecureRequest {
    pub endpoint: String,
    pub method: Method,
    pub envelope: EncryptedMessage,
    pub session_id: SessionId,
}

impl SecureRequest {
    /// JSON body sent on the wire.
    pub fn to_envelope(&self) -> SecureEnvelope {
        SecureEnvelope {
            session_id: self.session_id.as_str().to_string(),
            iv: self.envelope.iv.clone(),
            ciphertext: self.envelope.ciphertext.clone(),
            aad: self.envelope.aad.clone(),
        }
    }
}

/// Transport failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("session no longer valid on server")]
    SessionInvalidated,

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Sends sealed requests and returns the server's JSON reply.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: SecureRequest) -> Result<serde_json::Value, TransportError>;
}

/// HTTP transport over `reqwest`.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    credentials: Arc<dyn CredentialStore>,
}

impl HttpTransport {
    pub fn new(
        config: ClientConfig,
        credentials: Arc<dyn CredentialStore>,
    ) -> veil_common::Result<Self> {
        let http = config.http_client()?;
        Ok(Self::with_http_client(config, credentials, http))
    }

    pub fn with_http_client(
        config: ClientConfig,
        credentials: Arc<dyn CredentialStore>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            http,
            config: Arc::new(config),
            credentials,
        }
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: SecureRequest) -> Result<serde_json::Value, TransportError> {
        let url = self.config.endpoint_url(&request.endpoint);
        debug!("secure {} {}", request.method, request.endpoint);

        let mut builder = self
            .http
            .request(to_reqwest_method(request.method), &url)
            .header(SESSION_HEADER, request.session_id.as_str())
            .json(&request.to_envelope());
        if let Some(token) = self.credentials.bearer_token() {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if status == StatusCode::GONE {
            warn!("server rejected session {}", request.session_id);
            return Err(TransportError::SessionInvalidated);
        }

        let body: serde_json::Value = if bytes.is_empty() {
            serde_json::Value::Null
        } else if status.is_success() {
            serde_json::from_slice(&bytes)
                .map_err(|e| TransportError::InvalidResponse(e.to_string()))?
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };

        if !status.is_success() {
            let message = server_message(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(body)
    }
}

//! Live session state.
//!
//! A [`Session`] is created by a successful handshake and dropped on
//! logout, invalidation, or process exit. It is never persisted, so a new
//! process always runs a new handshake.

use std::fmt;

use veil_crypto::{EncryptedMessage, SessionKey};

use crate::error::ClientError;

/// Opaque session correlator issued by the server.
///
/// Not secret (it travels in clear with every request) but unguessable;
/// it carries no key material.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

/// Session id plus the symmetric key the server holds a copy of.
pub struct Session {
    id: SessionId,
    key: SessionKey,
}

impl Session {
    pub fn new(id: SessionId, key: SessionKey) -> Self {
        Self { id, key }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Seal a plaintext under the session key.
    pub fn encrypt(&self, plaintext: &str, aad: Option<&str>) -> Result<EncryptedMessage, ClientError> {
        Ok(veil_crypto::encrypt(&self.key, plaintext, aad)?)
    }

    /// Open a message sealed under the session key.
    pub fn decrypt(&self, message: &EncryptedMessage, aad: Option<&str>) -> Result<String, ClientError> {
        Ok(veil_crypto::decrypt(&self.key, message, aad)?)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("key", &self.key)
            .finish()
    }
}

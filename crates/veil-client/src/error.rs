//! Client error taxonomy.
//!
//! Every variant is terminal for the operation that raised it; nothing is
//! retried inside the client. The type is `Clone` so that every caller
//! joined on one in-flight handshake receives the same failure.

use thiserror::Error;
use veil_crypto::{ChannelError, CodecError, KeyImportError, WrapError};

use crate::transport::TransportError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Codec failures from direct use of the `veil_crypto` codec; the
    /// handshake reports key import failures as `KeyImport`.
    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("malformed key format: {0}")]
    MalformedKeyFormat(String),

    #[error("public key import failed: {0}")]
    KeyImport(String),

    #[error("public key fetch failed: {0}")]
    PublicKeyFetch(String),

    #[error("session creation failed: {0}")]
    SessionCreate(String),

    #[error("secure channel not initialized: establish a session first")]
    UninitializedChannel,

    #[error("encryption failed")]
    Encryption,

    #[error("decryption failed")]
    Decryption,

    #[error("session invalidated by server; establish a new session")]
    SessionInvalidated,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<CodecError> for ClientError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Encoding(msg) => ClientError::Encoding(msg),
            CodecError::MalformedKeyFormat(msg) => ClientError::MalformedKeyFormat(msg),
        }
    }
}

impl From<KeyImportError> for ClientError {
    fn from(err: KeyImportError) -> Self {
        ClientError::KeyImport(err.to_string())
    }
}

impl From<WrapError> for ClientError {
    // Wrapping only fails when the imported key cannot carry the payload.
    fn from(err: WrapError) -> Self {
        ClientError::KeyImport(err.to_string())
    }
}

impl From<ChannelError> for ClientError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Decryption => ClientError::Decryption,
            ChannelError::Encryption => ClientError::Encryption,
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::SessionInvalidated => ClientError::SessionInvalidated,
            other => ClientError::Transport(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization(err.to_string())
    }
}

//! Asymmetric wrapping of session keys.
//!
//! The server publishes an RSA public key. The client imports it as a
//! [`PublicKeyHandle`], whose only capability is RSA-OAEP (SHA-256)
//! encryption of a [`SessionKey`]. Only the holder of the private half can
//! unwrap the key, so a passive observer who sees the wrapped blob learns
//! nothing about the session key.
//!
//! Wrapping consumes the handle. A fresh handle is imported for every
//! handshake, so a key rotation on the server is always picked up.

use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use sha2::Sha256;
use std::fmt;
use thiserror::Error;

use crate::codec::{decode_textual_key, CodecError};
use crate::key::SessionKey;

/// PEM label of a PKCS#1 `RSAPublicKey` block.
const PKCS1_LABEL: &str = "RSA PUBLIC KEY";

/// Public key import errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyImportError {
    #[error("malformed key: {0}")]
    Malformed(#[from] CodecError),

    #[error("unsupported or invalid public key: {0}")]
    Unsupported(String),
}

/// Session key wrapping errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WrapError {
    #[error("RSA-OAEP encryption failed: {0}")]
    Encryption(String),
}

/// Encrypt-only handle to the server's RSA public key.
pub struct PublicKeyHandle {
    key: RsaPublicKey,
}

impl PublicKeyHandle {
    /// Wrap a session key under this public key with RSA-OAEP/SHA-256.
    ///
    /// Returns the raw wrapped bytes; encode them with
    /// [`encode_bytes_to_text`](crate::codec::encode_bytes_to_text) for transport.
    pub fn wrap_session_key(self, session_key: &SessionKey) -> Result<Vec<u8>, WrapError> {
        let mut rng = rand::rngs::OsRng;
        self.key
            .encrypt(&mut rng, Oaep::new::<Sha256>(), session_key.as_bytes())
            .map_err(|e| WrapError::Encryption(e.to_string()))
    }
}

impl fmt::Debug for PublicKeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use rsa::traits::PublicKeyParts;
        write!(f, "PublicKeyHandle(rsa-{})", self.key.size() * 8)
    }
}

/// Import a PEM-armored RSA public key.
///
/// Accepts SubjectPublicKeyInfo (`BEGIN PUBLIC KEY`) and PKCS#1
/// (`BEGIN RSA PUBLIC KEY`) armor.
pub fn import_public_key(textual_key: &str) -> Result<PublicKeyHandle, KeyImportError> {
    let der = decode_textual_key(textual_key)?;

    let key = if textual_key.contains(PKCS1_LABEL) {
        RsaPublicKey::from_pkcs1_der(&der).map_err(|e| KeyImportError::Unsupported(e.to_string()))?
    } else {
        RsaPublicKey::from_public_key_der(&der)
            .map_err(|e| KeyImportError::Unsupported(e.to_string()))?
    };

    Ok(PublicKeyHandle { key })
}

//! Authenticated channel over a session key.
//!
//! Each payload is sealed with AES-256-GCM under the session key and a
//! freshly random 96-bit nonce. Optional associated data binds the message
//! to a context string that must be presented again on decryption. An empty
//! context string is the same as no context.
//!
//! # Wire Format
//!
//! ```text
//! { "iv": base64(12 bytes), "ciphertext": base64(ciphertext || 16-byte tag), "aad"?: string }
//! ```
//!
//! Both operations are stateless: the key is only read, and nonces come from
//! the OS CSPRNG, so any number of callers may share one key concurrently.
//!
//! Decryption fails with a single, uniform [`ChannelError::Decryption`]
//! whatever went wrong, so callers cannot tell a tampered message from a
//! wrong key.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::{decode_text_to_bytes, encode_bytes_to_text};
use crate::key::SessionKey;

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Channel errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("encryption failed")]
    Encryption,

    #[error("decryption failed")]
    Decryption,
}

/// An encrypted payload ready for transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedMessage {
    /// Base64 of the 12-byte nonce
    pub iv: String,
    /// Base64 of ciphertext with the appended tag
    pub ciphertext: String,
    /// Associated data the message was bound to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aad: Option<String>,
}

fn cipher(key: &SessionKey) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()))
}

/// Encrypt a UTF-8 plaintext under the session key.
///
/// `Some("")` is treated as `None` and leaves no `aad` on the message.
pub fn encrypt(
    key: &SessionKey,
    plaintext: &str,
    aad: Option<&str>,
) -> Result<EncryptedMessage, ChannelError> {
    let aad = aad.filter(|a| !a.is_empty());
    let mut iv = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = cipher(key)
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: plaintext.as_bytes(),
                aad: aad.unwrap_or_default().as_bytes(),
            },
        )
        .map_err(|_| ChannelError::Encryption)?;

    Ok(EncryptedMessage {
        iv: encode_bytes_to_text(&iv),
        ciphertext: encode_bytes_to_text(&ciphertext),
        aad: aad.map(str::to_owned),
    })
}

/// Decrypt and authenticate a message.
///
/// `aad` must equal the value used for encryption. The `aad` carried inside
/// the message is informational only and is never trusted here.
pub fn decrypt(
    key: &SessionKey,
    message: &EncryptedMessage,
    aad: Option<&str>,
) -> Result<String, ChannelError> {
    let iv = decode_text_to_bytes(&message.iv).map_err(|_| ChannelError::Decryption)?;
    if iv.len() != NONCE_LEN {
        return Err(ChannelError::Decryption);
    }
    let ciphertext =
        decode_text_to_bytes(&message.ciphertext).map_err(|_| ChannelError::Decryption)?;

    let plaintext = cipher(key)
        .decrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: &ciphertext,
                aad: aad.unwrap_or_default().as_bytes(),
            },
        )
        .map_err(|_| ChannelError::Decryption)?;

    String::from_utf8(plaintext).map_err(|_| ChannelError::Decryption)
}

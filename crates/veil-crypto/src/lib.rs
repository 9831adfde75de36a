//! Cryptographic primitives for Veil.
//!
//! This crate provides:
//! - Base64 and PEM-armor codecs for wire transport of binary material
//! - RSA-OAEP (SHA-256) import of the server's public key, encrypt-only
//! - 256-bit session key generation
//! - AES-256-GCM authenticated channel with a fresh random nonce per message
//!
//! # Design
//!
//! A session is established by hybrid encryption: the client generates a
//! symmetric key, wraps it under the server's RSA public key, and from then on
//! every payload travels as an [`EncryptedMessage`] sealed with that key.
//!
//! Nonces are random rather than counters, so encryption under a shared key
//! needs no coordination between concurrent callers.

#![forbid(unsafe_code)]

pub mod channel;
pub mod codec;
pub mod key;
pub mod wrap;

pub use channel::{decrypt, encrypt, ChannelError, EncryptedMessage, NONCE_LEN};
pub use codec::{decode_text_to_bytes, decode_textual_key, encode_bytes_to_text, CodecError};
pub use key::{SessionKey, SESSION_KEY_LEN};
pub use wrap::{import_public_key, KeyImportError, PublicKeyHandle, WrapError};

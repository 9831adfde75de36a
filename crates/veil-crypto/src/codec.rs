//! Text encodings for binary key material.
//!
//! Everything binary that crosses the wire (wrapped keys, nonces,
//! ciphertext) is carried as standard padded base64. Server public keys
//! arrive PEM-armored; [`decode_textual_key`] strips the armor and returns
//! the DER body.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

/// Armor delimiter that opens `-----BEGIN ...-----` / `-----END ...-----` lines.
const ARMOR_DELIMITER: &str = "-----";

/// Codec errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("invalid base64: {0}")]
    Encoding(String),

    #[error("malformed key format: {0}")]
    MalformedKeyFormat(String),
}

/// Decode a PEM-armored key block into its raw DER bytes.
///
/// Header and footer lines are dropped, all whitespace is removed, and the
/// remaining body must be valid base64.
pub fn decode_textual_key(text: &str) -> Result<Vec<u8>, CodecError> {
    let body: String = text
        .lines()
        .filter(|line| !line.trim_start().starts_with(ARMOR_DELIMITER))
        .flat_map(|line| line.chars())
        .filter(|c| !c.is_whitespace())
        .collect();

    if body.is_empty() {
        return Err(CodecError::MalformedKeyFormat("empty key body".into()));
    }

    STANDARD
        .decode(body.as_bytes())
        .map_err(|e| CodecError::MalformedKeyFormat(e.to_string()))
}

/// Encode bytes as standard padded base64.
pub fn encode_bytes_to_text(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard padded base64.
pub fn decode_text_to_bytes(text: &str) -> Result<Vec<u8>, CodecError> {
    STANDARD
        .decode(text.as_bytes())
        .map_err(|e| CodecError::Encoding(e.to_string()))
}

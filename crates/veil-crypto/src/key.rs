//! Session keys.
//!
//! A [`SessionKey`] is the 256-bit AES-GCM key shared by the client and the
//! server for one session. It lives only in memory: it is not `Serialize`,
//! its `Debug` output is redacted, and the bytes are zeroized on drop.
//! The raw bytes are only reachable inside this crate, where they are
//! wrapped for the server or fed to the cipher.

use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Session key length in bytes (AES-256).
pub const SESSION_KEY_LEN: usize = 32;

/// Symmetric session key, usable for both encryption and decryption.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKey {
    bytes: [u8; SESSION_KEY_LEN],
}

impl SessionKey {
    /// Generate a fresh key from the OS CSPRNG.
    ///
    /// Entropy failure is unrecoverable and panics inside the RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Rebuild a key from raw bytes (server side, after unwrapping).
    pub fn from_bytes(bytes: [u8; SESSION_KEY_LEN]) -> Self {
        Self { bytes }
    }

    pub(crate) fn as_bytes(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

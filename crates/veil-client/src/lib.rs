//! Veil client: hybrid-encryption session layer.
//!
//! - [`SessionEstablisher`] runs the handshake (fetch RSA public key, wrap a
//!   fresh AES-256 key, register it with the server) behind a single-flight
//!   guard.
//! - [`Session`] holds the resulting session id and key in memory only.
//! - [`SecureService`] encrypts application payloads under the attached
//!   session and hands them to a [`Transport`].

#![forbid(unsafe_code)]

pub mod config;
pub mod credentials;
pub mod error;
pub mod establish;
pub mod service;
pub mod session;
pub mod transport;

pub use config::ClientConfig;
pub use credentials::{CredentialStore, NoCredentials, SharedToken, StaticToken};
pub use error::ClientError;
pub use establish::SessionEstablisher;
pub use service::{Assignments, SecureService};
pub use session::{Session, SessionId};
pub use transport::{HttpTransport, SecureRequest, Transport, TransportError};

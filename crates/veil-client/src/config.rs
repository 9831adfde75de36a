//! Client configuration.
//!
//! Settings come from code (`Default` plus builder methods) or from the
//! environment:
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `VEIL_API_URL` | API base URL | `http://127.0.0.1:3000` |
//! | `VEIL_PUBKEY_PATH` | public key endpoint | `/api/crypto/pubkey` |
//! | `VEIL_SESSION_PATH` | session creation endpoint | `/api/crypto/session` |
//! | `VEIL_HTTP_TIMEOUT_SECS` | per-request timeout | none |

use std::time::Duration;

use veil_common::helpers::{join_url, normalize_base_url};

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:3000";
pub const DEFAULT_PUBLIC_KEY_PATH: &str = "/api/crypto/pubkey";
pub const DEFAULT_SESSION_PATH: &str = "/api/crypto/session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Normalized API base URL (no trailing slash)
    pub api_base: String,
    pub public_key_path: String,
    pub session_path: String,
    /// Applied to every HTTP request when set
    pub request_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            public_key_path: DEFAULT_PUBLIC_KEY_PATH.to_string(),
            session_path: DEFAULT_SESSION_PATH.to_string(),
            request_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Default configuration pointed at `api_base`.
    pub fn new(api_base: &str) -> veil_common::Result<Self> {
        Ok(Self {
            api_base: normalize_base_url(api_base)?,
            ..Self::default()
        })
    }

    /// Load configuration from `VEIL_*` environment variables.
    pub fn from_env() -> veil_common::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> veil_common::Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let mut config = match get("VEIL_API_URL") {
            Some(base) => Self::new(&base)?,
            None => Self::default(),
        };
        if let Some(path) = get("VEIL_PUBKEY_PATH") {
            config.public_key_path = path.trim().to_string();
        }
        if let Some(path) = get("VEIL_SESSION_PATH") {
            config.session_path = path.trim().to_string();
        }
        if let Some(secs) = get("VEIL_HTTP_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                veil_common::Error::config(format!("invalid VEIL_HTTP_TIMEOUT_SECS: {}", secs))
            })?;
            config.request_timeout = Some(Duration::from_secs(secs));
        }
        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn public_key_url(&self) -> String {
        join_url(&self.api_base, &self.public_key_path)
    }

    pub fn session_url(&self) -> String {
        join_url(&self.api_base, &self.session_path)
    }

    pub fn endpoint_url(&self, endpoint: &str) -> String {
        join_url(&self.api_base, endpoint)
    }

    /// Build the HTTP client shared by the handshake and the transport.
    pub fn http_client(&self) -> veil_common::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        builder.build().map_err(veil_common::Error::config)
    }
}

//! Common helper functions for Veil.

use crate::{Error, Result};

/// Normalize an API base URL: trims whitespace and trailing slashes and
/// requires an `http` or `https` scheme.
pub fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::config("API base URL is empty"));
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(Error::config(format!(
            "API base URL must start with http:// or https://, got {}",
            trimmed
        )));
    }
    Ok(trimmed.to_string())
}

/// Join a normalized base URL and an endpoint path.
pub fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Extract a human-readable message from a JSON error body.
pub fn server_message(body: &serde_json::Value) -> Option<String> {
    body.get("message")
        .or_else(|| body.get("error"))
        .and_then(|v| v.as_str())
        .filter(|m| !m.is_empty())
        .map(ToOwned::to_owned)
}

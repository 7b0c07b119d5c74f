//! Upstream error classification.
//!
//! The orchestrator's retry policy hangs off three classes:
//!
//! - **Auth** — the credential or challenge token was rejected. Counts
//!   against credential health; one internal retry with fresh
//!   resources.
//! - **Transient** — network failure or 5xx. Retried with backoff; not
//!   evidence of credential degradation.
//! - **Terminal** — quota, malformed request, not found. Surfaced
//!   immediately; never retried, never counted against the credential.

use serde::Deserialize;

/// Retry class of an upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Auth,
    Transient,
    Terminal,
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// The HTTP request itself failed (network, DNS, TLS). Always
    /// transient.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The credential or challenge token was rejected.
    #[error("Upstream rejected authorization ({status}): {message}")]
    AuthRejected { status: u16, message: String },

    /// A 5xx or similar server-side hiccup.
    #[error("Transient upstream error ({status}): {message}")]
    Transient { status: u16, message: String },

    /// Quota exhausted, malformed request, or unknown resource.
    #[error("Upstream error ({status}): {message}")]
    Terminal { status: u16, message: String },
}

impl UpstreamError {
    pub fn class(&self) -> ErrorClass {
        match self {
            UpstreamError::Request(_) | UpstreamError::Transient { .. } => ErrorClass::Transient,
            UpstreamError::AuthRejected { .. } => ErrorClass::Auth,
            UpstreamError::Terminal { .. } => ErrorClass::Terminal,
        }
    }
}

/// Error body shape the upstream uses for non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

/// Classify a non-2xx response into an [`UpstreamError`].
///
/// 401/403 are authorization rejections (credential or challenge token
/// refused). 408 and 5xx are transient. Everything else — including
/// 429 quota exhaustion and 404 unknown resources — is terminal.
pub fn classify_response(status: u16, body: &str) -> UpstreamError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| truncate(body, 200));

    match status {
        401 | 403 => UpstreamError::AuthRejected { status, message },
        408 | 500..=599 => UpstreamError::Transient { status, message },
        _ => UpstreamError::Terminal { status, message },
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

//! Gateway-wide error taxonomy.
//!
//! Every failure that can surface to a caller is classified into one
//! of these kinds. The kind drives retry policy: validation and
//! terminal upstream errors are never retried, auth rejections and
//! challenge failures get exactly one internal retry with fresh
//! resources, transient errors are retried with backoff up to a bound.
//!
//! Messages must never contain raw session tokens or challenge token
//! values.

use crate::types::Tier;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Malformed request or continuation syntax. Rejected before any
    /// credential or challenge token is consumed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// An extension request referenced a media id this gateway has
    /// never produced (and the reject policy is active).
    #[error("Unknown media reference: {0}")]
    UnknownMediaReference(String),

    /// The pool has no enabled credential for the requested tier.
    /// Retryable by the caller after backoff.
    #[error("No credential available for tier {tier}")]
    NoCredentialAvailable { tier: Tier },

    /// The challenge token provider could not produce a token.
    #[error("Challenge token acquisition failed: {0}")]
    ChallengeAcquisitionFailed(String),

    /// Upstream rejected the credential or challenge token.
    #[error("Upstream rejected credentials: {0}")]
    UpstreamAuthRejected(String),

    /// Network error or upstream 5xx. Not evidence of credential
    /// degradation.
    #[error("Transient upstream failure: {0}")]
    UpstreamTransient(String),

    /// Quota, malformed request, resource not found. Surfaced
    /// immediately, never retried.
    #[error("Upstream error: {0}")]
    UpstreamTerminal(String),
}

impl GatewayError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Validation(_) => "VALIDATION_ERROR",
            GatewayError::UnknownMediaReference(_) => "UNKNOWN_MEDIA_REFERENCE",
            GatewayError::NoCredentialAvailable { .. } => "NO_CREDENTIAL_AVAILABLE",
            GatewayError::ChallengeAcquisitionFailed(_) => "CHALLENGE_ACQUISITION_FAILED",
            GatewayError::UpstreamAuthRejected(_) => "UPSTREAM_AUTH_REJECTED",
            GatewayError::UpstreamTransient(_) => "UPSTREAM_TRANSIENT",
            GatewayError::UpstreamTerminal(_) => "UPSTREAM_TERMINAL",
        }
    }

    /// Whether the caller may reasonably retry the same request later.
    pub fn caller_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::NoCredentialAvailable { .. }
                | GatewayError::ChallengeAcquisitionFailed(_)
                | GatewayError::UpstreamTransient(_)
        )
    }
}

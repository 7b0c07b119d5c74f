//! Challenge token acquisition.
//!
//! Every upstream call must carry a short-lived anti-automation token
//! bound to an action label. Two interchangeable providers implement
//! the [`ChallengeProvider`] capability:
//!
//! - [`browser::BrowserProvider`] — drives a single long-lived browser
//!   page over the Chrome DevTools Protocol and executes the challenge
//!   script in it. A serialized resource: one acquisition at a time,
//!   concurrent demand queues up to a bound.
//! - [`remote::RemoteSolverProvider`] — submits solve tasks to an
//!   external solving service over HTTP. Stateless; arbitrary
//!   concurrency.
//!
//! Which one runs is decided once at startup; the orchestrator only
//! sees `Arc<dyn ChallengeProvider>`.

pub mod browser;
mod cdp;
pub mod remote;
pub mod token;

pub use token::ChallengeToken;

use async_trait::async_trait;

/// Polymorphic token acquisition capability.
#[async_trait]
pub trait ChallengeProvider: Send + Sync {
    /// Acquire a fresh token for the given action label.
    ///
    /// The returned token is valid for a single upstream call.
    async fn acquire_token(&self, action: &str) -> Result<ChallengeToken, CaptchaError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CaptchaError {
    /// The serialized provider's waiter queue is full. Fail fast
    /// rather than deadlock.
    #[error("Challenge provider is busy")]
    ProviderBusy,

    /// The provider session is closed and needs an external relaunch.
    #[error("Challenge provider session is closed")]
    Closed,

    /// The acquisition attempt failed (script error, service error,
    /// connection failure).
    #[error("Token acquisition failed: {0}")]
    AcquisitionFailed(String),

    /// The acquisition did not complete within the bounded timeout.
    #[error("Token acquisition timed out after {0:?}")]
    Timeout(std::time::Duration),
}

//! Interactive browser challenge provider.
//!
//! Drives a single long-lived browser page over the DevTools protocol.
//! The page hosts the anti-automation challenge surface; tokens are
//! minted by executing the challenge script with the requested action
//! label.
//!
//! The session is an explicit state machine:
//!
//! ```text
//! Idle -> Launching -> Ready -> Busy -> Ready -> ... -> Closed
//! ```
//!
//! The provider is a serialized resource: one acquisition runs at a
//! time and concurrent demand queues up to [`BrowserConfig::max_queued`]
//! waiters; overflow fails fast with `ProviderBusy`. Three consecutive
//! acquisition failures close the session; recovery requires an
//! explicit [`BrowserProvider::relaunch`], never implicit lazy
//! reinitialization.
//!
//! The browser itself is launched and logged in out-of-band; this
//! provider only attaches to an already-running DevTools page target.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};

use crate::cdp::CdpSession;
use crate::token::ChallengeToken;
use crate::{CaptchaError, ChallengeProvider};

/// Lifecycle state of the browser session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session has been opened yet.
    Idle,
    /// A DevTools connection attempt is in progress.
    Launching,
    /// The session can serve a token request.
    Ready,
    /// A token acquisition is in flight; the session is not reentrant.
    Busy,
    /// The session is dead and requires an external relaunch.
    Closed,
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// DevTools page target URL (`ws://host:9222/devtools/page/...`).
    pub devtools_url: String,
    /// Page that hosts the challenge script.
    pub challenge_url: String,
    /// Site key the challenge script is keyed to.
    pub site_key: String,
    /// Bound on a single acquisition, navigation included.
    pub acquisition_timeout: Duration,
    /// Maximum queued waiters before `ProviderBusy`.
    pub max_queued: usize,
    /// Consecutive failures after which the session closes.
    pub max_consecutive_failures: u32,
}

impl BrowserConfig {
    pub fn new(devtools_url: String, challenge_url: String, site_key: String) -> Self {
        Self {
            devtools_url,
            challenge_url,
            site_key,
            acquisition_timeout: Duration::from_secs(30),
            max_queued: 4,
            max_consecutive_failures: 3,
        }
    }
}

/// Mutable session bookkeeping, guarded by one mutex: the serialized
/// resource.
struct SessionSlot {
    state: SessionState,
    cdp: Option<CdpSession>,
    consecutive_failures: u32,
}

pub struct BrowserProvider {
    config: BrowserConfig,
    slot: Mutex<SessionSlot>,
    /// Bounded waiter queue. A permit is held for the whole call, so
    /// at most `max_queued` callers are queued or running.
    queue: Semaphore,
}

impl BrowserProvider {
    pub fn new(config: BrowserConfig) -> Self {
        let queue = Semaphore::new(config.max_queued.max(1));
        Self {
            config,
            slot: Mutex::new(SessionSlot {
                state: SessionState::Idle,
                cdp: None,
                consecutive_failures: 0,
            }),
            queue,
        }
    }

    /// Current lifecycle state. Blocks while an acquisition holds the
    /// session, so this reflects settled states.
    pub async fn state(&self) -> SessionState {
        self.slot.lock().await.state
    }

    /// Explicitly reopen a closed (or never-opened) session.
    ///
    /// Resets the consecutive-failure counter on success. On failure
    /// the session transitions to `Closed`.
    pub async fn relaunch(&self) -> Result<(), CaptchaError> {
        let mut slot = self.slot.lock().await;
        slot.cdp = None;
        slot.state = SessionState::Launching;

        match CdpSession::connect(&self.config.devtools_url).await {
            Ok(cdp) => {
                slot.cdp = Some(cdp);
                slot.state = SessionState::Ready;
                slot.consecutive_failures = 0;
                tracing::info!("Browser challenge session relaunched");
                Ok(())
            }
            Err(e) => {
                slot.state = SessionState::Closed;
                tracing::error!(error = %e, "Browser session relaunch failed");
                Err(e)
            }
        }
    }

    // ---- private helpers ----

    /// Record a failed acquisition; closes the session at the
    /// configured threshold, otherwise returns it to `Ready`.
    fn record_failure(&self, slot: &mut SessionSlot) {
        slot.consecutive_failures += 1;
        if slot.consecutive_failures >= self.config.max_consecutive_failures {
            slot.state = SessionState::Closed;
            slot.cdp = None;
            tracing::warn!(
                consecutive_failures = slot.consecutive_failures,
                "Browser session closed after consecutive acquisition failures",
            );
        } else {
            slot.state = SessionState::Ready;
        }
    }

    /// The acquisition sequence run while `Busy`: navigate if needed,
    /// ensure the challenge script is present, execute it with the
    /// action label, extract the token value.
    async fn run_acquisition(
        cdp: &mut CdpSession,
        config: &BrowserConfig,
        action: &str,
    ) -> Result<ChallengeToken, CaptchaError> {
        if cdp.current_url.as_deref() != Some(config.challenge_url.as_str()) {
            cdp.navigate(&config.challenge_url).await?;
            Self::wait_for_load(cdp).await?;
        }

        if !cdp.script_ready {
            Self::ensure_script(cdp, &config.site_key).await?;
        }

        let expression = format!(
            "grecaptcha.enterprise.execute('{}', {{action: '{}'}})",
            config.site_key, action
        );
        let value = cdp.evaluate(&expression, true).await?;

        match value.as_str() {
            Some(token) if !token.is_empty() => {
                Ok(ChallengeToken::new(token.to_string(), action.to_string()))
            }
            _ => Err(CaptchaError::AcquisitionFailed(
                "challenge script returned no token".to_string(),
            )),
        }
    }

    /// Poll `document.readyState` until the navigation settles.
    async fn wait_for_load(cdp: &mut CdpSession) -> Result<(), CaptchaError> {
        for _ in 0..50 {
            let state = cdp.evaluate("document.readyState", false).await?;
            if state.as_str() == Some("complete") {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        Err(CaptchaError::AcquisitionFailed(
            "page did not finish loading".to_string(),
        ))
    }

    /// Confirm the challenge script is present, injecting it if absent.
    async fn ensure_script(cdp: &mut CdpSession, site_key: &str) -> Result<(), CaptchaError> {
        let present = cdp
            .evaluate(
                "typeof grecaptcha !== 'undefined' && !!grecaptcha.enterprise",
                false,
            )
            .await?;

        if present.as_bool() != Some(true) {
            let inject = format!(
                "new Promise((resolve, reject) => {{\
                   const s = document.createElement('script');\
                   s.src = 'https://www.google.com/recaptcha/enterprise.js?render={site_key}';\
                   s.onload = () => resolve(true);\
                   s.onerror = () => reject(new Error('challenge script failed to load'));\
                   document.head.appendChild(s);\
                 }})"
            );
            cdp.evaluate(&inject, true).await?;
        }

        // Wait until the script reports itself ready.
        cdp.evaluate(
            "new Promise(resolve => grecaptcha.enterprise.ready(() => resolve(true)))",
            true,
        )
        .await?;

        cdp.script_ready = true;
        Ok(())
    }
}

#[async_trait]
impl ChallengeProvider for BrowserProvider {
    async fn acquire_token(&self, action: &str) -> Result<ChallengeToken, CaptchaError> {
        // Entering the queue: overflow fails fast instead of piling up
        // behind a serialized resource.
        let _permit = self
            .queue
            .try_acquire()
            .map_err(|_| CaptchaError::ProviderBusy)?;

        let mut slot = self.slot.lock().await;

        if slot.state == SessionState::Closed {
            return Err(CaptchaError::Closed);
        }

        // First use opens the session.
        if slot.cdp.is_none() {
            slot.state = SessionState::Launching;
            match CdpSession::connect(&self.config.devtools_url).await {
                Ok(cdp) => {
                    slot.cdp = Some(cdp);
                    slot.state = SessionState::Ready;
                }
                Err(e) => {
                    self.record_failure(&mut slot);
                    return Err(e);
                }
            }
        }

        slot.state = SessionState::Busy;
        let timeout = self.config.acquisition_timeout;

        let Some(cdp) = slot.cdp.as_mut() else {
            // Unreachable: the launch above either set it or returned.
            return Err(CaptchaError::AcquisitionFailed(
                "session not launched".to_string(),
            ));
        };

        let outcome =
            tokio::time::timeout(timeout, Self::run_acquisition(cdp, &self.config, action)).await;

        match outcome {
            Ok(Ok(token)) => {
                slot.consecutive_failures = 0;
                slot.state = SessionState::Ready;
                tracing::debug!(action, "Challenge token acquired via browser session");
                Ok(token)
            }
            Ok(Err(e)) => {
                tracing::warn!(action, error = %e, "Browser token acquisition failed");
                self.record_failure(&mut slot);
                Err(e)
            }
            Err(_elapsed) => {
                tracing::warn!(action, timeout_secs = timeout.as_secs(), "Browser token acquisition timed out");
                self.record_failure(&mut slot);
                Err(CaptchaError::Timeout(timeout))
            }
        }
    }
}

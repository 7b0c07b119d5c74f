//! Credential records.

use flowgate_core::types::{CredentialId, Tier, Timestamp};

/// One upstream account managed by the pool.
///
/// Created from seed data at startup, mutated only by the pool manager:
/// a successful use resets `consecutive_errors` to zero, a failed use
/// increments it, and crossing the configured threshold clears
/// `enabled`. Credentials are never deleted, only disabled.
#[derive(Clone)]
pub struct Credential {
    pub id: CredentialId,
    /// Human-readable label (typically the account email).
    pub label: String,
    /// Opaque upstream session token. Never logged, never serialized
    /// into snapshots.
    pub session_token: String,
    pub tier: Tier,
    pub enabled: bool,
    pub consecutive_errors: u32,
    pub last_used: Option<Timestamp>,
    /// Expiry of the session token, when known. Expired credentials
    /// are skipped during selection.
    pub token_expires: Option<Timestamp>,
}

impl Credential {
    /// A fresh, enabled credential with zeroed health counters.
    pub fn new(id: CredentialId, label: String, session_token: String, tier: Tier) -> Self {
        Self {
            id,
            label,
            session_token,
            tier,
            enabled: true,
            consecutive_errors: 0,
            last_used: None,
            token_expires: None,
        }
    }

    /// Whether the session token has passed its expiry timestamp.
    pub fn token_expired(&self, now: Timestamp) -> bool {
        self.token_expires.is_some_and(|expires| expires <= now)
    }
}

// Manual Debug so the session token can never leak through `{:?}`.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("session_token", &"<redacted>")
            .field("tier", &self.tier)
            .field("enabled", &self.enabled)
            .field("consecutive_errors", &self.consecutive_errors)
            .field("last_used", &self.last_used)
            .field("token_expires", &self.token_expires)
            .finish()
    }
}

/// Sanitized view of a credential's health, safe to expose.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CredentialHealth {
    pub id: CredentialId,
    pub label: String,
    pub tier: Tier,
    pub enabled: bool,
    pub consecutive_errors: u32,
    pub in_flight: u32,
    pub last_used: Option<Timestamp>,
    pub token_expires: Option<Timestamp>,
}

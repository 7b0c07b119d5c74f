//! Single-use challenge tokens.

use std::time::Duration;

use flowgate_core::types::Timestamp;

/// Validity window granted by the challenge service.
pub const TOKEN_TTL: Duration = Duration::from_secs(120);

/// A short-lived proof value obtained for exactly one upstream call.
///
/// The value is private; the only way to read it is
/// [`into_value`](Self::into_value), which consumes the token. This
/// makes reuse across two upstream calls a compile error rather than a
/// code-review concern.
pub struct ChallengeToken {
    value: String,
    action: String,
    issued_at: Timestamp,
    ttl: Duration,
}

impl ChallengeToken {
    pub fn new(value: String, action: String) -> Self {
        Self {
            value,
            action,
            issued_at: chrono::Utc::now(),
            ttl: TOKEN_TTL,
        }
    }

    /// The action label this token was issued for.
    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn issued_at(&self) -> Timestamp {
        self.issued_at
    }

    /// Whether the validity window has elapsed.
    pub fn is_expired(&self) -> bool {
        let age = chrono::Utc::now() - self.issued_at;
        age.to_std().map(|age| age >= self.ttl).unwrap_or(false)
    }

    /// Consume the token, yielding its value for embedding in exactly
    /// one upstream payload.
    pub fn into_value(self) -> String {
        self.value
    }
}

// The token value must never appear in logs.
impl std::fmt::Debug for ChallengeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeToken")
            .field("value", &"<redacted>")
            .field("action", &self.action)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

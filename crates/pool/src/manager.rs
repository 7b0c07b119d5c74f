//! The credential pool manager.
//!
//! Selection policy: among enabled credentials of the requested tier,
//! pick the one with the lowest consecutive-error counter, breaking
//! ties by least-recently-used. This spreads load and lets recovering
//! credentials re-enter rotation.
//!
//! Locking is fine-grained: each credential record sits behind its own
//! `Mutex`, with an outer `RwLock` map that is only write-locked when
//! credentials are inserted. Health updates are therefore atomic per
//! credential without a global lock on the hot path.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use flowgate_core::types::{CredentialId, Tier};

use crate::credential::{Credential, CredentialHealth};

/// Tunables for the pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Consecutive failures at which a credential is disabled.
    pub disable_threshold: u32,
    /// When true, a credential with an in-flight job is skipped by
    /// concurrent acquirers. The default allows shared use: upstream
    /// accounts can serve multiple in-flight jobs.
    pub exclusive: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            disable_threshold: 3,
            exclusive: false,
        }
    }
}

/// A credential handed out for one generation attempt.
///
/// Carries a copy of the data the orchestrator needs; the pool retains
/// ownership of the mutable record. The holder must end the lease with
/// either [`CredentialPool::report_outcome`] or
/// [`CredentialPool::release`].
#[derive(Clone)]
pub struct CredentialLease {
    pub credential_id: CredentialId,
    pub session_token: String,
    pub tier: Tier,
}

impl std::fmt::Debug for CredentialLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialLease")
            .field("credential_id", &self.credential_id)
            .field("session_token", &"<redacted>")
            .field("tier", &self.tier)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// No enabled credential of the requested tier exists right now.
    /// Retryable by the caller after backoff; the pool never
    /// substitutes a credential of the wrong tier.
    #[error("No credential available for tier {0}")]
    NoCredentialAvailable(Tier),

    /// The referenced credential id is not in the pool.
    #[error("Unknown credential id {0}")]
    UnknownCredential(CredentialId),
}

/// Per-credential record: the credential plus in-flight bookkeeping.
struct CredentialRecord {
    credential: Credential,
    in_flight: u32,
}

/// Owns all credential state. Cheaply shareable via `Arc`.
pub struct CredentialPool {
    records: RwLock<HashMap<CredentialId, Arc<Mutex<CredentialRecord>>>>,
    config: PoolConfig,
}

impl CredentialPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Build a pool from seeded credentials.
    pub async fn from_credentials(
        credentials: Vec<Credential>,
        config: PoolConfig,
    ) -> Arc<Self> {
        let pool = Arc::new(Self::new(config));
        for credential in credentials {
            pool.insert(credential).await;
        }
        pool
    }

    /// Add a credential to the pool (startup seeding).
    pub async fn insert(&self, credential: Credential) {
        let id = credential.id;
        let record = Arc::new(Mutex::new(CredentialRecord {
            credential,
            in_flight: 0,
        }));
        self.records.write().await.insert(id, record);
    }

    /// Acquire a credential for the given tier.
    ///
    /// Fails with [`PoolError::NoCredentialAvailable`] when no enabled,
    /// unexpired credential of that tier is eligible.
    pub async fn acquire(&self, tier: Tier) -> Result<CredentialLease, PoolError> {
        loop {
            let Some(record) = self.select_candidate(tier).await else {
                return Err(PoolError::NoCredentialAvailable(tier));
            };

            // Re-check eligibility while holding the record lock: a
            // concurrent acquirer may have claimed it since selection.
            let mut guard = record.lock().await;
            if !Self::eligible(&guard, tier, self.config.exclusive) {
                continue;
            }
            guard.in_flight += 1;
            guard.credential.last_used = Some(chrono::Utc::now());

            tracing::debug!(
                credential_id = guard.credential.id,
                tier = %tier,
                in_flight = guard.in_flight,
                "Credential acquired",
            );

            return Ok(CredentialLease {
                credential_id: guard.credential.id,
                session_token: guard.credential.session_token.clone(),
                tier,
            });
        }
    }

    /// Report the outcome of a use and end the lease.
    ///
    /// Success resets the consecutive-error counter to zero. Failure
    /// increments it; reaching the disable threshold clears the
    /// enabled flag.
    pub async fn report_outcome(
        &self,
        credential_id: CredentialId,
        success: bool,
    ) -> Result<(), PoolError> {
        let record = self.record(credential_id).await?;
        let mut guard = record.lock().await;
        guard.in_flight = guard.in_flight.saturating_sub(1);

        if success {
            guard.credential.consecutive_errors = 0;
            guard.credential.last_used = Some(chrono::Utc::now());
            return Ok(());
        }

        guard.credential.consecutive_errors += 1;
        if guard.credential.enabled
            && guard.credential.consecutive_errors >= self.config.disable_threshold
        {
            guard.credential.enabled = false;
            tracing::warn!(
                credential_id,
                label = %guard.credential.label,
                consecutive_errors = guard.credential.consecutive_errors,
                "Credential disabled after consecutive failures",
            );
        }
        Ok(())
    }

    /// End a lease without recording health evidence.
    ///
    /// Used when the calling context was abandoned (client disconnect,
    /// explicit timeout): abandonment says nothing about the
    /// credential.
    pub async fn release(&self, credential_id: CredentialId) -> Result<(), PoolError> {
        let record = self.record(credential_id).await?;
        let mut guard = record.lock().await;
        guard.in_flight = guard.in_flight.saturating_sub(1);
        Ok(())
    }

    /// Manually re-enable (or disable) a credential and reset its
    /// error counter.
    pub async fn set_enabled(
        &self,
        credential_id: CredentialId,
        enabled: bool,
    ) -> Result<(), PoolError> {
        let record = self.record(credential_id).await?;
        let mut guard = record.lock().await;
        guard.credential.enabled = enabled;
        if enabled {
            guard.credential.consecutive_errors = 0;
        }
        Ok(())
    }

    /// Sanitized health view of every credential. Raw session tokens
    /// are never included.
    pub async fn snapshot(&self) -> Vec<CredentialHealth> {
        let records = self.records.read().await;
        let mut health = Vec::with_capacity(records.len());
        for record in records.values() {
            let guard = record.lock().await;
            health.push(CredentialHealth {
                id: guard.credential.id,
                label: guard.credential.label.clone(),
                tier: guard.credential.tier,
                enabled: guard.credential.enabled,
                consecutive_errors: guard.credential.consecutive_errors,
                in_flight: guard.in_flight,
                last_used: guard.credential.last_used,
                token_expires: guard.credential.token_expires,
            });
        }
        health.sort_by_key(|h| h.id);
        health
    }

    // ---- private helpers ----

    async fn record(
        &self,
        credential_id: CredentialId,
    ) -> Result<Arc<Mutex<CredentialRecord>>, PoolError> {
        self.records
            .read()
            .await
            .get(&credential_id)
            .cloned()
            .ok_or(PoolError::UnknownCredential(credential_id))
    }

    fn eligible(record: &CredentialRecord, tier: Tier, exclusive: bool) -> bool {
        let credential = &record.credential;
        credential.enabled
            && credential.tier == tier
            && !credential.token_expired(chrono::Utc::now())
            && !(exclusive && record.in_flight > 0)
    }

    /// One selection pass: lowest error counter wins, ties broken by
    /// least-recently-used (never-used credentials sort first).
    async fn select_candidate(&self, tier: Tier) -> Option<Arc<Mutex<CredentialRecord>>> {
        let records = self.records.read().await;
        let mut best: Option<(u32, Option<chrono::DateTime<chrono::Utc>>, Arc<Mutex<CredentialRecord>>)> =
            None;

        for record in records.values() {
            let guard = record.lock().await;
            if !Self::eligible(&guard, tier, self.config.exclusive) {
                continue;
            }
            let key = (guard.credential.consecutive_errors, guard.credential.last_used);
            let better = match &best {
                None => true,
                Some((errors, last_used, _)) => key < (*errors, *last_used),
            };
            if better {
                best = Some((key.0, key.1, Arc::clone(record)));
            }
        }

        best.map(|(_, _, record)| record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn credential(id: CredentialId, tier: Tier) -> Credential {
        Credential::new(id, format!("acct-{id}@example.com"), format!("st-{id}"), tier)
    }

    async fn pool_with(credentials: Vec<Credential>, config: PoolConfig) -> Arc<CredentialPool> {
        CredentialPool::from_credentials(credentials, config).await
    }

    #[tokio::test]
    async fn acquire_prefers_lowest_error_count() {
        let pool = pool_with(
            vec![credential(1, Tier::Standard), credential(2, Tier::Standard)],
            PoolConfig::default(),
        )
        .await;

        // Give credential 1 a failure so 2 becomes preferred.
        let lease = pool.acquire(Tier::Standard).await.unwrap();
        pool.report_outcome(lease.credential_id, false).await.unwrap();

        let failed_id = lease.credential_id;
        let lease = pool.acquire(Tier::Standard).await.unwrap();
        assert_ne!(lease.credential_id, failed_id);
    }

    #[tokio::test]
    async fn acquire_never_substitutes_tier() {
        let pool = pool_with(vec![credential(1, Tier::Standard)], PoolConfig::default()).await;
        let err = pool.acquire(Tier::Elevated).await.unwrap_err();
        assert_matches!(err, PoolError::NoCredentialAvailable(Tier::Elevated));
    }

    #[tokio::test]
    async fn threshold_failures_disable_credential() {
        let pool = pool_with(vec![credential(1, Tier::Standard)], PoolConfig::default()).await;

        for _ in 0..3 {
            let lease = pool.acquire(Tier::Standard).await.unwrap();
            pool.report_outcome(lease.credential_id, false).await.unwrap();
        }

        // Disabled credentials are excluded from selection.
        let err = pool.acquire(Tier::Standard).await.unwrap_err();
        assert_matches!(err, PoolError::NoCredentialAvailable(_));

        let health = pool.snapshot().await;
        assert!(!health[0].enabled);
        assert_eq!(health[0].consecutive_errors, 3);
    }

    #[tokio::test]
    async fn success_resets_error_counter() {
        let pool = pool_with(vec![credential(1, Tier::Standard)], PoolConfig::default()).await;

        for _ in 0..2 {
            let lease = pool.acquire(Tier::Standard).await.unwrap();
            pool.report_outcome(lease.credential_id, false).await.unwrap();
        }
        let lease = pool.acquire(Tier::Standard).await.unwrap();
        pool.report_outcome(lease.credential_id, true).await.unwrap();

        let health = pool.snapshot().await;
        assert_eq!(health[0].consecutive_errors, 0);
        assert!(health[0].enabled);
    }

    #[tokio::test]
    async fn manual_reenable_restores_rotation() {
        let pool = pool_with(vec![credential(1, Tier::Standard)], PoolConfig::default()).await;
        for _ in 0..3 {
            let lease = pool.acquire(Tier::Standard).await.unwrap();
            pool.report_outcome(lease.credential_id, false).await.unwrap();
        }
        assert!(pool.acquire(Tier::Standard).await.is_err());

        pool.set_enabled(1, true).await.unwrap();
        let lease = pool.acquire(Tier::Standard).await.unwrap();
        assert_eq!(lease.credential_id, 1);
    }

    #[tokio::test]
    async fn exclusive_mode_skips_in_flight_credentials() {
        let config = PoolConfig {
            exclusive: true,
            ..Default::default()
        };
        let pool = pool_with(
            vec![credential(1, Tier::Standard), credential(2, Tier::Standard)],
            config,
        )
        .await;

        let first = pool.acquire(Tier::Standard).await.unwrap();
        let second = pool.acquire(Tier::Standard).await.unwrap();
        assert_ne!(first.credential_id, second.credential_id);

        // Pool exhausted while both are held.
        assert!(pool.acquire(Tier::Standard).await.is_err());

        // Release one without health evidence; it becomes eligible again.
        pool.release(first.credential_id).await.unwrap();
        let third = pool.acquire(Tier::Standard).await.unwrap();
        assert_eq!(third.credential_id, first.credential_id);
    }

    #[tokio::test]
    async fn shared_mode_allows_overlapping_leases() {
        let pool = pool_with(vec![credential(1, Tier::Standard)], PoolConfig::default()).await;
        let first = pool.acquire(Tier::Standard).await.unwrap();
        let second = pool.acquire(Tier::Standard).await.unwrap();
        assert_eq!(first.credential_id, second.credential_id);
    }

    #[tokio::test]
    async fn expired_session_token_is_skipped() {
        let mut expired = credential(1, Tier::Standard);
        expired.token_expires = Some(chrono::Utc::now() - chrono::Duration::hours(1));
        let pool = pool_with(vec![expired, credential(2, Tier::Standard)], PoolConfig::default())
            .await;

        let lease = pool.acquire(Tier::Standard).await.unwrap();
        assert_eq!(lease.credential_id, 2);
    }

    #[tokio::test]
    async fn release_does_not_touch_health() {
        let pool = pool_with(vec![credential(1, Tier::Standard)], PoolConfig::default()).await;
        let lease = pool.acquire(Tier::Standard).await.unwrap();
        pool.release(lease.credential_id).await.unwrap();

        let health = pool.snapshot().await;
        assert_eq!(health[0].consecutive_errors, 0);
        assert_eq!(health[0].in_flight, 0);
        assert!(health[0].enabled);
    }

    #[tokio::test]
    async fn report_outcome_on_unknown_credential_fails() {
        let pool = pool_with(vec![], PoolConfig::default()).await;
        let err = pool.report_outcome(42, true).await.unwrap_err();
        assert_matches!(err, PoolError::UnknownCredential(42));
    }

    #[tokio::test]
    async fn concurrent_exclusive_acquisition_is_disjoint() {
        let config = PoolConfig {
            exclusive: true,
            ..Default::default()
        };
        let pool = pool_with(
            (1..=8).map(|id| credential(id, Tier::Standard)).collect(),
            config,
        )
        .await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move {
                pool.acquire(Tier::Standard).await.unwrap().credential_id
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 8, "no credential may be handed out twice");
    }
}

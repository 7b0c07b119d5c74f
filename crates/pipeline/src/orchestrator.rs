//! The generation orchestrator.
//!
//! One entry point, [`Orchestrator::run`], takes a validated request
//! through the full lifecycle: continuation pre-checks, credential
//! acquisition, challenge token acquisition, upstream submission, and
//! status polling with capped backoff. Failure classes map to lease
//! outcomes: an auth rejection is credential evidence and triggers
//! exactly one retry with a fresh credential and token; transient and
//! terminal failures end the lease without health evidence.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use flowgate_captcha::{ChallengeProvider, ChallengeToken};
use flowgate_core::error::GatewayError;
use flowgate_core::media::{MediaArtifact, MediaTracker};
use flowgate_pool::{CredentialLease, CredentialPool, PoolError};
use flowgate_upstream::api::FlowApi;
use flowgate_upstream::backoff::PollSchedule;
use flowgate_upstream::error::ErrorClass;
use flowgate_upstream::payload::{
    ClientContext, OperationState, SubmitPayload, TextInput, VideoInput, VideoRequest,
};

use crate::job::GenerationJob;
use crate::request::GenerationRequest;

/// What to do when an extension request references a media id the
/// local tracker has never seen.
///
/// The tracker is not authoritative (it clears on restart), so the
/// default lets the upstream be the judge and only logs the miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownReferencePolicy {
    #[default]
    Warn,
    Reject,
}

/// Tunables for one orchestrator instance.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Action label bound into every challenge token.
    pub challenge_action: String,
    /// Tool designator the upstream expects in the client context.
    pub tool: String,
    pub poll_schedule: PollSchedule,
    /// Hard ceiling on one job from submission to terminal status.
    pub overall_timeout: Duration,
    /// Consecutive transient poll failures tolerated before the job
    /// is abandoned.
    pub max_transient_poll_failures: u32,
    /// Challenge token acquisition attempts per generation attempt.
    pub max_challenge_attempts: u32,
    /// Submission attempts per generation attempt. Each try carries a
    /// fresh challenge token, so a retry never replays a spent one.
    pub max_submit_attempts: u32,
    pub unknown_reference_policy: UnknownReferencePolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            challenge_action: "video_generation".to_string(),
            tool: "PINHOLE".to_string(),
            poll_schedule: PollSchedule::default(),
            overall_timeout: Duration::from_secs(600),
            max_transient_poll_failures: 3,
            max_challenge_attempts: 2,
            max_submit_attempts: 2,
            unknown_reference_policy: UnknownReferencePolicy::default(),
        }
    }
}

/// Coordinates pool, challenge provider, upstream client, and tracker
/// for the lifetime of the process. Cheap to share via `Arc`.
pub struct Orchestrator {
    pool: Arc<CredentialPool>,
    challenge: Arc<dyn ChallengeProvider>,
    upstream: Arc<FlowApi>,
    tracker: Arc<MediaTracker>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        pool: Arc<CredentialPool>,
        challenge: Arc<dyn ChallengeProvider>,
        upstream: Arc<FlowApi>,
        tracker: Arc<MediaTracker>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            pool,
            challenge,
            upstream,
            tracker,
            config,
        }
    }

    pub fn tracker(&self) -> &Arc<MediaTracker> {
        &self.tracker
    }

    /// Run one generation request to completion.
    ///
    /// Cancelling `cancel` (caller disconnect) stops polling and ends
    /// the credential lease without recording health evidence.
    pub async fn run(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<MediaArtifact, GatewayError> {
        self.check_continuation(request).await?;

        match self.attempt(request, cancel).await {
            // Exactly one internal retry: the failed credential already
            // took a health hit, so a fresh acquisition prefers others.
            Err(GatewayError::UpstreamAuthRejected(reason)) if !cancel.is_cancelled() => {
                tracing::warn!(
                    model = %request.model.key,
                    reason = %reason,
                    "Upstream rejected credentials; retrying once with a fresh credential and token",
                );
                self.attempt(request, cancel).await
            }
            outcome => outcome,
        }
    }

    // ---- private helpers ----

    /// Pre-validate the continuation reference against the local
    /// tracker before any scarce resource is spent.
    async fn check_continuation(&self, request: &GenerationRequest) -> Result<(), GatewayError> {
        let Some(reference) = &request.continuation else {
            return Ok(());
        };

        match self.tracker.frame_count(&reference.media_id).await {
            Some(frames) => {
                if reference.end_frame >= frames {
                    return Err(GatewayError::Validation(format!(
                        "end_frame {} is out of range for a {frames}-frame clip",
                        reference.end_frame
                    )));
                }
            }
            None => match self.config.unknown_reference_policy {
                UnknownReferencePolicy::Reject => {
                    return Err(GatewayError::UnknownMediaReference(
                        reference.media_id.clone(),
                    ));
                }
                UnknownReferencePolicy::Warn => {
                    tracing::warn!(
                        media_id = %reference.media_id,
                        "Extension references an untracked media id; deferring to the upstream",
                    );
                }
            },
        }
        Ok(())
    }

    /// One full attempt: lease, token, submit, poll. Settles the lease
    /// according to the outcome.
    async fn attempt(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<MediaArtifact, GatewayError> {
        let lease = self
            .pool
            .acquire(request.model.tier)
            .await
            .map_err(map_pool_error)?;

        let result = self.attempt_with_lease(request, &lease, cancel).await;

        let settled = match &result {
            Ok(_) => self.pool.report_outcome(lease.credential_id, true).await,
            // Only an authentication rejection is evidence against the
            // credential itself.
            Err(GatewayError::UpstreamAuthRejected(_)) => {
                self.pool.report_outcome(lease.credential_id, false).await
            }
            Err(_) => self.pool.release(lease.credential_id).await,
        };
        if let Err(err) = settled {
            tracing::error!(
                credential_id = lease.credential_id,
                error = %err,
                "Failed to settle credential lease",
            );
        }
        result
    }

    async fn attempt_with_lease(
        &self,
        request: &GenerationRequest,
        lease: &CredentialLease,
        cancel: &CancellationToken,
    ) -> Result<MediaArtifact, GatewayError> {
        // One deadline covers the whole attempt, in-flight HTTP calls
        // included: the upstream has been seen accepting a connection
        // and never answering.
        let deadline = tokio::time::Instant::now() + self.config.overall_timeout;

        let operation_name = self
            .submit_with_retry(request, lease, cancel, deadline)
            .await?;
        let mut job = GenerationJob::new(operation_name, lease.credential_id);
        tracing::info!(
            operation = %job.operation_name,
            credential_id = lease.credential_id,
            model = %request.model.key,
            "Generation job submitted",
        );

        self.poll_to_completion(request, lease, &mut job, cancel, deadline)
            .await
    }

    /// Acquire a challenge token, with a bounded number of attempts.
    async fn acquire_challenge(&self) -> Result<ChallengeToken, GatewayError> {
        let attempts = self.config.max_challenge_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self
                .challenge
                .acquire_token(&self.config.challenge_action)
                .await
            {
                Ok(token) => return Ok(token),
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "Challenge token acquisition failed");
                    last_error = Some(err);
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                    }
                }
            }
        }

        let err = last_error.expect("at least one attempt ran");
        Err(GatewayError::ChallengeAcquisitionFailed(err.to_string()))
    }

    fn compose_payload(
        &self,
        request: &GenerationRequest,
        lease: &CredentialLease,
        token: ChallengeToken,
    ) -> SubmitPayload {
        let video_input = request.continuation.as_ref().map(|r| VideoInput {
            media_id: r.media_id.clone(),
            start_frame: r.start_frame,
            end_frame: r.end_frame,
        });

        SubmitPayload {
            client_context: ClientContext {
                session_token: lease.session_token.clone(),
                session_id: uuid::Uuid::new_v4().to_string(),
                challenge_token: token.into_value(),
                tool: self.config.tool.clone(),
            },
            requests: vec![VideoRequest {
                video_model_key: request.model.upstream_name.clone(),
                aspect_ratio: request.model.orientation.aspect_ratio().to_string(),
                text_input: TextInput {
                    prompt: request.prompt.clone(),
                },
                video_input,
            }],
        }
    }

    /// Submit with a bounded number of tries. The challenge token is
    /// single-use, so every try acquires a fresh one instead of
    /// replaying the previous payload. Only transient failures are
    /// retried, and never past the deadline or a cancellation.
    async fn submit_with_retry(
        &self,
        request: &GenerationRequest,
        lease: &CredentialLease,
        cancel: &CancellationToken,
        deadline: tokio::time::Instant,
    ) -> Result<String, GatewayError> {
        let attempts = self.config.max_submit_attempts.max(1);
        let mut attempt = 1;

        loop {
            let token = self.acquire_challenge().await?;
            let payload = self.compose_payload(request, lease, token);

            match self
                .submit_once(request, lease, &payload, cancel, deadline)
                .await
            {
                Err(GatewayError::UpstreamTransient(reason))
                    if attempt < attempts
                        && !cancel.is_cancelled()
                        && tokio::time::Instant::now() < deadline =>
                {
                    tracing::warn!(
                        attempt,
                        reason = %reason,
                        "Transient submission failure; retrying with a fresh token",
                    );
                    tokio::time::sleep(self.config.poll_schedule.initial_delay).await;
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    /// One submission to the endpoint matching the model's mode,
    /// clamped to the deadline and the cancellation token.
    async fn submit_once(
        &self,
        request: &GenerationRequest,
        lease: &CredentialLease,
        payload: &SubmitPayload,
        cancel: &CancellationToken,
        deadline: tokio::time::Instant,
    ) -> Result<String, GatewayError> {
        let call = async {
            if request.model.mode.is_extend() {
                self.upstream
                    .submit_extension(&lease.session_token, payload)
                    .await
            } else {
                self.upstream
                    .submit_generation(&lease.session_token, payload)
                    .await
            }
        };

        let submission = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(GatewayError::UpstreamTransient(
                    "request cancelled by caller".into(),
                ));
            }
            _ = tokio::time::sleep_until(deadline) => {
                return Err(GatewayError::UpstreamTransient(format!(
                    "submission did not complete within {:?}",
                    self.config.overall_timeout
                )));
            }
            result = call => result,
        };

        let response = submission.map_err(|err| match err.class() {
            ErrorClass::Auth => GatewayError::UpstreamAuthRejected(err.to_string()),
            ErrorClass::Transient => GatewayError::UpstreamTransient(err.to_string()),
            ErrorClass::Terminal => GatewayError::UpstreamTerminal(err.to_string()),
        })?;

        response
            .operation_name()
            .map(str::to_string)
            .ok_or_else(|| {
                GatewayError::UpstreamTerminal("submission returned no operation handle".into())
            })
    }

    async fn poll_to_completion(
        &self,
        request: &GenerationRequest,
        lease: &CredentialLease,
        job: &mut GenerationJob,
        cancel: &CancellationToken,
        deadline: tokio::time::Instant,
    ) -> Result<MediaArtifact, GatewayError> {
        let schedule = &self.config.poll_schedule;
        let mut delay = schedule.initial_delay;
        let mut transient_failures = 0u32;

        loop {
            let sleep_for = schedule.with_jitter(delay);
            tokio::select! {
                _ = cancel.cancelled() => return Err(self.cancelled_by_caller(job)),
                _ = tokio::time::sleep_until(deadline) => return Err(self.deadline_exceeded(job)),
                _ = tokio::time::sleep(sleep_for) => {}
            }

            // The clone keeps the poll future from borrowing the job,
            // which the other select arms mutate.
            let operation = job.operation_name.clone();
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(self.cancelled_by_caller(job)),
                _ = tokio::time::sleep_until(deadline) => return Err(self.deadline_exceeded(job)),
                result = self.upstream.poll_operation(&lease.session_token, &operation) => result,
            };

            let status = match outcome {
                Ok(status) => status,
                Err(err) => match err.class() {
                    ErrorClass::Transient => {
                        transient_failures += 1;
                        if transient_failures > self.config.max_transient_poll_failures {
                            job.fail().expect("running job may fail");
                            return Err(GatewayError::UpstreamTransient(format!(
                                "status polling failed {transient_failures} times: {err}"
                            )));
                        }
                        tracing::warn!(
                            operation = %job.operation_name,
                            attempt = transient_failures,
                            error = %err,
                            "Transient poll failure",
                        );
                        continue;
                    }
                    ErrorClass::Auth => {
                        job.fail().expect("running job may fail");
                        return Err(GatewayError::UpstreamAuthRejected(err.to_string()));
                    }
                    ErrorClass::Terminal => {
                        job.fail().expect("running job may fail");
                        return Err(GatewayError::UpstreamTerminal(err.to_string()));
                    }
                },
            };

            transient_failures = 0;
            job.note_poll().expect("running job may poll");

            match status.status {
                OperationState::Pending | OperationState::Active => {
                    tracing::debug!(
                        operation = %job.operation_name,
                        poll_count = job.poll_count,
                        "Generation still in progress",
                    );
                    delay = schedule.next_delay(delay);
                }
                OperationState::Succeeded => {
                    let media = status.media.ok_or_else(|| {
                        GatewayError::UpstreamTerminal(
                            "job succeeded without a media payload".into(),
                        )
                    })?;
                    job.complete().expect("polling job may complete");

                    let artifact = MediaArtifact {
                        media_id: media.media_id,
                        url: media.fife_url,
                        frame_count: request.model.frame_count(),
                        job_id: job.operation_name.clone(),
                        created_at: chrono::Utc::now(),
                    };
                    self.tracker.record(artifact.clone()).await;
                    tracing::info!(
                        operation = %job.operation_name,
                        media_id = %artifact.media_id,
                        poll_count = job.poll_count,
                        "Generation job completed",
                    );
                    return Ok(artifact);
                }
                OperationState::Failed => {
                    job.fail().expect("polling job may fail");
                    let reason = status
                        .error_message
                        .unwrap_or_else(|| "upstream reported generation failure".to_string());
                    tracing::warn!(
                        operation = %job.operation_name,
                        reason = %reason,
                        "Generation job failed upstream",
                    );
                    return Err(GatewayError::UpstreamTerminal(reason));
                }
            }
        }
    }

    fn cancelled_by_caller(&self, job: &mut GenerationJob) -> GatewayError {
        job.fail().expect("running job may fail");
        tracing::info!(
            operation = %job.operation_name,
            "Polling stopped: request cancelled by caller",
        );
        GatewayError::UpstreamTransient("request cancelled by caller".into())
    }

    fn deadline_exceeded(&self, job: &mut GenerationJob) -> GatewayError {
        job.fail().expect("running job may fail");
        tracing::warn!(
            operation = %job.operation_name,
            timeout = ?self.config.overall_timeout,
            "Generation job abandoned at the overall deadline",
        );
        GatewayError::UpstreamTransient(format!(
            "generation did not complete within {:?}",
            self.config.overall_timeout
        ))
    }
}

fn map_pool_error(err: PoolError) -> GatewayError {
    match err {
        PoolError::NoCredentialAvailable(tier) => GatewayError::NoCredentialAvailable { tier },
        PoolError::UnknownCredential(id) => {
            GatewayError::UpstreamTransient(format!("credential {id} vanished from the pool"))
        }
    }
}

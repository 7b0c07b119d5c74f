//! Generation job lifecycle.
//!
//! A job tracks one upstream operation from submission to a terminal
//! state. Transitions are guarded: `Submitted -> Polling`, `Polling ->
//! Polling` (each status check), and `Polling -> Completed | Failed`.
//! Anything else is a logic error and is rejected.

use flowgate_core::types::{CredentialId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Accepted by the upstream; no status observed yet.
    Submitted,
    /// At least one status check has run without a terminal answer.
    Polling,
    /// The upstream produced a media artifact.
    Completed,
    /// The upstream reported failure, or polling was abandoned.
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Submitted, JobState::Polling)
                | (JobState::Polling, JobState::Polling)
                | (JobState::Polling, JobState::Completed)
                | (JobState::Polling, JobState::Failed)
                | (JobState::Submitted, JobState::Failed)
        )
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid job transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: JobState,
    pub to: JobState,
}

/// One in-flight generation job.
#[derive(Debug)]
pub struct GenerationJob {
    /// Server-assigned operation name, the poll handle.
    pub operation_name: String,
    /// Credential whose lease this job holds.
    pub credential_id: CredentialId,
    pub state: JobState,
    pub submitted_at: Timestamp,
    pub last_polled_at: Option<Timestamp>,
    pub poll_count: u32,
}

impl GenerationJob {
    pub fn new(operation_name: String, credential_id: CredentialId) -> Self {
        Self {
            operation_name,
            credential_id,
            state: JobState::Submitted,
            submitted_at: chrono::Utc::now(),
            last_polled_at: None,
            poll_count: 0,
        }
    }

    /// Record one non-terminal status observation.
    pub fn note_poll(&mut self) -> Result<(), InvalidTransition> {
        self.transition(JobState::Polling)?;
        self.last_polled_at = Some(chrono::Utc::now());
        self.poll_count += 1;
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), InvalidTransition> {
        self.transition(JobState::Completed)
    }

    pub fn fail(&mut self) -> Result<(), InvalidTransition> {
        self.transition(JobState::Failed)
    }

    fn transition(&mut self, next: JobState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

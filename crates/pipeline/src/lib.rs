//! Generation job orchestration.
//!
//! Composes a request from model, prompt, credential, and challenge
//! token; submits it upstream; polls to completion with capped
//! backoff; classifies failures; updates credential health; and emits
//! the resulting media artifact.

pub mod job;
pub mod orchestrator;
pub mod request;

pub use job::{GenerationJob, JobState};
pub use orchestrator::{Orchestrator, OrchestratorConfig, UnknownReferencePolicy};
pub use request::GenerationRequest;

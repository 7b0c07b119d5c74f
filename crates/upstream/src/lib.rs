//! HTTP client for the upstream video generation service.
//!
//! Submission (standard and extension endpoints), status polling, and
//! the error classification the orchestrator's retry policy depends
//! on.

pub mod api;
pub mod backoff;
pub mod error;
pub mod payload;

pub use api::FlowApi;
pub use error::{ErrorClass, UpstreamError};

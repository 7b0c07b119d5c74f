//! Shared domain types for the flowgate gateway.
//!
//! This crate has no internal dependencies so every other workspace
//! member (pool, captcha, upstream, pipeline, api) can build on it.

pub mod catalog;
pub mod continuation;
pub mod error;
pub mod media;
pub mod types;

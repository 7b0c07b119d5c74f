//! HTTP surface of the gateway.
//!
//! Exposes a chat-completions style API over the generation pipeline:
//! `POST /v1/chat/completions` (streaming and non-streaming),
//! `GET /v1/models`, and an unauthenticated `GET /health` that reports
//! sanitized credential pool state.

pub mod config;
pub mod error;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod state;

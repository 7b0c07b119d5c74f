//! Normalized generation requests.
//!
//! A [`GenerationRequest`] is the boundary between the HTTP surface and
//! the orchestrator: the model key is already resolved, the prompt is
//! clean of annotation syntax, and the continuation reference (if any)
//! is structured. Everything syntactically invalid is rejected here,
//! before any credential or challenge token is consumed.

use flowgate_core::catalog::ModelSpec;
use flowgate_core::continuation::{self, ContinuationError, ContinuationReference};
use flowgate_core::error::GatewayError;

/// A fully resolved, syntactically valid generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: ModelSpec,
    /// Prompt text with any continuation annotation stripped.
    pub prompt: String,
    /// Present exactly when the model is an extension variant.
    pub continuation: Option<ContinuationReference>,
}

impl GenerationRequest {
    /// Build a request from a resolved model and the raw prompt text.
    ///
    /// Parses and strips the continuation annotation according to the
    /// model's mode. Annotation errors surface as validation failures.
    pub fn from_prompt(model: ModelSpec, raw_prompt: &str) -> Result<Self, GatewayError> {
        if raw_prompt.trim().is_empty() {
            return Err(GatewayError::Validation("prompt must not be empty".into()));
        }

        let (prompt, continuation) =
            continuation::parse(raw_prompt, model.mode).map_err(|err| match err {
                ContinuationError::Malformed(reason) => GatewayError::Validation(reason),
                ContinuationError::Unexpected => GatewayError::Validation(
                    "continuation annotation is only valid with an extension model".into(),
                ),
            })?;

        if let Some(reference) = &continuation {
            if !continuation::is_well_formed_media_id(&reference.media_id) {
                return Err(GatewayError::Validation(
                    "continuation video_id is not a well-formed media identifier".into(),
                ));
            }
        }

        Ok(Self {
            model,
            prompt,
            continuation,
        })
    }
}

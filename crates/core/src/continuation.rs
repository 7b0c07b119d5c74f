//! Continuation annotation parser.
//!
//! Extension requests reference a prior clip through a trailing
//! bracketed annotation in the prompt text:
//!
//! ```text
//! continue the shot [video_id:ABC123,start_frame:168,end_frame:191]
//! ```
//!
//! The three key/value pairs may appear in any order. The annotation
//! is parsed once at the boundary into a [`ContinuationReference`] and
//! stripped from the prompt; the remaining prose is preserved verbatim
//! including internal whitespace. Raw annotation text is never carried
//! further into the pipeline.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::GenerationMode;

/// Trailing `[...]` group at the end of the prompt (whitespace after
/// the closing bracket is tolerated).
static ANNOTATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^(.*?)\s*\[([^\[\]]*)\]\s*$").expect("valid regex"));

/// Identifies which portion of a previously produced clip to extend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationReference {
    /// Opaque media identifier of the source clip.
    pub media_id: String,
    /// First frame of the window handed to the extension model.
    pub start_frame: u32,
    /// Last frame of the window (inclusive).
    pub end_frame: u32,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ContinuationError {
    /// The model requires an extension reference and the annotation is
    /// absent, incomplete, or carries invalid values.
    #[error("Malformed continuation syntax: {0}")]
    Malformed(String),

    /// An annotation is present but the model key denotes a
    /// non-extension variant. Ambiguous intent is rejected rather than
    /// silently ignored.
    #[error("Continuation annotation present but the model is not an extension variant")]
    Unexpected,
}

/// Parse a prompt, extracting the continuation annotation if present.
///
/// Returns the clean prompt (annotation stripped) and the parsed
/// reference. The `mode` of the resolved model decides whether an
/// annotation is required (`Extend`) or forbidden (`Generate`).
pub fn parse(
    prompt: &str,
    mode: GenerationMode,
) -> Result<(String, Option<ContinuationReference>), ContinuationError> {
    let candidate = ANNOTATION_RE.captures(prompt).and_then(|caps| {
        let body = caps.get(2).map_or("", |m| m.as_str());
        // Only a bracket group carrying at least one known key is an
        // annotation; anything else is prose and left untouched.
        if contains_known_key(body) {
            Some((caps.get(1).map_or("", |m| m.as_str()).to_string(), body.to_string()))
        } else {
            None
        }
    });

    match (candidate, mode) {
        (Some((clean, body)), GenerationMode::Extend) => {
            let reference = parse_annotation_body(&body)?;
            Ok((clean, Some(reference)))
        }
        (Some(_), GenerationMode::Generate) => Err(ContinuationError::Unexpected),
        (None, GenerationMode::Extend) => Err(ContinuationError::Malformed(
            "extension models require a trailing \
             [video_id:...,start_frame:...,end_frame:...] annotation"
                .to_string(),
        )),
        (None, GenerationMode::Generate) => Ok((prompt.to_string(), None)),
    }
}

/// Sanity check on the shape of a media identifier before it is used
/// in an upstream payload. Identifiers are opaque but the upstream
/// only ever issues URL-safe ones.
pub fn is_well_formed_media_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn contains_known_key(body: &str) -> bool {
    body.split(',')
        .filter_map(|pair| pair.split_once(':'))
        .any(|(key, _)| {
            matches!(key.trim(), "video_id" | "start_frame" | "end_frame")
        })
}

/// Parse the comma-separated key/value pairs inside the brackets.
fn parse_annotation_body(body: &str) -> Result<ContinuationReference, ContinuationError> {
    let mut media_id: Option<String> = None;
    let mut start_frame: Option<u32> = None;
    let mut end_frame: Option<u32> = None;

    for pair in body.split(',') {
        let (key, value) = pair.split_once(':').ok_or_else(|| {
            ContinuationError::Malformed(format!("expected key:value pair, got '{}'", pair.trim()))
        })?;
        let (key, value) = (key.trim(), value.trim());

        match key {
            "video_id" => {
                if media_id.replace(value.to_string()).is_some() {
                    return Err(ContinuationError::Malformed("duplicate video_id".into()));
                }
            }
            "start_frame" => {
                if start_frame.replace(parse_frame(key, value)?).is_some() {
                    return Err(ContinuationError::Malformed("duplicate start_frame".into()));
                }
            }
            "end_frame" => {
                if end_frame.replace(parse_frame(key, value)?).is_some() {
                    return Err(ContinuationError::Malformed("duplicate end_frame".into()));
                }
            }
            other => {
                return Err(ContinuationError::Malformed(format!(
                    "unknown annotation key '{other}'"
                )));
            }
        }
    }

    let media_id = media_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ContinuationError::Malformed("missing video_id".into()))?;
    let start_frame =
        start_frame.ok_or_else(|| ContinuationError::Malformed("missing start_frame".into()))?;
    let end_frame =
        end_frame.ok_or_else(|| ContinuationError::Malformed("missing end_frame".into()))?;

    if start_frame > end_frame {
        return Err(ContinuationError::Malformed(format!(
            "start_frame {start_frame} exceeds end_frame {end_frame}"
        )));
    }

    Ok(ContinuationReference {
        media_id,
        start_frame,
        end_frame,
    })
}

/// Frame indices are non-negative integers.
fn parse_frame(key: &str, value: &str) -> Result<u32, ContinuationError> {
    value
        .parse::<u32>()
        .map_err(|_| ContinuationError::Malformed(format!("{key} must be a non-negative integer")))
}

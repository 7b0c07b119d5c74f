//! Small shared aliases and enums used across the workspace.

use serde::{Deserialize, Serialize};

/// Internal identifier for a pooled credential.
pub type CredentialId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Capability class of a credential or model.
///
/// A model's tier constrains which credentials may serve it: elevated
/// models require elevated credentials, standard models require
/// standard credentials. The pool never substitutes across tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Standard,
    Elevated,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Standard => "standard",
            Tier::Elevated => "elevated",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output orientation of a video model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Landscape,
    Portrait,
}

impl Orientation {
    /// Upstream aspect-ratio designator for this orientation.
    pub fn aspect_ratio(&self) -> &'static str {
        match self {
            Orientation::Landscape => "VIDEO_ASPECT_RATIO_LANDSCAPE",
            Orientation::Portrait => "VIDEO_ASPECT_RATIO_PORTRAIT",
        }
    }
}

/// Whether a model key denotes a fresh generation or an extension of a
/// previously produced video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    Generate,
    Extend,
}

impl GenerationMode {
    pub fn is_extend(&self) -> bool {
        matches!(self, GenerationMode::Extend)
    }
}

//! Model key catalog.
//!
//! Maps the opaque model key a caller sends (e.g. `veo-3-fast-landscape`)
//! to everything the pipeline needs: the upstream model name, output
//! orientation, required credential tier, generation mode, and the
//! model's fixed duration/frame-rate. The mapping table itself is
//! configuration — it can be replaced wholesale from a JSON document —
//! but a built-in default table is provided so the gateway works out
//! of the box.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{GenerationMode, Orientation, Tier};

/// Everything derivable from a single opaque model key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    /// The caller-facing key, e.g. `veo-3-quality-portrait-extend`.
    pub key: String,
    /// Upstream model designator sent in the request payload.
    pub upstream_name: String,
    pub orientation: Orientation,
    pub tier: Tier,
    pub mode: GenerationMode,
    /// Fixed clip duration in seconds.
    pub duration_secs: u32,
    /// Fixed frame rate.
    pub fps: u32,
}

impl ModelSpec {
    /// Total frames in a clip produced by this model.
    pub fn frame_count(&self) -> u32 {
        self.duration_secs * self.fps
    }
}

/// Lookup table from model key to [`ModelSpec`].
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: HashMap<String, ModelSpec>,
}

/// Errors raised when loading a catalog from JSON.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to parse model catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Duplicate model key: {0}")]
    DuplicateKey(String),

    #[error("Model catalog must not be empty")]
    Empty,
}

impl ModelCatalog {
    /// Build a catalog from an explicit list of specs.
    pub fn new(specs: Vec<ModelSpec>) -> Result<Self, CatalogError> {
        if specs.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut models = HashMap::with_capacity(specs.len());
        for spec in specs {
            let key = spec.key.clone();
            if models.insert(key.clone(), spec).is_some() {
                return Err(CatalogError::DuplicateKey(key));
            }
        }
        Ok(Self { models })
    }

    /// Parse a catalog from a JSON array of [`ModelSpec`] objects.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let specs: Vec<ModelSpec> = serde_json::from_str(json)?;
        Self::new(specs)
    }

    /// Look up a model key. `None` means the key is unknown.
    pub fn resolve(&self, key: &str) -> Option<&ModelSpec> {
        self.models.get(key)
    }

    /// All known model keys, sorted, for the `/v1/models` listing.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.models.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl Default for ModelCatalog {
    /// The built-in table: orientation (landscape/portrait) x tier
    /// (fast=standard, quality=elevated) x mode (generate/extend).
    /// All entries are 8-second clips at 24 fps.
    fn default() -> Self {
        let mut specs = Vec::new();
        let variants = [
            ("fast", "veo_3_0_t2v_fast", Tier::Standard),
            ("quality", "veo_3_0_t2v", Tier::Elevated),
        ];
        let orientations = [
            ("landscape", Orientation::Landscape),
            ("portrait", Orientation::Portrait),
        ];
        for (variant, upstream, tier) in variants {
            for (suffix, orientation) in orientations {
                specs.push(ModelSpec {
                    key: format!("veo-3-{variant}-{suffix}"),
                    upstream_name: upstream.to_string(),
                    orientation,
                    tier,
                    mode: GenerationMode::Generate,
                    duration_secs: 8,
                    fps: 24,
                });
                specs.push(ModelSpec {
                    key: format!("veo-3-{variant}-{suffix}-extend"),
                    upstream_name: format!("{upstream}_continue"),
                    orientation,
                    tier,
                    mode: GenerationMode::Extend,
                    duration_secs: 8,
                    fps: 24,
                });
            }
        }
        Self::new(specs).expect("built-in catalog is valid")
    }
}

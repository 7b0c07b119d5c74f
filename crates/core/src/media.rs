//! Media artifact records and the in-process reference tracker.
//!
//! The tracker exists for fast pre-validation of extension requests
//! before an upstream round trip is spent. It is purely additive and
//! not authoritative: the upstream service decides whether a media id
//! is still valid, and a process restart clears local state. Policy
//! for handling a local miss lives in the orchestrator, not here.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::types::Timestamp;

/// The result of a completed generation job. Never mutated after
/// creation.
#[derive(Debug, Clone)]
pub struct MediaArtifact {
    /// Stable opaque identifier issued by the upstream service.
    pub media_id: String,
    /// Playable URL for the produced clip.
    pub url: String,
    /// Total frames, derived from the producing model's fixed
    /// duration and frame rate.
    pub frame_count: u32,
    /// Identifier of the upstream job that produced this artifact.
    pub job_id: String,
    pub created_at: Timestamp,
}

/// Additive store of artifacts keyed by media identifier.
///
/// The orchestrator is the sole writer. Reads are O(1).
#[derive(Debug, Default)]
pub struct MediaTracker {
    artifacts: RwLock<HashMap<String, MediaArtifact>>,
}

impl MediaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly produced artifact.
    ///
    /// Re-recording an existing id is a no-op: artifacts are immutable
    /// and the first record wins.
    pub async fn record(&self, artifact: MediaArtifact) {
        let mut artifacts = self.artifacts.write().await;
        artifacts
            .entry(artifact.media_id.clone())
            .or_insert(artifact);
    }

    /// Whether this gateway has produced the given media id.
    pub async fn exists(&self, media_id: &str) -> bool {
        self.artifacts.read().await.contains_key(media_id)
    }

    /// Frame count of a tracked artifact, or `None` if untracked.
    pub async fn frame_count(&self, media_id: &str) -> Option<u32> {
        self.artifacts
            .read()
            .await
            .get(media_id)
            .map(|a| a.frame_count)
    }

    /// Full artifact record, if tracked.
    pub async fn get(&self, media_id: &str) -> Option<MediaArtifact> {
        self.artifacts.read().await.get(media_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.artifacts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.artifacts.read().await.is_empty()
    }
}

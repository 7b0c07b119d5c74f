//! Wire types for the upstream generation API.
//!
//! Both submission endpoints accept the same envelope: a client
//! context object carrying the caller identity and challenge token,
//! plus a requests array with the model parameters. The extension
//! endpoint additionally expects a `videoInput` continuation block in
//! each request.

use serde::{Deserialize, Serialize};

/// Caller identity and per-call proof embedded in every submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContext {
    /// The credential's opaque session token.
    pub session_token: String,
    /// Fresh UUID per gateway request, used by the upstream to
    /// correlate submissions.
    pub session_id: String,
    /// Single-use challenge token value.
    pub challenge_token: String,
    /// Tool designator the upstream expects.
    pub tool: String,
}

/// One generation request within the submission envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRequest {
    /// Upstream model designator (not the caller-facing key).
    pub video_model_key: String,
    pub aspect_ratio: String,
    pub text_input: TextInput,
    /// Continuation block; present only on the extension endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_input: Option<VideoInput>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextInput {
    pub prompt: String,
}

/// Reference to the portion of a prior clip to extend.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInput {
    pub media_id: String,
    pub start_frame: u32,
    pub end_frame: u32,
}

/// Full submission envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitPayload {
    pub client_context: ClientContext,
    pub requests: Vec<VideoRequest>,
}

/// Response returned by both submission endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub operations: Vec<OperationHandle>,
}

impl SubmitResponse {
    /// The job handle for a single-request submission.
    pub fn operation_name(&self) -> Option<&str> {
        self.operations.first().map(|op| op.operation.name.as_str())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationHandle {
    pub operation: OperationRef,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRef {
    /// Server-assigned job identifier.
    pub name: String,
}

/// Job state as reported by the poll endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum OperationState {
    #[serde(rename = "MEDIA_GENERATION_STATUS_PENDING")]
    Pending,
    #[serde(rename = "MEDIA_GENERATION_STATUS_ACTIVE")]
    Active,
    #[serde(rename = "MEDIA_GENERATION_STATUS_SUCCESSFUL")]
    Succeeded,
    #[serde(rename = "MEDIA_GENERATION_STATUS_FAILED")]
    Failed,
}

impl OperationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationState::Succeeded | OperationState::Failed)
    }
}

/// One polled operation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStatus {
    pub operation: OperationRef,
    pub status: OperationState,
    /// Present once the job has succeeded.
    #[serde(default)]
    pub media: Option<MediaResult>,
    /// Human-readable failure reason, when the job failed.
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaResult {
    /// Stable opaque media identifier.
    pub media_id: String,
    /// Playable URL for the produced clip.
    pub fife_url: String,
}

/// Poll request envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollPayload {
    pub operations: Vec<OperationRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub operations: Vec<OperationStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_request_serializes_video_input() {
        let request = VideoRequest {
            video_model_key: "veo_3_0_t2v_fast_continue".to_string(),
            aspect_ratio: "VIDEO_ASPECT_RATIO_LANDSCAPE".to_string(),
            text_input: TextInput {
                prompt: "continue".to_string(),
            },
            video_input: Some(VideoInput {
                media_id: "ABC".to_string(),
                start_frame: 168,
                end_frame: 191,
            }),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["videoInput"]["mediaId"], "ABC");
        assert_eq!(json["videoInput"]["startFrame"], 168);
    }

    #[test]
    fn standard_request_omits_video_input() {
        let request = VideoRequest {
            video_model_key: "veo_3_0_t2v_fast".to_string(),
            aspect_ratio: "VIDEO_ASPECT_RATIO_PORTRAIT".to_string(),
            text_input: TextInput {
                prompt: "a cat".to_string(),
            },
            video_input: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("videoInput").is_none());
    }

    #[test]
    fn poll_response_parses_success() {
        let json = r#"{
            "operations": [{
                "operation": {"name": "op-1"},
                "status": "MEDIA_GENERATION_STATUS_SUCCESSFUL",
                "media": {"mediaId": "ABC", "fifeUrl": "https://media.example/ABC"}
            }]
        }"#;
        let response: PollResponse = serde_json::from_str(json).unwrap();
        let op = &response.operations[0];
        assert_eq!(op.status, OperationState::Succeeded);
        assert!(op.status.is_terminal());
        assert_eq!(op.media.as_ref().unwrap().media_id, "ABC");
    }

    #[test]
    fn pending_is_not_terminal() {
        assert!(!OperationState::Pending.is_terminal());
        assert!(!OperationState::Active.is_terminal());
        assert!(OperationState::Failed.is_terminal());
    }
}

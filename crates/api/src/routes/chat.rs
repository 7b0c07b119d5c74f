//! The chat-completions endpoint.
//!
//! Accepts an OpenAI-style request body where the prompt is the last
//! user message and the model key selects a catalog entry. The
//! completion content is the produced clip's URL plus a ready-made
//! continuation annotation the caller can paste into a follow-up
//! request against an extension model.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use flowgate_core::error::GatewayError;
use flowgate_core::media::MediaArtifact;
use flowgate_pipeline::{GenerationRequest, Orchestrator};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Frames handed to the extension model as context; the continuation
/// hint in the completion content points at the final window of this
/// size.
const CONTINUATION_WINDOW: u32 = 24;

#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

pub async fn create_chat_completion(
    State(state): State<AppState>,
    Json(body): Json<ChatCompletionRequest>,
) -> AppResult<Response> {
    let prompt = last_user_prompt(&body.messages).ok_or_else(|| {
        AppError::BadRequest("messages must contain at least one user message".into())
    })?;

    let model = state
        .catalog
        .resolve(&body.model)
        .cloned()
        .ok_or_else(|| AppError::UnknownModel(body.model.clone()))?;

    let request = GenerationRequest::from_prompt(model, &prompt)?;

    if body.stream {
        Ok(stream_completion(state, body.model, request).into_response())
    } else {
        let artifact = run_generation(&state.orchestrator, request).await?;
        Ok(Json(completion_body(&body.model, &artifact)).into_response())
    }
}

// ---- private helpers ----

/// Run one generation on a detached task so a dropped connection turns
/// into a clean cancellation rather than an abandoned lease.
async fn run_generation(
    orchestrator: &Arc<Orchestrator>,
    request: GenerationRequest,
) -> Result<MediaArtifact, GatewayError> {
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let orchestrator = Arc::clone(orchestrator);
    let handle = tokio::spawn(async move { orchestrator.run(&request, &cancel).await });

    let result = match handle.await {
        Ok(result) => result,
        Err(err) => Err(GatewayError::UpstreamTransient(format!(
            "generation task failed: {err}"
        ))),
    };
    drop(guard);
    result
}

/// Streamed variant: role chunk up front, the content chunk once the
/// clip exists, a stop chunk, then `[DONE]`. Dropping the connection
/// cancels the underlying job.
fn stream_completion(
    state: AppState,
    model: String,
    request: GenerationRequest,
) -> Sse<KeepAliveStream<ReceiverStream<Result<Event, Infallible>>>> {
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        let id = completion_id();
        let created = chrono::Utc::now().timestamp();

        let _ = tx
            .send(Ok(chunk(&id, created, &model, json!({"role": "assistant"}), None)))
            .await;

        let cancel = CancellationToken::new();
        let orchestrator = Arc::clone(&state.orchestrator);
        let run = orchestrator.run(&request, &cancel);
        tokio::pin!(run);

        let result = tokio::select! {
            result = &mut run => result,
            // The receiver side is gone: the client disconnected.
            _ = tx.closed() => {
                cancel.cancel();
                run.await
            }
        };

        match result {
            Ok(artifact) => {
                let delta = json!({"content": render_content(&artifact)});
                let _ = tx.send(Ok(chunk(&id, created, &model, delta, None))).await;
                let _ = tx
                    .send(Ok(chunk(&id, created, &model, json!({}), Some("stop"))))
                    .await;
            }
            Err(err) => {
                let payload = json!({
                    "error": {"message": err.to_string(), "code": err.code()}
                });
                let _ = tx.send(Ok(Event::default().data(payload.to_string()))).await;
            }
        }

        let _ = tx.send(Ok(Event::default().data("[DONE]"))).await;
    });

    Sse::new(ReceiverStream::new(rx))
        .keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(10)))
}

fn last_user_prompt(messages: &[ChatMessage]) -> Option<String> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == "user" && !m.content.trim().is_empty())
        .map(|m| m.content.clone())
}

fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4())
}

/// The assistant message for a finished clip: the playable URL plus a
/// continuation annotation pointing at the final frame window.
fn render_content(artifact: &MediaArtifact) -> String {
    let end = artifact.frame_count.saturating_sub(1);
    let start = artifact.frame_count.saturating_sub(CONTINUATION_WINDOW);
    format!(
        "[video]({url})\n\nTo extend this clip, send a prompt ending in:\n\
         [video_id:{id},start_frame:{start},end_frame:{end}]",
        url = artifact.url,
        id = artifact.media_id,
    )
}

fn completion_body(model: &str, artifact: &MediaArtifact) -> serde_json::Value {
    json!({
        "id": completion_id(),
        "object": "chat.completion",
        "created": chrono::Utc::now().timestamp(),
        "model": model,
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": render_content(artifact),
            },
            "finish_reason": "stop",
        }],
    })
}

fn chunk(
    id: &str,
    created: i64,
    model: &str,
    delta: serde_json::Value,
    finish_reason: Option<&str>,
) -> Event {
    Event::default().data(
        json!({
            "id": id,
            "object": "chat.completion.chunk",
            "created": created,
            "model": model,
            "choices": [{
                "index": 0,
                "delta": delta,
                "finish_reason": finish_reason,
            }],
        })
        .to_string(),
    )
}

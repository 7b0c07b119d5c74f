//! Minimal Chrome DevTools Protocol session.
//!
//! Just enough of the protocol for the browser provider: connect to a
//! page target, navigate, and evaluate JavaScript. Commands are
//! correlated by id; protocol events arriving in between are skipped.

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::CaptchaError;

pub(crate) struct CdpSession {
    ws: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    next_id: u64,
    /// URL the page currently has loaded, as far as we know.
    pub current_url: Option<String>,
    /// Whether the challenge script has been confirmed present.
    pub script_ready: bool,
}

impl CdpSession {
    /// Connect to a DevTools page target (a `ws://.../devtools/page/...`
    /// URL).
    pub async fn connect(devtools_url: &str) -> Result<Self, CaptchaError> {
        let (ws, _response) = connect_async(devtools_url).await.map_err(|e| {
            CaptchaError::AcquisitionFailed(format!(
                "failed to connect to DevTools endpoint: {e}"
            ))
        })?;

        tracing::info!("Connected to DevTools page target");

        Ok(Self {
            ws,
            next_id: 0,
            current_url: None,
            script_ready: false,
        })
    }

    /// Send one protocol command and wait for its matching response.
    pub async fn send_command(
        &mut self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, CaptchaError> {
        self.next_id += 1;
        let id = self.next_id;

        let command = serde_json::json!({
            "id": id,
            "method": method,
            "params": params,
        });
        self.ws
            .send(Message::text(command.to_string()))
            .await
            .map_err(|e| CaptchaError::AcquisitionFailed(format!("DevTools send failed: {e}")))?;

        // Read frames until the response with our id arrives; protocol
        // events are interleaved on the same stream.
        while let Some(frame) = self.ws.next().await {
            let frame = frame.map_err(|e| {
                CaptchaError::AcquisitionFailed(format!("DevTools read failed: {e}"))
            })?;
            let Message::Text(text) = frame else {
                continue;
            };
            let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else {
                continue;
            };
            if value.get("id").and_then(serde_json::Value::as_u64) != Some(id) {
                continue; // event or stale response
            }
            if let Some(error) = value.get("error") {
                let message = error
                    .get("message")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("unknown protocol error");
                return Err(CaptchaError::AcquisitionFailed(format!(
                    "DevTools command {method} failed: {message}"
                )));
            }
            return Ok(value.get("result").cloned().unwrap_or_default());
        }

        Err(CaptchaError::AcquisitionFailed(
            "DevTools connection closed mid-command".to_string(),
        ))
    }

    /// Navigate the page and remember the new URL. Resets script state
    /// since a navigation discards injected scripts.
    pub async fn navigate(&mut self, url: &str) -> Result<(), CaptchaError> {
        self.send_command("Page.navigate", serde_json::json!({ "url": url }))
            .await?;
        self.current_url = Some(url.to_string());
        self.script_ready = false;
        Ok(())
    }

    /// Evaluate a JavaScript expression in the page, returning the
    /// remote value. `await_promise` resolves promises before
    /// returning.
    pub async fn evaluate(
        &mut self,
        expression: &str,
        await_promise: bool,
    ) -> Result<serde_json::Value, CaptchaError> {
        let result = self
            .send_command(
                "Runtime.evaluate",
                serde_json::json!({
                    "expression": expression,
                    "awaitPromise": await_promise,
                    "returnByValue": true,
                }),
            )
            .await?;

        if let Some(exception) = result.get("exceptionDetails") {
            let text = exception
                .get("text")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("script exception");
            return Err(CaptchaError::AcquisitionFailed(format!(
                "challenge script raised: {text}"
            )));
        }

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(serde_json::Value::Null))
    }
}

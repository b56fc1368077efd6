//! The stream adapter: bridges one invocation to one streamed response.
//!
//! Wire protocol expected by the hosting platform, in order:
//! 1. a JSON control record `{"statusCode":200,"headers":{...}}`
//! 2. eight NUL delimiter bytes
//! 3. SSE payload frames (`data: <token>\n\n`), ending with exactly one of
//!    `data: [DONE]\n\n` or `data: [ERROR] <msg>\n\n`.
//!
//! Once the preamble is out, status and headers are committed; later failures
//! can only be reported in-band, so the error frame is best-effort and the
//! sink is closed on every path.

use crate::event::{extract_message, InvocationEvent};
use crate::llm::{
    BedrockClient, BedrockError, ConverseMessage, ConverseStreamEvent, InferenceConfig,
};
use crate::sink::{ResponseSink, SinkError};
use futures_util::{Stream, StreamExt};
use serde_json::json;

/// Delimiter between the control record and the payload bytes.
const PREAMBLE_DELIMITER: [u8; 8] = [0u8; 8];

/// Terminal frame after normal stream exhaustion.
const DONE_FRAME: &str = "data: [DONE]\n\n";

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Bedrock(#[from] BedrockError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Per-deployment parameters for the outbound Converse call.
#[derive(Debug, Clone)]
pub struct RelayParams {
    pub model_id: String,
    pub inference: InferenceConfig,
}

/// One SSE data frame.
fn sse_frame(payload: &str) -> String {
    format!("data: {}\n\n", payload)
}

/// Control record plus delimiter. Must be the first bytes of every response.
async fn write_preamble(sink: &mut dyn ResponseSink) -> Result<(), SinkError> {
    let control = json!({
        "statusCode": 200,
        "headers": {
            "content-type": "text/event-stream; charset=utf-8",
            "cache-control": "no-cache, no-transform",
            "connection": "keep-alive",
            "access-control-allow-origin": "*",
        },
    });
    sink.write(control.to_string().as_bytes()).await?;
    sink.write(&PREAMBLE_DELIMITER).await?;
    Ok(())
}

/// Relay provider events to the sink until the stream is exhausted, then
/// write the done frame. Each non-empty text delta becomes exactly one frame,
/// in emission order; the next event is not requested until the current frame
/// has been written.
async fn relay_stream<S>(mut events: S, sink: &mut dyn ResponseSink) -> Result<(), RelayError>
where
    S: Stream<Item = Result<ConverseStreamEvent, BedrockError>> + Unpin,
{
    while let Some(event) = events.next().await {
        let event = event?;
        if let Some(text) = event.delta_text() {
            if !text.is_empty() {
                sink.write(sse_frame(text).as_bytes()).await?;
            }
        }
    }
    sink.write(DONE_FRAME.as_bytes()).await?;
    Ok(())
}

/// Extract the message, open the Converse stream, relay it.
async fn run(
    client: &BedrockClient,
    params: &RelayParams,
    event: &InvocationEvent,
    sink: &mut dyn ResponseSink,
) -> Result<(), RelayError> {
    let message = extract_message(event);
    let stream = client
        .converse_stream(
            &params.model_id,
            vec![ConverseMessage::user(message)],
            params.inference.clone(),
        )
        .await?;
    relay_stream(stream, sink).await
}

/// Close the sink, swallowing any error. Runs on every exit path.
async fn safe_close(sink: &mut dyn ResponseSink) {
    if let Err(e) = sink.close().await {
        log::debug!("relay: closing response sink: {}", e);
    }
}

/// Handle one invocation end to end. The preamble is written before anything
/// else; failures after that point are logged and reported in-band as a
/// single `data: [ERROR] <msg>\n\n` frame. The sink is closed exactly once on
/// every path. When the preamble itself cannot be written there is no usable
/// response and the error is returned after the close attempt.
pub async fn relay_invocation(
    client: &BedrockClient,
    params: &RelayParams,
    event: &InvocationEvent,
    sink: &mut dyn ResponseSink,
) -> Result<(), RelayError> {
    if let Err(e) = write_preamble(sink).await {
        log::error!("relay: writing response preamble failed: {}", e);
        safe_close(sink).await;
        return Err(e.into());
    }
    let result = run(client, params, event, sink).await;
    if let Err(ref e) = result {
        log::warn!("relay: streaming failed: {}", e);
        let _ = sink
            .write(sse_frame(&format!("[ERROR] {}", e)).as_bytes())
            .await;
    }
    safe_close(sink).await;
    result
}

//! Bedrock Converse API client (streaming).
//!
//! Talks to a Bedrock-style runtime endpoint:
//! `POST {base}/model/{modelId}/converse-stream`, optionally with a bearer
//! token (the managed API's api-key scheme; request signing is left to the
//! deployment). The streamed response is consumed as newline-delimited JSON
//! events; only the fields the relay needs are modeled.

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Client for the Converse API of a Bedrock-style runtime endpoint.
#[derive(Clone)]
pub struct BedrockClient {
    base_url: String,
    bearer_token: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum BedrockError {
    #[error("bedrock request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("bedrock api error: {0}")]
    Api(String),
}

/// One turn of a Converse conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverseMessage {
    pub role: String,
    pub content: Vec<ContentBlock>,
}

impl ConverseMessage {
    /// Single user turn with one text block.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: vec![ContentBlock { text: text.into() }],
        }
    }
}

/// Text content block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlock {
    pub text: String,
}

/// Static generation parameters sent with every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfig {
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConverseRequest {
    messages: Vec<ConverseMessage>,
    inference_config: InferenceConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ContentBlockDelta {
    #[serde(default)]
    delta: Option<Delta>,
}

/// One event from the Converse stream. Events the relay does not care about
/// (content block start/stop, metadata) deserialize to an event without a
/// delta.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseStreamEvent {
    #[serde(default)]
    content_block_delta: Option<ContentBlockDelta>,
    #[serde(default)]
    message_stop: Option<serde_json::Value>,
}

impl ConverseStreamEvent {
    /// Text delta carried by this event, if any.
    pub fn delta_text(&self) -> Option<&str> {
        self.content_block_delta
            .as_ref()
            .and_then(|c| c.delta.as_ref())
            .and_then(|d| d.text.as_deref())
    }

    /// True when this event marks the end of the assistant message.
    pub fn is_message_stop(&self) -> bool {
        self.message_stop.is_some()
    }
}

impl BedrockClient {
    pub fn new(base_url: impl Into<String>, bearer_token: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            bearer_token,
            client: reqwest::Client::new(),
        }
    }

    /// POST /model/{modelId}/converse-stream — open a streaming Converse call.
    pub async fn converse_stream(
        &self,
        model: &str,
        messages: Vec<ConverseMessage>,
        inference_config: InferenceConfig,
    ) -> Result<ConverseStream, BedrockError> {
        let url = format!("{}/model/{}/converse-stream", self.base_url, model);
        let body = ConverseRequest {
            messages,
            inference_config,
        };
        let mut req = self.client.post(&url).json(&body);
        if let Some(ref token) = self.bearer_token {
            req = req.bearer_auth(token);
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(BedrockError::Api(format!("{} {}", status, body)));
        }
        Ok(ConverseStream {
            inner: res.bytes_stream().boxed(),
            buffer: Vec::new(),
            ended: false,
        })
    }
}

/// Incremental reader over a streamed Converse response: one JSON event per
/// line, in emission order. Lines that do not parse as events are skipped;
/// transport errors surface as stream items.
pub struct ConverseStream {
    inner: BoxStream<'static, reqwest::Result<Bytes>>,
    buffer: Vec<u8>,
    ended: bool,
}

impl ConverseStream {
    /// Pop the next complete line from the buffer and parse it. Empty and
    /// unparsable lines are skipped.
    fn take_line_event(&mut self) -> Option<ConverseStreamEvent> {
        while let Some(i) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..i).collect();
            self.buffer.drain(..1);
            let line = String::from_utf8_lossy(&line_bytes).trim().to_string();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(event) => return Some(event),
                Err(_) => continue,
            }
        }
        None
    }

    /// Parse a trailing line without a final newline once the body has ended.
    fn take_tail_event(&mut self) -> Option<ConverseStreamEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.buffer).trim().to_string();
        self.buffer.clear();
        if line.is_empty() {
            return None;
        }
        serde_json::from_str(&line).ok()
    }
}

impl Stream for ConverseStream {
    type Item = Result<ConverseStreamEvent, BedrockError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(event) = this.take_line_event() {
                return Poll::Ready(Some(Ok(event)));
            }
            if this.ended {
                return Poll::Ready(this.take_tail_event().map(Ok));
            }
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => this.buffer.extend_from_slice(&chunk),
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(BedrockError::Request(e))))
                }
                Poll::Ready(None) => this.ended = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

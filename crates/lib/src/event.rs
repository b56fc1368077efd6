//! Invocation event model and message extraction.
//!
//! The hosting platform delivers an HTTP-shaped event (raw body plus a base64
//! flag). Extraction is deliberately lenient: a missing body, malformed
//! base64, invalid JSON, or an unusable `message` field all degrade to
//! defaults and never fail the invocation.

use base64::Engine;
use serde::{Deserialize, Serialize};

/// Message used when the event carries no usable `message` field.
pub const DEFAULT_MESSAGE: &str = "hello streaming";

/// Inbound invocation event as delivered by the platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationEvent {
    /// Raw request body. May be absent.
    #[serde(default)]
    pub body: Option<String>,

    /// When true, `body` is base64 and must be decoded before JSON parsing.
    #[serde(default)]
    pub is_base64_encoded: bool,
}

impl InvocationEvent {
    /// Event carrying a plain-text body.
    pub fn with_body(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            is_base64_encoded: false,
        }
    }
}

/// Parse the event body as JSON. Missing body, bad base64, bad UTF-8, and
/// invalid JSON all yield an empty object.
fn parse_body(event: &InvocationEvent) -> serde_json::Value {
    let raw = match event.body {
        Some(ref b) if event.is_base64_encoded => {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(b.as_bytes())
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok());
            match decoded {
                Some(s) => s,
                None => return serde_json::json!({}),
            }
        }
        Some(ref b) => b.clone(),
        None => return serde_json::json!({}),
    };
    serde_json::from_str(&raw).unwrap_or_else(|_| serde_json::json!({}))
}

/// Extract the user message from the event. The `message` field must be a
/// string with non-whitespace content after trimming; it is then forwarded
/// verbatim (untrimmed). Anything else falls back to [`DEFAULT_MESSAGE`].
pub fn extract_message(event: &InvocationEvent) -> String {
    let body = parse_body(event);
    body.get("message")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| DEFAULT_MESSAGE.to_string())
}

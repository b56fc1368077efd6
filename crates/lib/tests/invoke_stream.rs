//! Integration test: a stub Converse endpoint plus the real gateway, each on
//! a free port. POST invocation events to /invoke and assert the byte-exact
//! streaming-response protocol (control record, 8 NUL delimiter bytes, SSE
//! frames, single terminator).

use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use lib::config::Config;
use lib::gateway;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Canned provider stream: three text deltas framed by the usual start/stop
/// events, one JSON event per line.
const STUB_EVENTS: &str = concat!(
    r#"{"messageStart":{"role":"assistant"}}"#,
    "\n",
    r#"{"contentBlockDelta":{"delta":{"text":"Sure"},"contentBlockIndex":0}}"#,
    "\n",
    r#"{"contentBlockDelta":{"delta":{"text":", "},"contentBlockIndex":0}}"#,
    "\n",
    r#"{"contentBlockDelta":{"delta":{"text":"retries..."},"contentBlockIndex":0}}"#,
    "\n",
    r#"{"contentBlockStop":{"contentBlockIndex":0}}"#,
    "\n",
    r#"{"messageStop":{"stopReason":"end_turn"}}"#,
    "\n",
);

#[derive(Clone, Copy)]
enum StubResponse {
    Events(&'static str),
    Failure,
}

type CapturedRequest = Arc<Mutex<Option<serde_json::Value>>>;

/// Stub Converse endpoint: captures the request body and answers every
/// converse-stream POST with the configured response.
async fn start_stub_provider(response: StubResponse) -> (u16, CapturedRequest) {
    let captured: CapturedRequest = Arc::new(Mutex::new(None));
    let cap = captured.clone();
    let app = Router::new().route(
        "/model/:model_id/converse-stream",
        post(move |body: String| {
            let cap = cap.clone();
            async move {
                *cap.lock().expect("lock captured request") = serde_json::from_str(&body).ok();
                match response {
                    StubResponse::Events(lines) => (StatusCode::OK, lines.to_string()),
                    StubResponse::Failure => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "model exploded".to_string(),
                    ),
                }
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub provider");
    let port = listener.local_addr().expect("local_addr").port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (port, captured)
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

/// Start the gateway pointed at the stub provider; waits until healthy.
async fn start_gateway(provider_port: u16) -> u16 {
    let port = free_port();
    let mut config = Config::default();
    config.gateway.port = port;
    config.gateway.bind = "127.0.0.1".to_string();
    config.inference.endpoint = Some(format!("http://127.0.0.1:{}", provider_port));

    tokio::spawn(async move {
        let _ = gateway::run_gateway(config).await;
    });

    let url = format!("http://127.0.0.1:{}/", port);
    let client = reqwest::Client::new();
    for _ in 0..100 {
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return port;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("gateway on port {} did not become healthy within 5s", port);
}

/// POST an invocation event and return the raw response bytes.
async fn invoke(port: u16, event_json: String) -> Vec<u8> {
    let client = reqwest::Client::new();
    let res = client
        .post(format!("http://127.0.0.1:{}/invoke", port))
        .body(event_json)
        .send()
        .await
        .expect("invoke request");
    assert!(res.status().is_success());
    res.bytes().await.expect("read streamed body").to_vec()
}

/// Split the response into (control record, payload after the delimiter),
/// asserting the delimiter is exactly eight NUL bytes.
fn split_protocol(bytes: &[u8]) -> (serde_json::Value, String) {
    let nul = bytes
        .iter()
        .position(|&b| b == 0)
        .expect("delimiter present");
    let control: serde_json::Value =
        serde_json::from_slice(&bytes[..nul]).expect("control record is JSON");
    assert_eq!(&bytes[nul..nul + 8], &[0u8; 8], "eight NUL delimiter bytes");
    let payload = std::str::from_utf8(&bytes[nul + 8..])
        .expect("payload is UTF-8")
        .to_string();
    (control, payload)
}

#[tokio::test]
async fn invoke_streams_the_platform_protocol() {
    let (provider_port, captured) = start_stub_provider(StubResponse::Events(STUB_EVENTS)).await;
    let port = start_gateway(provider_port).await;

    let inner = serde_json::json!({ "message": "Explain retries" }).to_string();
    let event = serde_json::json!({ "body": inner, "isBase64Encoded": false }).to_string();
    let bytes = invoke(port, event).await;

    let (control, payload) = split_protocol(&bytes);
    assert_eq!(control.get("statusCode").and_then(|v| v.as_u64()), Some(200));
    assert_eq!(
        control
            .pointer("/headers/content-type")
            .and_then(|v| v.as_str()),
        Some("text/event-stream; charset=utf-8")
    );
    assert_eq!(
        control
            .pointer("/headers/cache-control")
            .and_then(|v| v.as_str()),
        Some("no-cache, no-transform")
    );
    assert_eq!(
        control.pointer("/headers/connection").and_then(|v| v.as_str()),
        Some("keep-alive")
    );
    assert_eq!(
        control
            .pointer("/headers/access-control-allow-origin")
            .and_then(|v| v.as_str()),
        Some("*")
    );
    assert_eq!(
        payload,
        "data: Sure\n\ndata: , \n\ndata: retries...\n\ndata: [DONE]\n\n"
    );

    // the provider saw the message verbatim with the static generation parameters
    let request = captured
        .lock()
        .expect("lock captured request")
        .clone()
        .expect("provider received a request");
    assert_eq!(
        request.pointer("/messages/0/role").and_then(|v| v.as_str()),
        Some("user")
    );
    assert_eq!(
        request
            .pointer("/messages/0/content/0/text")
            .and_then(|v| v.as_str()),
        Some("Explain retries")
    );
    assert_eq!(
        request
            .pointer("/inferenceConfig/maxTokens")
            .and_then(|v| v.as_u64()),
        Some(1200)
    );
    let temperature = request
        .pointer("/inferenceConfig/temperature")
        .and_then(|v| v.as_f64())
        .expect("temperature present");
    assert!((temperature - 0.7).abs() < 1e-6);
}

#[tokio::test]
async fn base64_event_body_is_decoded_before_parsing() {
    let (provider_port, captured) = start_stub_provider(StubResponse::Events(STUB_EVENTS)).await;
    let port = start_gateway(provider_port).await;

    // base64 of {"message":"hola"}
    let event = serde_json::json!({
        "body": "eyJtZXNzYWdlIjoiaG9sYSJ9",
        "isBase64Encoded": true,
    })
    .to_string();
    let bytes = invoke(port, event).await;

    let (_, payload) = split_protocol(&bytes);
    assert!(payload.ends_with("data: [DONE]\n\n"));

    let request = captured
        .lock()
        .expect("lock captured request")
        .clone()
        .expect("provider received a request");
    assert_eq!(
        request
            .pointer("/messages/0/content/0/text")
            .and_then(|v| v.as_str()),
        Some("hola")
    );
}

#[tokio::test]
async fn unparsable_event_falls_back_to_the_default_message() {
    let (provider_port, captured) = start_stub_provider(StubResponse::Events(STUB_EVENTS)).await;
    let port = start_gateway(provider_port).await;

    let bytes = invoke(port, "!!! not an event !!!".to_string()).await;

    let (_, payload) = split_protocol(&bytes);
    assert!(payload.ends_with("data: [DONE]\n\n"));

    let request = captured
        .lock()
        .expect("lock captured request")
        .clone()
        .expect("provider received a request");
    assert_eq!(
        request
            .pointer("/messages/0/content/0/text")
            .and_then(|v| v.as_str()),
        Some("hello streaming")
    );
}

#[tokio::test]
async fn provider_failure_ends_the_stream_with_one_error_frame() {
    let (provider_port, _captured) = start_stub_provider(StubResponse::Failure).await;
    let port = start_gateway(provider_port).await;

    let inner = serde_json::json!({ "message": "boom" }).to_string();
    let event = serde_json::json!({ "body": inner, "isBase64Encoded": false }).to_string();
    let bytes = invoke(port, event).await;

    let (control, payload) = split_protocol(&bytes);
    // status and headers were committed before the failure
    assert_eq!(control.get("statusCode").and_then(|v| v.as_u64()), Some(200));
    assert!(payload.starts_with("data: [ERROR] "), "got: {}", payload);
    assert!(payload.ends_with("\n\n"));
    assert!(payload.contains("500"));
    assert!(!payload.contains("[DONE]"));
    assert_eq!(payload.matches("data: ").count(), 1);
}

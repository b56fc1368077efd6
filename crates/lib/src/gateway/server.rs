//! Gateway HTTP server.
//!
//! One route does the work: POST /invoke accepts a platform invocation event
//! and streams back the raw platform response protocol (control record, NUL
//! delimiter, SSE frames). The relay runs on its own task and writes into a
//! bounded channel; the receiver side is the response body, so backpressure
//! from a slow client suspends the relay.

use crate::config::{self, Config};
use crate::event::InvocationEvent;
use crate::llm::BedrockClient;
use crate::relay::{relay_invocation, RelayParams};
use crate::sink::ChannelSink;
use anyhow::{Context, Result};
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::StreamExt;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;

/// Buffered response chunks before the relay suspends on a slow reader.
const SINK_CAPACITY: usize = 32;

/// Shared state for the gateway (config, provider client, call parameters).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub bedrock: BedrockClient,
    /// Model id and generation parameters, resolved once at startup.
    pub relay_params: RelayParams,
}

/// Run the gateway; binds to config.gateway.bind:config.gateway.port.
/// Blocks until shutdown (Ctrl+C or SIGTERM).
pub async fn run_gateway(config: Config) -> Result<()> {
    let endpoint = config::resolve_endpoint(&config);
    let bearer_token = config::resolve_bearer_token(&config);
    let relay_params = RelayParams {
        model_id: config::resolve_model_id(&config),
        inference: config::inference_config(&config),
    };
    log::info!(
        "relaying to {} (model {})",
        endpoint,
        relay_params.model_id
    );

    let bind = config.gateway.bind.trim().to_string();
    let port = config.gateway.port;
    let state = GatewayState {
        config: Arc::new(config),
        bedrock: BedrockClient::new(endpoint, bearer_token),
        relay_params,
    };

    let app = Router::new()
        .route("/", get(health_http))
        .route("/invoke", post(invoke_http))
        .with_state(state);

    let bind_addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "model": state.relay_params.model_id,
        "port": state.config.gateway.port,
    }))
}

/// POST /invoke: platform invocation event in, streaming protocol bytes out.
/// Unparsable input degrades to the empty event (the body field gets the same
/// leniency inside the relay). The relay reports its own failures in-band
/// after the committed control record, so the outer response is always 200.
async fn invoke_http(State(state): State<GatewayState>, body: Bytes) -> Response {
    let event: InvocationEvent = serde_json::from_slice(&body).unwrap_or_default();
    let (mut sink, rx) = ChannelSink::new(SINK_CAPACITY);

    tokio::spawn(async move {
        let _ = relay_invocation(&state.bedrock, &state.relay_params, &event, &mut sink).await;
    });

    let stream = ReceiverStream::new(rx).map(Ok::<Bytes, Infallible>);
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/octet-stream")],
        Body::from_stream(stream),
    )
        .into_response()
}

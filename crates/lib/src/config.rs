//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.relai/config.json`) and
//! environment. Environment variables win over the file; every value has a
//! deployable default, so a missing file is not an error.

use crate::llm::InferenceConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Region used when neither environment nor config name one.
const DEFAULT_REGION: &str = "eu-central-1";

/// Model used when neither environment nor config name one.
const DEFAULT_MODEL_ID: &str = "amazon.nova-lite-v1:0";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Inference endpoint and generation parameters.
    #[serde(default)]
    pub inference: InferenceSettings,
}

/// Gateway bind and port settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// HTTP port (default 15190).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    15190
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Inference endpoint and generation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceSettings {
    /// Region used to derive the runtime endpoint. Overridden by
    /// BEDROCK_REGION, AWS_REGION, or AWS_DEFAULT_REGION.
    pub region: Option<String>,

    /// Model identifier. Overridden by BEDROCK_MODEL_ID.
    pub model_id: Option<String>,

    /// Full endpoint override (e.g. a local stub). Overridden by
    /// BEDROCK_ENDPOINT. When unset, the endpoint is derived from the region.
    pub endpoint: Option<String>,

    /// Bearer token for the managed API. Overridden by
    /// AWS_BEARER_TOKEN_BEDROCK. Requests are sent unauthenticated when
    /// absent (locally proxied or pre-signed deployments).
    pub bearer_token: Option<String>,

    /// Maximum output tokens per response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Nucleus sampling parameter.
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

fn default_max_tokens() -> u32 {
    1200
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.9
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            region: None,
            model_id: None,
            endpoint: None,
            bearer_token: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
        }
    }
}

/// First candidate with non-whitespace content, trimmed.
fn first_non_empty(candidates: impl IntoIterator<Item = Option<String>>) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Resolve the region: BEDROCK_REGION, then the platform region variables,
/// then config, then the fixed default.
pub fn resolve_region(config: &Config) -> String {
    first_non_empty([
        env_value("BEDROCK_REGION"),
        env_value("AWS_REGION"),
        env_value("AWS_DEFAULT_REGION"),
        config.inference.region.clone(),
    ])
    .unwrap_or_else(|| DEFAULT_REGION.to_string())
}

/// Resolve the model id: BEDROCK_MODEL_ID overrides config; falls back to
/// the default model.
pub fn resolve_model_id(config: &Config) -> String {
    first_non_empty([
        env_value("BEDROCK_MODEL_ID"),
        config.inference.model_id.clone(),
    ])
    .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string())
}

/// Resolve the bearer token: AWS_BEARER_TOKEN_BEDROCK overrides config.
pub fn resolve_bearer_token(config: &Config) -> Option<String> {
    first_non_empty([
        env_value("AWS_BEARER_TOKEN_BEDROCK"),
        config.inference.bearer_token.clone(),
    ])
}

/// Runtime endpoint for a region.
fn runtime_endpoint(region: &str) -> String {
    format!("https://bedrock-runtime.{}.amazonaws.com", region)
}

/// Resolve the endpoint: BEDROCK_ENDPOINT overrides config; otherwise derived
/// from the resolved region.
pub fn resolve_endpoint(config: &Config) -> String {
    first_non_empty([
        env_value("BEDROCK_ENDPOINT"),
        config.inference.endpoint.clone(),
    ])
    .unwrap_or_else(|| runtime_endpoint(&resolve_region(config)))
}

/// Generation parameters for the outbound Converse call.
pub fn inference_config(config: &Config) -> InferenceConfig {
    InferenceConfig {
        max_tokens: config.inference.max_tokens,
        temperature: Some(config.inference.temperature),
        top_p: Some(config.inference.top_p),
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RELAI_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".relai").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the default path (or RELAI_CONFIG_PATH). Missing file
/// means default config.
pub fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(default_config_path);
    if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        return Ok(Config::default());
    }
    let s = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parsing config from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gateway_port_and_bind() {
        let g = GatewayConfig::default();
        assert_eq!(g.port, 15190);
        assert_eq!(g.bind, "127.0.0.1");
    }

    #[test]
    fn default_generation_parameters() {
        let s = InferenceSettings::default();
        assert_eq!(s.max_tokens, 1200);
        assert_eq!(s.temperature, 0.7);
        assert_eq!(s.top_p, 0.9);
    }

    #[test]
    fn first_non_empty_skips_absent_and_blank() {
        assert_eq!(
            first_non_empty([None, Some("   ".to_string()), Some(" a ".to_string())]),
            Some("a".to_string())
        );
        assert_eq!(first_non_empty([None, Some(String::new())]), None);
    }

    #[test]
    fn runtime_endpoint_uses_region() {
        assert_eq!(
            runtime_endpoint("eu-central-1"),
            "https://bedrock-runtime.eu-central-1.amazonaws.com"
        );
    }

    #[test]
    fn config_json_parses_with_partial_fields() {
        let config: Config =
            serde_json::from_str(r#"{"inference":{"modelId":"amazon.nova-pro-v1:0"}}"#).unwrap();
        assert_eq!(
            config.inference.model_id.as_deref(),
            Some("amazon.nova-pro-v1:0")
        );
        assert_eq!(config.inference.max_tokens, 1200);
        assert_eq!(config.gateway.port, 15190);
    }

    #[test]
    fn inference_config_carries_configured_parameters() {
        let mut config = Config::default();
        config.inference.max_tokens = 64;
        let ic = inference_config(&config);
        assert_eq!(ic.max_tokens, 64);
        assert_eq!(ic.temperature, Some(0.7));
        assert_eq!(ic.top_p, Some(0.9));
    }
}

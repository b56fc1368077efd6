//! LLM provider client.
//!
//! Streaming Converse client for Bedrock-style managed inference endpoints.

mod bedrock;

pub use bedrock::{
    BedrockClient, BedrockError, ContentBlock, ConverseMessage, ConverseStream,
    ConverseStreamEvent, InferenceConfig,
};

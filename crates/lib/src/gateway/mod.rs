//! Gateway: HTTP front for the streaming relay.
//!
//! POST /invoke takes a platform invocation event and answers with the raw
//! streaming-response protocol bytes. GET / is a health probe.

mod server;

pub use server::run_gateway;

//! The seam between the engines and the generation endpoint.
//!
//! Engines only ever see [`LlmTransport`]; [`HttpTransport`] is the production
//! implementation and tests substitute in-process stubs.

pub mod http;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub use http::HttpTransport;

/// One non-streaming completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f64,
    pub top_p: Option<f64>,
    /// JSON schema the reply must conform to, when the endpoint supports it.
    pub response_schema: Option<Value>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
}

#[async_trait]
pub trait LlmTransport: Send + Sync {
    /// Issue a single completion and return the raw model text.
    ///
    /// Failures are reported as `UpstreamTimeout`, `UpstreamUnavailable` or
    /// `UpstreamError`; interpreting the text is the caller's job.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;
}

//! Language-model collaborator seam.
//!
//! The pipeline talks to the model through the `LlmClient` trait so the
//! engine can run against a real Ollama endpoint in production and scripted
//! fakes in tests. The wire types match Ollama's `/api/chat` contract.

use crate::error::PipelineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// LLM endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// How long the model stays loaded after a request ("5m", "0", "1h").
    #[serde(default = "default_keep_alive")]
    pub keep_alive: String,
    /// Total attempts per call, first try included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff before the first retry; doubles per attempt.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_model() -> String {
    "qwen3:8b".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_keep_alive() -> String {
    "5m".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            keep_alive: default_keep_alive(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

/// The only suspension point in the pipeline.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send one prompt pair and return the raw completion text.
    ///
    /// Implementations classify transport failures as `ServiceUnavailable`
    /// or `RateLimited` and retry internally up to their configured bound;
    /// an error returned here is already final for the call.
    async fn complete(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, PipelineError>;

    /// Model identifier for traceability, if known.
    fn model_name(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaChatRequest {
    pub model: String,
    pub messages: Vec<OllamaMessage>,
    pub stream: bool,
    /// "json" forces JSON-mode completions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaChatResponse {
    pub message: OllamaMessage,
}

/// Extract the JSON object from a completion that may wrap it in prose or
/// a markdown fence.
pub fn extract_json(text: &str) -> &str {
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return &text[start..=end];
        }
    }
    text
}

//! Ollama LLM client.
//!
//! Thin HTTP client over `/api/chat` with JSON-mode forcing and a keep_alive
//! knob so the model can be unloaded between queries. Transport failures are
//! classified as retryable (`ServiceUnavailable` / `RateLimited`) and retried
//! with exponential backoff up to the configured attempt bound; whatever
//! comes out of `complete` is final for the call.

use async_trait::async_trait;
use eval_common::{
    LlmClient, LlmConfig, OllamaChatRequest, OllamaChatResponse, OllamaMessage, PipelineError,
};
use std::time::Duration;
use tracing::{info, warn};

pub struct OllamaClient {
    http_client: reqwest::Client,
    config: LlmConfig,
}

impl OllamaClient {
    pub fn new(config: LlmConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            http_client,
            config,
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// One raw call, no retries.
    async fn call_once(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, PipelineError> {
        let url = format!("{}/api/chat", self.config.endpoint);

        let request = OllamaChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                OllamaMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                OllamaMessage {
                    role: "user".to_string(),
                    content: user_prompt.to_string(),
                },
            ],
            stream: false,
            format: Some("json".to_string()),
            keep_alive: Some(self.config.keep_alive.clone()),
        };

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    PipelineError::ServiceUnavailable(e.to_string())
                } else {
                    PipelineError::ServiceUnavailable(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::RateLimited(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::ServiceUnavailable(format!(
                "ollama returned {status}: {body}"
            )));
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::MalformedReply(e.to_string()))?;

        Ok(chat_response.message.content)
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, PipelineError> {
        let mut backoff = Duration::from_millis(self.config.initial_backoff_ms);
        let mut last_err = None;

        for attempt in 1..=self.config.max_attempts {
            info!(
                model = %self.config.model,
                attempt,
                prompt_chars = user_prompt.len(),
                "llm call"
            );
            match self.call_once(system_prompt, user_prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.config.max_attempts => {
                    warn!(error = %e, attempt, "retryable llm failure, backing off");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err
            .unwrap_or_else(|| PipelineError::ServiceUnavailable("no attempts made".to_string())))
    }

    fn model_name(&self) -> Option<String> {
        Some(self.config.model.clone())
    }
}

impl OllamaClient {
    /// Liveness probe against `/api/tags`. A reachable endpoint that
    /// answers with an error status still counts as unavailable.
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.config.endpoint);
        match self.http_client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

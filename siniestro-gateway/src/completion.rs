//! Completion collaborator client.
//!
//! Speaks the OpenAI-compatible chat completions protocol: the full ordered
//! session history is replayed as role-tagged messages alongside a model
//! identifier, and the first choice's content becomes the assistant reply.

use crate::session::ChatMessage;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use siniestro_common::config::CompletionConfig;
use siniestro_common::{Error, Result};
use std::time::{Duration, Instant};

/// Client for the chat completions endpoint.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl CompletionClient {
    /// Build a client from the completion settings.
    ///
    /// When an API key is configured it is sent as a bearer token on every
    /// request.
    pub fn new(config: &CompletionConfig) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(ref key) = config.api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", key))
                    .unwrap_or_else(|_| HeaderValue::from_static("")),
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
        }
    }

    /// Request one completion for the given history.
    ///
    /// `model` overrides the configured default for this call only.
    pub async fn complete(&self, history: &[ChatMessage], model: Option<&str>) -> Result<String> {
        let start = Instant::now();
        let model = model.unwrap_or(&self.model);

        let request = CompletionRequest {
            model,
            messages: history,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Completion request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "Completion endpoint returned {}: {}",
                status, body
            )));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("Failed to parse completion response: {}", e)))?;

        let latency_ms = start.elapsed().as_millis() as u64;
        if let Some(usage) = &completion.usage {
            tracing::debug!(
                model = %model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                latency_ms = latency_ms,
                "Completion received"
            );
        } else {
            tracing::debug!(model = %model, latency_ms = latency_ms, "Completion received");
        }

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| Error::Upstream("Completion endpoint returned no choices".to_string()))
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    #[serde(default)]
    #[allow(dead_code)]
    total_tokens: u32,
}

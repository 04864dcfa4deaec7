//! Remote instructions source.
//!
//! The system prompt seeding every session lives in an external plain-text
//! document. It is fetched once at process start and again on every reload;
//! between fetches the last successful content stays in effect.

use siniestro_common::{Error, Result};
use std::time::Duration;

/// Client for the plain-text instructions endpoint.
#[derive(Debug)]
pub struct InstructionsClient {
    client: reqwest::Client,
    url: String,
}

impl InstructionsClient {
    /// Create a client for the given instructions URL.
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            url: url.into(),
        }
    }

    /// Fetch the current instructions text.
    pub async fn fetch(&self) -> Result<String> {
        tracing::debug!(url = %self.url, "Fetching instructions");

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Instructions request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "Instructions endpoint returned {}: {}",
                status, body
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| Error::Upstream(format!("Failed to read instructions body: {}", e)))?;

        Ok(text.trim().to_string())
    }
}

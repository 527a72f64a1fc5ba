#[cfg(test)]
mod tests;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{EmbeddingProvider, ProviderError};
use crate::config::OllamaConfig;

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Blocking client for the Ollama embedding API.
///
/// Every call goes through [`OllamaClient::with_retry`]: server errors and
/// transport failures back off exponentially, client errors fail at once.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    batch_size: usize,
    expected_dimension: usize,
    agent: ureq::Agent,
    retry_attempts: u32,
    retry_base_delay: Duration,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

enum Attempt {
    Retry,
    GiveUp,
}

fn classify(error: &ureq::Error) -> Attempt {
    match error {
        ureq::Error::StatusCode(status) if *status >= 500 => Attempt::Retry,
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => Attempt::Retry,
        _ => Attempt::GiveUp,
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// `nomic-embed-text` and `nomic-embed-text:latest` name the same model
fn same_model(installed: &str, configured: &str) -> bool {
    let strip = |name: &str| name.strip_suffix(":latest").unwrap_or(name).to_string();
    strip(installed) == strip(configured)
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .context("Failed to build Ollama URL from config")?;

        Ok(Self {
            base_url,
            model: config.model.clone(),
            batch_size: (config.batch_size as usize).max(1),
            expected_dimension: config.embedding_dimension as usize,
            agent: build_agent(REQUEST_TIMEOUT),
            retry_attempts: RETRY_ATTEMPTS,
            retry_base_delay: RETRY_BASE_DELAY,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    #[inline]
    pub fn with_retry_delay(mut self, base_delay: Duration) -> Self {
        self.retry_base_delay = base_delay;
        self
    }

    /// Check that the server answers and has the configured model installed
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        let models = self.list_models().context("Ollama server is not reachable")?;

        if !models.iter().any(|name| same_model(name, &self.model)) {
            warn!("Model {} not installed; found {:?}", self.model, models);
            return Err(anyhow!(
                "Model '{}' is not installed. Run 'ollama pull {}'",
                self.model,
                self.model
            ));
        }

        info!("Ollama at {} is serving {}", self.base_url, self.model);
        Ok(())
    }

    #[inline]
    pub fn ping(&self) -> Result<()> {
        let url = self.endpoint("/api/version")?;
        self.with_retry(|| {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .map(|_| ())
    }

    /// Names of the models installed on the server
    #[inline]
    pub fn list_models(&self) -> Result<Vec<String>> {
        let url = self.endpoint("/api/tags")?;
        let body = self.with_retry(|| {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let tags: TagsResponse =
            serde_json::from_str(&body).context("Failed to parse model list")?;
        Ok(tags.models.into_iter().map(|tag| tag.name).collect())
    }

    /// Embed one text
    #[inline]
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.request(&[text.to_string()])?;
        embeddings
            .pop()
            .ok_or_else(|| anyhow!("Ollama returned no embedding"))
    }

    /// Embed several texts, `batch_size` inputs per request
    #[inline]
    pub fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let batch_embeddings = self
                .request(batch)
                .with_context(|| format!("Failed to embed batch of {} texts", batch.len()))?;
            embeddings.extend(batch_embeddings);
        }
        debug!("Embedded {} texts with {}", embeddings.len(), self.model);
        Ok(embeddings)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Invalid Ollama endpoint {}", path))
    }

    fn request(&self, input: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = self.endpoint("/api/embed")?;
        let body = serde_json::to_string(&EmbedRequest {
            model: &self.model,
            input,
        })?;

        let response = self.with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&body)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let parsed: EmbedResponse =
            serde_json::from_str(&response).context("Failed to parse embedding response")?;
        if parsed.embeddings.len() != input.len() {
            return Err(anyhow!(
                "Sent {} inputs but received {} embeddings",
                input.len(),
                parsed.embeddings.len()
            ));
        }

        if let Some(actual) = parsed.embeddings.first().map(Vec::len)
            && actual != self.expected_dimension
        {
            warn!(
                "{} returned {} dimensions, config says {}",
                self.model, actual, self.expected_dimension
            );
        }

        Ok(parsed.embeddings)
    }

    fn with_retry<F>(&self, mut call: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut delay = self.retry_base_delay;
        let mut attempt = 1;
        loop {
            let error = match call() {
                Ok(body) => return Ok(body),
                Err(error) => error,
            };

            match classify(&error) {
                Attempt::GiveUp => {
                    return Err(anyhow!("Ollama request failed: {}", error));
                }
                Attempt::Retry if attempt >= self.retry_attempts => {
                    error!(
                        "Ollama request to {} failed after {} attempts: {}",
                        self.base_url, attempt, error
                    );
                    return Err(anyhow!(
                        "Ollama request failed after {} attempts: {}",
                        attempt,
                        error
                    ));
                }
                Attempt::Retry => {
                    warn!(
                        "Ollama request failed ({}), retrying in {:?} [{}/{}]",
                        error, delay, attempt, self.retry_attempts
                    );
                    std::thread::sleep(delay);
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    #[inline]
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let client = self.clone();
        let text = text.to_string();

        let embedding = tokio::task::spawn_blocking(move || client.embed_text(&text))
            .await
            .map_err(|e| ProviderError::Request(format!("embedding task failed: {}", e)))?
            .map_err(|e| ProviderError::Request(format!("{:#}", e)))?;

        if embedding.is_empty() {
            return Err(ProviderError::EmptyEmbedding);
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(ProviderError::InvalidResponse(
                "embedding contains non-finite values".to_string(),
            ));
        }

        Ok(embedding)
    }

    #[inline]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let client = self.clone();
        let texts = texts.to_vec();

        let embeddings = tokio::task::spawn_blocking(move || client.embed_texts(&texts))
            .await
            .map_err(|e| ProviderError::Request(format!("embedding task failed: {}", e)))?
            .map_err(|e| ProviderError::Request(format!("{:#}", e)))?;

        if embeddings.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ProviderError::InvalidResponse(
                "embedding contains non-finite values".to_string(),
            ));
        }

        Ok(embeddings)
    }

    #[inline]
    fn model_name(&self) -> &str {
        &self.model
    }
}

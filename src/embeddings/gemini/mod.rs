
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::embeddings::retry::RetryPolicy;
use crate::embeddings::{Embedder, TaskType};
use crate::{RagError, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Blocking client for the Gemini embedding API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    base_url: Url,
    model: String,
    api_key: String,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct ContentPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest {
    model: String,
    content: Content,
    task_type: &'static str,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedContentRequest>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<EmbeddingValues>,
}

impl GeminiClient {
    /// Create a client from configuration, reading the API key from the
    /// environment.
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config
            .gemini
            .api_key()
            .map_err(|e| RagError::Config(e.to_string()))?;
        Self::with_api_key(config, api_key)
    }

    #[inline]
    pub fn with_api_key(config: &Config, api_key: String) -> Result<Self> {
        let base_url = config
            .gemini
            .api_base_url()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.gemini.model.clone(),
            api_key,
            agent,
            retry: RetryPolicy::from(&config.retry),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    /// Generate an embedding for a single text input
    #[inline]
    pub fn embed_content(&self, text: &str, task: TaskType) -> Result<Vec<f32>> {
        debug!(
            "Generating {} embedding for text (length: {})",
            task.as_api_str(),
            text.len()
        );

        let request = self.build_request(text, task);
        let request_json = serde_json::to_string(&request)
            .context("Failed to serialize embedding request")?;

        let url = self.endpoint_url("embedContent")?;
        let response_text = self.post_with_retry("embedding request", &url, &request_json)?;

        let response: EmbedContentResponse = serde_json::from_str(&response_text)
            .context("Failed to parse embedding response")?;

        debug!(
            "Generated embedding with {} dimensions",
            response.embedding.values.len()
        );

        Ok(response.embedding.values)
    }

    /// Generate embeddings for multiple text inputs in one batch call
    #[inline]
    pub fn batch_embed_contents(&self, texts: &[String], task: TaskType) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Generating {} embeddings for batch of {} texts",
            task.as_api_str(),
            texts.len()
        );

        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| self.build_request(text, task))
                .collect(),
        };
        let request_json = serde_json::to_string(&request)
            .context("Failed to serialize batch embedding request")?;

        let url = self.endpoint_url("batchEmbedContents")?;
        let response_text = self.post_with_retry("batch embedding request", &url, &request_json)?;

        parse_batch_response(&response_text, texts.len())
    }

    fn build_request(&self, text: &str, task: TaskType) -> EmbedContentRequest {
        EmbedContentRequest {
            model: format!("models/{}", self.model),
            content: Content {
                parts: vec![ContentPart {
                    text: text.to_string(),
                }],
            },
            task_type: task.as_api_str(),
        }
    }

    fn endpoint_url(&self, method: &str) -> Result<Url> {
        self.base_url
            .join(&format!("models/{}:{}", self.model, method))
            .map_err(|e| RagError::Embedding(format!("Failed to build endpoint URL: {e}")))
    }

    fn post_with_retry(&self, what: &str, url: &Url, body: &str) -> Result<String> {
        self.retry.run(what, || {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .header("x-goog-api-key", &self.api_key)
                .send(body)
                .and_then(|mut resp| resp.body_mut().read_to_string())
                .map_err(|e| RagError::Embedding(format!("Request failed: {e}")))
        })
    }
}

fn parse_batch_response(body: &str, expected: usize) -> Result<Vec<Vec<f32>>> {
    let response: BatchEmbedResponse =
        serde_json::from_str(body).context("Failed to parse batch embedding response")?;

    if response.embeddings.len() != expected {
        return Err(RagError::Embedding(format!(
            "Mismatch between request and response counts: {} vs {}",
            expected,
            response.embeddings.len()
        )));
    }

    Ok(response
        .embeddings
        .into_iter()
        .map(|embedding| embedding.values)
        .collect())
}

impl Embedder for GeminiClient {
    #[inline]
    fn embed(&self, text: &str, task: TaskType) -> Result<Vec<f32>> {
        self.embed_content(text, task)
    }

    #[inline]
    fn embed_batch(&self, texts: &[String], task: TaskType) -> Result<Vec<Vec<f32>>> {
        self.batch_embed_contents(texts, task)
    }
}

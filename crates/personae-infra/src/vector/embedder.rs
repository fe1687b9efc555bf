//! HTTP embedding client for OpenAI-compatible `/embeddings` endpoints.
//!
//! Implements the `Embedder` trait from `personae-core`. Mistral's
//! `mistral-embed` is the default model; any server exposing the same
//! request and response shape works through `base_url`.
//!
//! - Endpoint: `POST {base_url}/embeddings`
//! - Body: `{ model, input: ["text1", ...] }`
//! - Response: `{ data: [{ embedding, index }], ... }`

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use personae_core::rag::embedder::Embedder;
use personae_types::config::EmbeddingConfig;
use personae_types::error::IndexError;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Embedding client over reqwest.
///
/// Does NOT derive Debug: it holds the API key.
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    dimension: usize,
}

impl HttpEmbedder {
    /// `request_timeout` bounds each embedding call end to end.
    pub fn new(
        config: &EmbeddingConfig,
        api_key: Option<SecretString>,
        request_timeout: Duration,
    ) -> Result<Self, IndexError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| IndexError::EmbeddingUnavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            dimension: config.dimension,
        })
    }

    fn extract(&self, mut response: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>, IndexError> {
        if response.data.len() != expected {
            return Err(IndexError::EmbeddingUnavailable(format!(
                "expected {expected} embeddings, got {}",
                response.data.len()
            )));
        }
        // Sort by index to preserve input order
        response.data.sort_by_key(|d| d.index);

        let vectors: Vec<Vec<f32>> = response.data.into_iter().map(|d| d.embedding).collect();
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(IndexError::EmbeddingUnavailable(format!(
                "model {} returned {} dimensions, configured for {}",
                self.model,
                bad.len(),
                self.dimension
            )));
        }
        Ok(vectors)
    }
}

fn map_reqwest_error(endpoint: &str, err: reqwest::Error) -> IndexError {
    if err.is_connect() {
        IndexError::EmbeddingUnavailable(format!("cannot connect to {endpoint}: {err}"))
    } else if err.is_timeout() {
        IndexError::EmbeddingUnavailable(format!("request to {endpoint} timed out"))
    } else {
        IndexError::EmbeddingUnavailable(err.to_string())
    }
}

impl Embedder for HttpEmbedder {
    #[tracing::instrument(name = "embedding.embed", skip(self, texts), fields(model = %self.model, count = texts.len()))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self.client.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_reqwest_error(&self.endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "embedding request rejected");
            return Err(IndexError::EmbeddingUnavailable(format!(
                "HTTP {}: {body}",
                status.as_u16()
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| IndexError::EmbeddingUnavailable(format!("failed to parse embedding response: {e}")))?;

        self.extract(parsed, texts.len())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

//! Embedding providers.
//!
//! [`EmbeddingProvider`] is the seam between the indexer and whatever model
//! serves vectors; [`OpenAiEmbedder`] talks to any OpenAI-compatible
//! `/embeddings` endpoint.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use certcorpus_shared::{CorpusError, EmbeddingConfig, Result};

const BASE_BACKOFF_MS: u64 = 500;

/// Exponential backoff: `base * 2^attempt`, capped at 64x the base so large
/// configured attempt counts cannot overflow the factor.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(BASE_BACKOFF_MS.saturating_mul(1 << attempt.min(6)))
}

/// A source of embedding vectors for chunk text.
pub trait EmbeddingProvider: Send + Sync {
    /// Identifier of the model producing the vectors, recorded per chunk.
    fn model_id(&self) -> &str;

    /// Embed a single chunk's text.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>>> + Send;
}

/// Client for an OpenAI-compatible embeddings API.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimensions: Option<usize>,
    max_attempts: u32,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| CorpusError::Embedding(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            dimensions: config.dimensions,
            max_attempts: config.max_attempts.max(1),
        })
    }

    async fn request_once(&self, text: &str) -> Result<Vec<f32>> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: text,
            dimensions: self.dimensions,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CorpusError::Embedding(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CorpusError::Embedding(format!(
                "embeddings API returned {status}: {detail}"
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| CorpusError::Embedding(format!("bad response body: {e}")))?;

        parsed.data.sort_by_key(|d| d.index);
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| CorpusError::Embedding("empty embeddings response".into()))
    }
}

impl EmbeddingProvider for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut attempt = 0;
        loop {
            match self.request_once(text).await {
                Ok(vector) => {
                    debug!(dims = vector.len(), "embedding received");
                    return Ok(vector);
                }
                Err(err) if attempt + 1 < self.max_attempts => {
                    let delay = backoff_delay(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "embedding request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str, max_attempts: u32) -> EmbeddingConfig {
        EmbeddingConfig {
            api_key_env: "CERTCORPUS_EMBED_API_KEY".into(),
            base_url: base_url.into(),
            model: "text-embedding-3-small".into(),
            dimensions: None,
            max_attempts,
        }
    }

    #[test]
    fn backoff_delay_is_capped() {
        assert_eq!(backoff_delay(0), Duration::from_millis(500));
        assert_eq!(backoff_delay(2), Duration::from_millis(2000));
        // The exponent saturates; huge attempt counts never overflow.
        assert_eq!(backoff_delay(200), backoff_delay(6));
    }

    #[tokio::test]
    async fn embeds_text_with_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "text-embedding-3-small",
                "input": "insertOne inserts a document"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"index": 0, "embedding": [0.25, -0.5, 0.125]}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new(&test_config(&server.uri(), 1), "sk-test".into())
            .expect("client");
        let vector = embedder
            .embed("insertOne inserts a document")
            .await
            .expect("embedding");
        assert_eq!(vector, vec![0.25, -0.5, 0.125]);
    }

    #[tokio::test]
    async fn retries_after_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"index": 0, "embedding": [1.0]}]
            })))
            .mount(&server)
            .await;

        let embedder =
            OpenAiEmbedder::new(&test_config(&server.uri(), 3), "sk-test".into()).expect("client");
        let vector = embedder.embed("retry me").await.expect("embedding");
        assert_eq!(vector, vec![1.0]);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_the_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(429))
            .expect(2)
            .mount(&server)
            .await;

        let embedder =
            OpenAiEmbedder::new(&test_config(&server.uri(), 2), "sk-test".into()).expect("client");
        let err = embedder.embed("never works").await.unwrap_err();
        assert!(err.to_string().contains("429"));
    }
}

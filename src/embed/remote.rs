//! Remote embedding provider: calls an OpenAI-compatible embeddings
//! endpoint. Batch size is capped by provider limits; oversized batches are
//! internally chunked and the results stitched back in order (§4.2).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{retry_embed, validate_nonempty, EmbeddingProvider};
use crate::error::{ErrorKind, RetrievalError, Result};

const DEFAULT_MAX_ATTEMPTS: u32 = 4;
const DEFAULT_PROVIDER_BATCH_LIMIT: usize = 256;

pub struct RemoteEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
    max_attempts: u32,
}

impl RemoteEmbeddingProvider {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, dimension: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| RetrievalError::config("building HTTP client for remote embedder").with_source(err))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: None,
            model: model.into(),
            dimension,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        })
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    async fn call(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut request = self.client.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.model,
            input: inputs,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(classify_transport_error)?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(RetrievalError::auth("remote embedding service rejected credentials"));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(RetrievalError::rate_limited("remote embedding service rate-limited the request"));
        }
        if status.is_server_error() {
            return Err(RetrievalError::new(ErrorKind::Connection)
                .with_message(format!("remote embedding service returned {status}")));
        }
        if !status.is_success() {
            return Err(RetrievalError::invalid_input(format!(
                "remote embedding service rejected request: {status}"
            )));
        }

        let body: EmbeddingResponse = response.json().await.map_err(|err| {
            RetrievalError::new(ErrorKind::Internal)
                .with_message("malformed response from remote embedding service")
                .with_source(err)
        })?;
        Ok(body.data.into_iter().map(|item| item.embedding).collect())
    }
}

fn classify_transport_error(err: reqwest::Error) -> RetrievalError {
    if err.is_timeout() {
        RetrievalError::timeout("remote embedding request timed out").with_source(err)
    } else if err.is_connect() {
        RetrievalError::connection("could not reach remote embedding service").with_source(err)
    } else {
        RetrievalError::new(ErrorKind::Internal).with_source(err)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        validate_nonempty(text)?;
        let inputs = vec![text.to_string()];
        retry_embed(self.max_attempts, || async {
            let mut vectors = self.call(&inputs).await?;
            vectors.pop().ok_or_else(|| RetrievalError::new(ErrorKind::Internal).with_message("empty embedding response"))
        })
        .await
    }

    async fn embed_batch(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>> {
        let capped = batch_size.min(DEFAULT_PROVIDER_BATCH_LIMIT).max(1);
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(capped) {
            for text in batch {
                validate_nonempty(text)?;
            }
            let owned: Vec<String> = batch.to_vec();
            let vectors = retry_embed_batch(self.max_attempts, || self.call(&owned)).await?;
            out.extend(vectors);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_identity(&self) -> &str {
        &self.model
    }
}

async fn retry_embed_batch<F, Fut>(max_attempts: u32, operation: F) -> Result<Vec<Vec<f32>>>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<Vec<Vec<f32>>>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(vectors) => return Ok(vectors),
            Err(err) if err.kind.is_retryable() && attempt < max_attempts => {
                let delay = err.kind.retry_delay().unwrap_or(Duration::from_millis(200));
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

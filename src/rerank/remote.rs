//! Remote reranker: calls a cross-encoder scoring endpoint with the
//! query paired against each candidate's content.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::Reranker;
use crate::error::{ErrorKind, RetrievalError, Result};
use crate::store::Hit;

pub struct RemoteReranker {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl RemoteReranker {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| RetrievalError::config("building HTTP client for remote reranker").with_source(err))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: None,
            model: model.into(),
        })
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

#[async_trait]
impl Reranker for RemoteReranker {
    async fn rerank(&self, query: &str, mut hits: Vec<Hit>, limit: usize) -> Result<Vec<Hit>> {
        if hits.is_empty() {
            return Ok(hits);
        }
        let documents: Vec<String> = hits.iter().map(|hit| hit.chunk.content.clone()).collect();
        let mut request = self.client.post(&self.endpoint).json(&RerankRequest {
            model: &self.model,
            query,
            documents: &documents,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(classify_transport_error)?;
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(RetrievalError::rate_limited("remote rerank service rate-limited the request"));
        }
        if !response.status().is_success() {
            return Err(RetrievalError::new(ErrorKind::Connection)
                .with_message(format!("remote rerank service returned {}", response.status())));
        }
        let body: RerankResponse = response
            .json()
            .await
            .map_err(|err| RetrievalError::internal("malformed rerank response").with_source(err))?;

        for result in body.results {
            if let Some(hit) = hits.get_mut(result.index) {
                hit.score = result.relevance_score;
            }
        }
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    fn model_identity(&self) -> &str {
        &self.model
    }
}

fn classify_transport_error(err: reqwest::Error) -> RetrievalError {
    if err.is_timeout() {
        RetrievalError::timeout("remote rerank request timed out").with_source(err)
    } else if err.is_connect() {
        RetrievalError::connection("could not reach remote rerank service").with_source(err)
    } else {
        RetrievalError::new(ErrorKind::Internal).with_source(err)
    }
}

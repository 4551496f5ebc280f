//! OpenAI-compatible embeddings over HTTP.
//!
//! Every request runs under a timeout. Rate limits, server errors, timeouts and connection
//! failures are retried with capped exponential backoff; once the attempt ceiling is reached
//! the batch fails with [`EmbeddingError::Exhausted`].

use crate::config::{ProviderConfig, RemoteConfig};
use crate::error::{ensure_dimension, EmbeddingError, Result};
use crate::provider::{EmbeddingProvider, ItemResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Output sizes of the hosted models we know about
const KNOWN_DIMENSIONS: &[(&str, usize)] = &[
    ("text-embedding-3-small", 1536),
    ("text-embedding-3-large", 3072),
    ("text-embedding-ada-002", 1536),
];

const ERROR_BODY_LIMIT: usize = 300;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EmbeddingResponse {
    pub data: Vec<EmbeddingData>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EmbeddingData {
    pub embedding: Vec<f32>,
    pub index: usize,
}

/// One request/response exchange with the embeddings endpoint.
///
/// Implementations classify failures: `RateLimited` and `Transient` are retried by the
/// provider, anything else is returned as is.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_embeddings(&self, request: &EmbeddingRequest) -> Result<EmbeddingResponse>;
}

pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|_| EmbeddingError::configuration("API key is not a valid header value"))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| EmbeddingError::configuration(format!("HTTP client setup failed: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_embeddings(&self, request: &EmbeddingRequest) -> Result<EmbeddingResponse> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(classify_reqwest)?;

        let status = response.status();
        if status.is_success() {
            return response.json().await.map_err(classify_reqwest);
        }

        let retry_after = parse_retry_after(response.headers());
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        Err(classify_status(status, retry_after, &body))
    }
}

fn classify_reqwest(err: reqwest::Error) -> EmbeddingError {
    if err.is_decode() {
        EmbeddingError::Fatal(format!("Malformed embeddings response: {err}"))
    } else if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        EmbeddingError::Transient(err.to_string())
    } else {
        EmbeddingError::Fatal(err.to_string())
    }
}

fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> EmbeddingError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return EmbeddingError::RateLimited { retry_after };
    }
    let body: String = body.chars().take(ERROR_BODY_LIMIT).collect();
    if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        EmbeddingError::Transient(format!("{status}: {body}"))
    } else {
        EmbeddingError::Fatal(format!("{status}: {body}"))
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Attempt ceiling and backoff schedule for one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RemoteConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Wait before the next attempt, after `failed` attempts have failed.
    ///
    /// A server-provided retry hint replaces the computed delay; both are capped.
    pub fn delay(&self, failed: u32, retry_after: Option<Duration>) -> Duration {
        let exponent = failed.saturating_sub(1).min(16);
        let computed = self.initial_backoff.saturating_mul(1u32 << exponent);
        retry_after.unwrap_or(computed).min(self.max_backoff)
    }
}

pub struct RemoteProvider {
    model: String,
    dimension: usize,
    requested_dimensions: Option<usize>,
    batch_size: usize,
    timeout: Duration,
    retry: RetryPolicy,
    transport: Arc<dyn Transport>,
    attempts: AtomicU64,
}

impl RemoteProvider {
    /// HTTP provider; fails when the API key variable is unset
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let api_key = config.remote.api_key()?;
        let transport =
            HttpTransport::new(&api_key, &config.remote.base_url, config.remote.timeout())?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Provider over a caller-supplied transport
    pub fn with_transport(config: &ProviderConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let model = config.model_id().trim().to_string();
        let dimension = config
            .remote
            .dimensions
            .or_else(|| known_dimension(&model))
            .ok_or_else(|| {
                EmbeddingError::configuration(format!(
                    "Unknown output dimension for remote model '{model}'; set [embedding.remote] dimensions"
                ))
            })?;

        Ok(Self {
            model,
            dimension,
            requested_dimensions: config.remote.dimensions,
            batch_size: config.batch_size(),
            timeout: config.remote.timeout(),
            retry: RetryPolicy::from_config(&config.remote),
            transport,
            attempts: AtomicU64::new(0),
        })
    }

    pub const fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    async fn send_with_retry(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: batch.to_vec(),
            dimensions: self.requested_dimensions,
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.attempts.fetch_add(1, Ordering::Relaxed);

            let outcome =
                match tokio::time::timeout(self.timeout, self.transport.post_embeddings(&request))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(EmbeddingError::Transient(format!(
                        "request timed out after {:?}",
                        self.timeout
                    ))),
                };

            let err = match outcome {
                Ok(response) => return into_vectors(response, batch.len()),
                Err(err) => err,
            };
            if !err.is_retryable() {
                return Err(err);
            }
            if attempt >= self.retry.max_attempts {
                return Err(EmbeddingError::Exhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = self.retry.delay(attempt, err.retry_after());
            log::warn!(
                "Embedding batch of {} failed (attempt {attempt}/{}): {err}; retrying in {delay:?}",
                batch.len(),
                self.retry.max_attempts
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn known_dimension(model: &str) -> Option<usize> {
    KNOWN_DIMENSIONS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(model))
        .map(|(_, dimension)| *dimension)
}

/// Response rows in input order; every index must appear exactly once
fn into_vectors(mut response: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    response.data.sort_by_key(|entry| entry.index);
    let in_order = response
        .data
        .iter()
        .enumerate()
        .all(|(position, entry)| entry.index == position);
    if response.data.len() != expected || !in_order {
        return Err(EmbeddingError::Fatal(format!(
            "Provider returned {} embeddings for {expected} inputs",
            response.data.len()
        )));
    }
    Ok(response
        .data
        .into_iter()
        .map(|entry| entry.embedding)
        .collect())
}

#[async_trait]
impl EmbeddingProvider for RemoteProvider {
    fn id(&self) -> String {
        format!("remote:{}", self.model)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_items(texts).await?.into_iter().collect()
    }

    async fn embed_items(&self, texts: &[String]) -> Result<Vec<ItemResult>> {
        let mut items = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size.max(1)) {
            let vectors = self.send_with_retry(batch).await?;
            items.extend(vectors.into_iter().map(|vector| -> ItemResult {
                ensure_dimension(&vector, self.dimension)?;
                Ok(vector)
            }));
        }
        Ok(items)
    }

    fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }
}

use crate::error::{EmbeddingStoreError, Result};
use crate::types::EMBEDDING_DIMENSION;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRIES: usize = 3;

/// Text-to-vector service. 1:1 input/output, fixed dimension.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingStoreError::Embedding("empty embedding batch".to_string()))
    }
}

/// Selects the embedding backend from `PANTRY_EMBEDDING_MODE`.
///
/// `openai` (the default) requires `PANTRY_OPENAI_API_KEY` and fails with a
/// configuration error when it is missing, before any store mutation is
/// attempted. `stub` is fully offline and deterministic.
pub fn embedder_from_env() -> Result<Arc<dyn Embedder>> {
    let mode = env::var("PANTRY_EMBEDDING_MODE")
        .unwrap_or_else(|_| "openai".to_string())
        .to_ascii_lowercase();
    match mode.as_str() {
        "stub" => Ok(Arc::new(StubEmbedder::new(EMBEDDING_DIMENSION))),
        "openai" => {
            let api_key = env::var("PANTRY_OPENAI_API_KEY").map_err(|_| {
                EmbeddingStoreError::Configuration(
                    "PANTRY_OPENAI_API_KEY is required when PANTRY_EMBEDDING_MODE=openai"
                        .to_string(),
                )
            })?;
            let base_url =
                env::var("PANTRY_OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
            let model =
                env::var("PANTRY_EMBED_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
            let embedder = OpenAiEmbedder::new(
                api_key,
                base_url,
                model,
                EMBEDDING_DIMENSION,
                DEFAULT_TIMEOUT,
                DEFAULT_MAX_RETRIES,
            )?;
            Ok(Arc::new(embedder))
        }
        other => Err(EmbeddingStoreError::Configuration(format!(
            "Unsupported PANTRY_EMBEDDING_MODE '{other}' (expected 'openai' or 'stub')"
        ))),
    }
}

/// Async embeddings client for OpenAI-compatible `/embeddings` endpoints.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimension: usize,
    max_retries: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        dimension: usize,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(EmbeddingStoreError::Configuration(
                "missing OpenAI API key".to_string(),
            ));
        }
        if model.trim().is_empty() {
            return Err(EmbeddingStoreError::Configuration(
                "missing embedding model name".to_string(),
            ));
        }
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).map_err(|_| {
                EmbeddingStoreError::Configuration("invalid OpenAI API key".to_string())
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| {
                EmbeddingStoreError::Configuration(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model,
            dimension,
            max_retries: max_retries.max(1),
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut attempt = 0usize;
        loop {
            let request = EmbeddingRequest {
                model: &self.model,
                input: texts,
                dimensions: self.dimension,
            };
            let response = self.client.post(&self.endpoint).json(&request).send().await;
            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let mut parsed: EmbeddingResponse = resp.json().await.map_err(|err| {
                            EmbeddingStoreError::Embedding(format!(
                                "failed to parse embedding response: {err}"
                            ))
                        })?;
                        parsed.data.sort_by_key(|entry| entry.index);
                        if parsed.data.len() != texts.len() {
                            return Err(EmbeddingStoreError::Embedding(format!(
                                "service returned {} embeddings for {} inputs",
                                parsed.data.len(),
                                texts.len()
                            )));
                        }
                        return Ok(parsed.data.into_iter().map(|e| e.embedding).collect());
                    }

                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(EmbeddingStoreError::Embedding(format!(
                        "embedding request failed ({status}): {body}"
                    )));
                }
                Err(err) => {
                    let retryable = err.is_timeout() || err.is_connect() || err.is_request();
                    if retryable && attempt + 1 < self.max_retries {
                        attempt += 1;
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(EmbeddingStoreError::Embedding(err.to_string()));
                }
            }
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(250 * (1 << capped))
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    dimensions: usize,
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

/// Deterministic offline embedder.
///
/// Hash-seeded unit vectors: identical text always yields an identical
/// vector, so self-similarity queries come back at distance zero and every
/// lifecycle path is testable without network access.
#[derive(Clone)]
pub struct StubEmbedder {
    dimension: usize,
}

impl StubEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| stub_embed(text, self.dimension))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn stub_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut state = fnv1a_64(text.as_bytes()) | 1;
    let mut vector = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        let bits = xorshift64_star(&mut state);
        // map the top 24 bits onto [-1, 1]
        let unit = ((bits >> 40) as f32) / ((1u64 << 23) as f32) - 1.0;
        vector.push(unit);
    }
    normalize(&mut vector);
    vector
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn xorshift64_star(state: &mut u64) -> u64 {
    let mut x = *state;
    x ^= x >> 12;
    x ^= x << 25;
    x ^= x >> 27;
    *state = x;
    x.wrapping_mul(0x2545_F491_4F6C_DD1D)
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

/// Enforces the fixed dimension and coerces non-finite components to zero.
///
/// NaN or infinite components are zeroed rather than rejected so positional
/// alignment with the owning record is preserved; a wrong length is a hard
/// error.
pub(crate) fn sanitize_vector(mut vector: Vec<f32>, expected: usize) -> Result<Vec<f32>> {
    if vector.len() != expected {
        return Err(EmbeddingStoreError::InvalidDimension {
            expected,
            actual: vector.len(),
        });
    }
    for value in vector.iter_mut() {
        if !value.is_finite() {
            *value = 0.0;
        }
    }
    Ok(vector)
}

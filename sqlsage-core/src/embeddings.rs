//! Embedding backends used to index and search schema fragments.
//!
//! Provides an `EmbeddingBackend` trait with implementations for:
//! - **Gemini**: cloud embeddings via the Gemini `embedContent` API
//! - **Gemini-fallback**: Gemini that degrades to `Ok(None)` instead of failing
//! - **Hashing**: deterministic feature-hashed bag of words, no network

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

/// Default Gemini embedding dimensions
pub const GEMINI_DIMENSIONS: usize = 768;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

// ============================================================================
// EmbeddingBackend trait
// ============================================================================

/// Abstraction over embedding providers.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a document (a schema fragment). `None` means the embedding is unavailable.
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, EmbeddingError>;

    /// Embed a search query. Defaults to `embed()`.
    async fn embed_query(&self, text: &str) -> Result<Option<Vec<f32>>, EmbeddingError> {
        self.embed(text).await
    }

    fn dimensions(&self) -> usize;

    /// Backend name for logging and index metadata.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    #[default]
    RetrievalDocument,
    RetrievalQuery,
}

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Invalid response: expected {expected} dimensions, got {actual}")]
    InvalidDimensions { expected: usize, actual: usize },

    #[error("Missing embedding in response")]
    MissingEmbedding,

    #[error("Missing API key")]
    MissingApiKey,

    #[error("All {attempts} retry attempts failed")]
    RetryExhausted { attempts: usize },
}

// ============================================================================
// Config types
// ============================================================================

#[derive(Debug, Clone)]
pub struct GeminiEmbeddingConfig {
    pub api_key: String,
    pub model: String,
    pub dimensions: usize,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl GeminiEmbeddingConfig {
    /// Falls back to `GOOGLE_API_KEY`, then `GEMINI_API_KEY`, when `api_key` is `None`.
    pub fn new(api_key: Option<String>, model: String, dimensions: usize) -> Self {
        let api_key = api_key.or_else(api_key_from_env).unwrap_or_default();

        Self {
            api_key,
            model,
            dimensions,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

pub fn api_key_from_env() -> Option<String> {
    std::env::var("GOOGLE_API_KEY")
        .or_else(|_| std::env::var("GEMINI_API_KEY"))
        .ok()
        .filter(|k| !k.is_empty())
}

/// Configuration union for the backend factory.
pub enum BackendConfig {
    Gemini(GeminiEmbeddingConfig),
    GeminiFallback(GeminiEmbeddingConfig),
    Hashing { dimensions: usize },
}

pub fn create_backend(config: BackendConfig) -> Result<Box<dyn EmbeddingBackend>, EmbeddingError> {
    match config {
        BackendConfig::Gemini(c) => Ok(Box::new(GeminiEmbeddingClient::new(c)?)),
        BackendConfig::GeminiFallback(c) => Ok(Box::new(FallbackEmbeddingClient::new(c)?)),
        BackendConfig::Hashing { dimensions } => Ok(Box::new(HashingEmbedder::new(dimensions))),
    }
}

// ============================================================================
// Gemini API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_type: Option<TaskType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: Option<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiErrorResponse {
    pub(crate) error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiErrorDetail {
    pub(crate) code: u16,
    pub(crate) message: String,
}

/// Pull `(code, message)` out of a Gemini error body, falling back to the HTTP status.
pub(crate) fn parse_gemini_error(status: u16, body: String) -> (u16, String) {
    serde_json::from_str::<GeminiErrorResponse>(&body)
        .ok()
        .and_then(|e| e.error)
        .map(|e| (e.code, e.message))
        .unwrap_or((status, body))
}

// ============================================================================
// GeminiEmbeddingClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct GeminiEmbeddingClient {
    client: Client,
    config: GeminiEmbeddingConfig,
    base_url: String,
}

impl GeminiEmbeddingClient {
    pub fn new(config: GeminiEmbeddingConfig) -> Result<Self, EmbeddingError> {
        Self::with_base_url(config, GEMINI_BASE_URL.to_string())
    }

    /// Create a client with a custom base URL (for testing / proxies)
    pub fn with_base_url(config: GeminiEmbeddingConfig, base_url: String) -> Result<Self, EmbeddingError> {
        if config.api_key.is_empty() {
            return Err(EmbeddingError::MissingApiKey);
        }

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    pub async fn embed_with_task(&self, text: &str, task_type: TaskType) -> Result<Vec<f32>, EmbeddingError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        match Retry::start(retry_strategy, || self.embed_once(text, task_type)).await {
            Ok(vec) => Ok(vec),
            Err(e) => {
                tracing::error!(
                    attempts = self.config.max_retries,
                    error = %e,
                    "All embedding retry attempts failed"
                );
                Err(EmbeddingError::RetryExhausted {
                    attempts: self.config.max_retries,
                })
            }
        }
    }

    async fn embed_once(&self, text: &str, task_type: TaskType) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!(
            "{}/models/{}:embedContent?key={}",
            self.base_url, self.config.model, self.config.api_key
        );

        let request = EmbedContentRequest {
            model: format!("models/{}", self.config.model),
            content: Content {
                parts: vec![Part { text }],
            },
            task_type: Some(task_type),
            output_dimensionality: Some(self.config.dimensions),
        };

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let (code, message) = parse_gemini_error(status.as_u16(), body);
            tracing::error!(code = code, message = %message, "Gemini embedding API error");
            return Err(EmbeddingError::Api { code, message });
        }

        let values = response
            .json::<EmbedContentResponse>()
            .await?
            .embedding
            .ok_or(EmbeddingError::MissingEmbedding)?
            .values;

        if values.len() != self.config.dimensions {
            return Err(EmbeddingError::InvalidDimensions {
                expected: self.config.dimensions,
                actual: values.len(),
            });
        }

        Ok(values)
    }
}

#[async_trait]
impl EmbeddingBackend for GeminiEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, EmbeddingError> {
        self.embed_with_task(text, TaskType::RetrievalDocument).await.map(Some)
    }

    async fn embed_query(&self, text: &str) -> Result<Option<Vec<f32>>, EmbeddingError> {
        self.embed_with_task(text, TaskType::RetrievalQuery).await.map(Some)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ============================================================================
// FallbackEmbeddingClient
// ============================================================================

/// Wraps `GeminiEmbeddingClient`. On any error, logs a warning and returns `Ok(None)`:
/// the fragment is indexed without a vector and the caller's table fallback kicks in.
pub struct FallbackEmbeddingClient {
    inner: GeminiEmbeddingClient,
}

impl FallbackEmbeddingClient {
    pub fn new(config: GeminiEmbeddingConfig) -> Result<Self, EmbeddingError> {
        Ok(Self {
            inner: GeminiEmbeddingClient::new(config)?,
        })
    }

    pub fn with_base_url(config: GeminiEmbeddingConfig, base_url: String) -> Result<Self, EmbeddingError> {
        Ok(Self {
            inner: GeminiEmbeddingClient::with_base_url(config, base_url)?,
        })
    }

    async fn degrade(&self, text: &str, task_type: TaskType) -> Result<Option<Vec<f32>>, EmbeddingError> {
        match self.inner.embed_with_task(text, task_type).await {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    task = ?task_type,
                    "Gemini embedding failed, continuing without a vector"
                );
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl EmbeddingBackend for FallbackEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, EmbeddingError> {
        self.degrade(text, TaskType::RetrievalDocument).await
    }

    async fn embed_query(&self, text: &str) -> Result<Option<Vec<f32>>, EmbeddingError> {
        self.degrade(text, TaskType::RetrievalQuery).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn name(&self) -> &str {
        "gemini-fallback"
    }
}

// ============================================================================
// HashingEmbedder
// ============================================================================

/// Deterministic offline embedder: each token (and each `_`-separated part of an
/// identifier) is hashed into one of `dimensions` buckets with a ±1 sign, then the
/// vector is L2-normalized. Identical text always yields an identical vector.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in tokenize(text) {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingBackend for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, EmbeddingError> {
        Ok(Some(self.embed_sync(text)))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
    {
        let word = word.to_lowercase();
        if word.contains('_') {
            tokens.extend(word.split('_').filter(|p| !p.is_empty()).map(singular));
        }
        tokens.push(singular(&word));
    }
    tokens
}

/// Crude plural folding so `customers` and `customer` share a bucket.
fn singular(word: &str) -> String {
    match word.strip_suffix('s') {
        Some(stem) if stem.len() >= 3 && !stem.ends_with('s') => stem.to_string(),
        _ => word.to_string(),
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(api_key: &str) -> GeminiEmbeddingConfig {
        GeminiEmbeddingConfig {
            api_key: api_key.to_string(),
            model: "gemini-embedding-001".to_string(),
            dimensions: GEMINI_DIMENSIONS,
            max_retries: 2,
            retry_delay_ms: 10,
        }
    }

    fn mock_embedding_response() -> serde_json::Value {
        let values: Vec<f32> = (0..768).map(|i| (i as f32) / 768.0).collect();
        serde_json::json!({ "embedding": { "values": values } })
    }

    #[tokio::test]
    async fn test_gemini_embeds_fragments_as_retrieval_documents() {
        let mock_server = MockServer::start().await;
        let client = GeminiEmbeddingClient::with_base_url(test_config("test-api-key"), mock_server.uri())
            .expect("Failed to create client");

        Mock::given(method("POST"))
            .and(path("/models/gemini-embedding-001:embedContent"))
            .and(body_json(serde_json::json!({
                "model": "models/gemini-embedding-001",
                "content": { "parts": [{ "text": "table_name: orders" }] },
                "taskType": "RETRIEVAL_DOCUMENT",
                "outputDimensionality": 768
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_embedding_response()))
            .mount(&mock_server)
            .await;

        let embedding = client.embed("table_name: orders").await.unwrap().unwrap();
        assert_eq!(embedding.len(), 768);
        assert_eq!(client.name(), "gemini");
    }

    #[tokio::test]
    async fn test_gemini_query_uses_retrieval_query_task() {
        let mock_server = MockServer::start().await;
        let client = GeminiEmbeddingClient::with_base_url(test_config("test-api-key"), mock_server.uri()).unwrap();

        Mock::given(method("POST"))
            .and(body_json(serde_json::json!({
                "model": "models/gemini-embedding-001",
                "content": { "parts": [{ "text": "top customers" }] },
                "taskType": "RETRIEVAL_QUERY",
                "outputDimensionality": 768
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_embedding_response()))
            .expect(1)
            .mount(&mock_server)
            .await;

        assert!(client.embed_query("top customers").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_gemini_retries_on_429_then_succeeds() {
        let mock_server = MockServer::start().await;
        let client = GeminiEmbeddingClient::with_base_url(test_config("test-api-key"), mock_server.uri()).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": { "code": 429, "message": "Rate limit exceeded" }
            })))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_embedding_response()))
            .mount(&mock_server)
            .await;

        let embedding = client.embed("hello").await.expect("should succeed after retry");
        assert_eq!(embedding.unwrap().len(), 768);
    }

    #[tokio::test]
    async fn test_gemini_reports_retry_exhaustion_on_500() {
        let mock_server = MockServer::start().await;
        let client = GeminiEmbeddingClient::with_base_url(test_config("test-api-key"), mock_server.uri()).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": { "code": 500, "message": "Internal server error" }
            })))
            .mount(&mock_server)
            .await;

        match client.embed("hello").await {
            Err(EmbeddingError::RetryExhausted { attempts }) => assert_eq!(attempts, 2),
            other => panic!("Expected RetryExhausted, got {:?}", other),
        }
    }

    #[test]
    fn test_gemini_requires_api_key() {
        match GeminiEmbeddingClient::new(test_config("")) {
            Err(EmbeddingError::MissingApiKey) => {}
            other => panic!("Expected MissingApiKey, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_fallback_returns_none_on_gemini_error() {
        let mock_server = MockServer::start().await;
        let mut config = test_config("test-key");
        config.max_retries = 0;
        let fallback = FallbackEmbeddingClient::with_base_url(config, mock_server.uri()).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": { "code": 500, "message": "boom" }
            })))
            .mount(&mock_server)
            .await;

        let result = fallback.embed_query("hello").await;
        assert!(result.is_ok(), "Fallback should not propagate errors");
        assert!(result.unwrap().is_none());
        assert_eq!(fallback.name(), "gemini-fallback");
    }

    #[tokio::test]
    async fn test_hashing_embedder_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed("table_name: orders\ncustomer_id: integer").await.unwrap().unwrap();
        let b = embedder.embed("table_name: orders\ncustomer_id: integer").await.unwrap().unwrap();

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_embedder_prefers_overlapping_vocabulary() {
        let embedder = HashingEmbedder::new(384);
        let query = embedder.embed_sync("customers name email");
        let customers = embedder.embed_sync("table_name: customers\nname: text\nemail: text");
        let shipments = embedder.embed_sync("table_name: shipments\ncarrier: text\nweight: numeric");

        assert!(cosine_similarity(&query, &customers) > cosine_similarity(&query, &shipments));
    }

    #[test]
    fn test_empty_text_embeds_to_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        assert!(embedder.embed_sync("").iter().all(|v| *v == 0.0));
        assert_eq!(cosine_similarity(&embedder.embed_sync(""), &embedder.embed_sync("x")), 0.0);
    }

    #[test]
    fn test_cosine_similarity_edge_cases() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }
}

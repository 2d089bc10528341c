//! Text generation backends: the hosted model that writes SQL.
//!
//! `TextGenerator` is the capability the pipeline depends on; `GeminiGenerationClient`
//! implements it against the Gemini `generateContent` API with a bounded request
//! timeout and bounded retry on transient failures (timeouts, 429, 5xx).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::embeddings::parse_gemini_error;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Send a prompt and return the model's full text reply.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    fn name(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Model call timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Empty response from model")]
    EmptyResponse,

    #[error("Missing API key")]
    MissingApiKey,

    #[error("All {attempts} attempts failed, last error: {last}")]
    RetryExhausted { attempts: usize, last: String },
}

impl GenerationError {
    pub fn is_transient(&self) -> bool {
        match self {
            GenerationError::Timeout { .. } => true,
            GenerationError::Http(e) => e.is_connect() || e.is_request(),
            GenerationError::Api { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeminiGenerationConfig {
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

// ============================================================================
// Gemini API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: RequestGenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct RequestGenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

// ============================================================================
// GeminiGenerationClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct GeminiGenerationClient {
    client: Client,
    config: GeminiGenerationConfig,
    base_url: String,
}

impl GeminiGenerationClient {
    pub fn new(config: GeminiGenerationConfig) -> Result<Self, GenerationError> {
        Self::with_base_url(config, GEMINI_BASE_URL.to_string())
    }

    pub fn with_base_url(config: GeminiGenerationConfig, base_url: String) -> Result<Self, GenerationError> {
        if config.api_key.is_empty() {
            return Err(GenerationError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    async fn generate_once(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.config.model, self.config.api_key
        );

        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: RequestGenerationConfig {
                temperature: self.config.temperature,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let (code, message) = parse_gemini_error(status.as_u16(), body);
            tracing::error!(code = code, message = %message, "Gemini generation API error");
            return Err(GenerationError::Api { code, message });
        }

        let body: GenerateContentResponse = response.json().await.map_err(|e| self.classify(e))?;

        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text)
    }

    fn classify(&self, e: reqwest::Error) -> GenerationError {
        if e.is_timeout() {
            GenerationError::Timeout {
                seconds: self.config.timeout_seconds,
            }
        } else {
            GenerationError::Http(e)
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerationClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        let result = RetryIf::start(
            retry_strategy,
            || self.generate_once(prompt),
            |e: &GenerationError| {
                let retry = e.is_transient();
                if retry {
                    tracing::warn!(error = %e, "Transient generation failure, retrying");
                }
                retry
            },
        )
        .await;

        match result {
            Err(e) if e.is_transient() => Err(GenerationError::RetryExhausted {
                attempts: self.config.max_retries + 1,
                last: e.to_string(),
            }),
            other => other,
        }
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

//! Shared server state: configuration, the pipeline and the session registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlsage_core::config::{EmbeddingConfig, GenerationConfig};
use sqlsage_core::embeddings::{api_key_from_env, BackendConfig, EmbeddingBackend, EmbeddingError, GeminiEmbeddingConfig};
use sqlsage_core::models::Session;
use sqlsage_core::{
    create_backend, GeminiGenerationClient, GeminiGenerationConfig, GenerationError, SqlsageConfig, Storage,
    TextGenerator,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::subsystems::orchestrate::Pipeline;

/// Active sessions keyed by id. The lock is only held for lookups and inserts.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl SessionRegistry {
    pub async fn insert(&self, session: Session) {
        self.sessions.write().await.insert(session.id, session);
    }

    pub async fn get(&self, id: &Uuid) -> Option<Session> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

pub struct AppState {
    pub config: SqlsageConfig,
    pub pipeline: Pipeline,
    pub sessions: SessionRegistry,
}

impl AppState {
    pub fn new(
        config: SqlsageConfig,
        embedder: Arc<dyn EmbeddingBackend>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        let storage = Storage::new(config.storage.resolved_root());
        let pipeline = Pipeline::new(storage, embedder, generator, config.retrieval.clone());
        Self {
            config,
            pipeline,
            sessions: SessionRegistry::default(),
        }
    }

    /// Build state with the backends named in the config.
    pub fn from_config(config: SqlsageConfig) -> Result<Self, EmbeddingError> {
        let embedder: Arc<dyn EmbeddingBackend> = Arc::from(create_backend_from_config(&config.embedding)?);
        let generator = create_generator_from_config(&config.generation);
        tracing::info!(
            embedding = embedder.name(),
            generation = generator.name(),
            storage = %config.storage.resolved_root().display(),
            "Backends ready"
        );
        Ok(Self::new(config, embedder, generator))
    }
}

pub fn create_backend_from_config(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingBackend>, EmbeddingError> {
    let gemini = || GeminiEmbeddingConfig {
        max_retries: config.max_retries,
        retry_delay_ms: config.retry_delay_ms,
        ..GeminiEmbeddingConfig::new(None, config.gemini_model.clone(), config.gemini_dimensions as usize)
    };

    let backend_cfg = match config.backend.as_str() {
        "gemini" => BackendConfig::Gemini(gemini()),
        "gemini-fallback" => BackendConfig::GeminiFallback(gemini()),
        "hashing" => BackendConfig::Hashing {
            dimensions: config.hashing_dimensions as usize,
        },
        other => {
            tracing::warn!(backend = other, "Unknown embedding backend, using hashing");
            BackendConfig::Hashing {
                dimensions: config.hashing_dimensions as usize,
            }
        }
    };

    create_backend(backend_cfg)
}

/// The Gemini generator, or a stand-in that fails every call when no API key is set,
/// so the server still starts and every question gets an `AI Error` reply.
pub fn create_generator_from_config(config: &GenerationConfig) -> Arc<dyn TextGenerator> {
    let client_config = GeminiGenerationConfig {
        api_key: api_key_from_env().unwrap_or_default(),
        model: config.model.clone(),
        temperature: config.temperature,
        timeout_seconds: config.timeout_seconds,
        max_retries: config.max_retries,
        retry_delay_ms: config.retry_delay_ms,
    };

    match GeminiGenerationClient::new(client_config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::warn!(error = %e, "SQL generation unavailable");
            Arc::new(UnavailableGenerator)
        }
    }
}

struct UnavailableGenerator;

#[async_trait]
impl TextGenerator for UnavailableGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        Err(GenerationError::MissingApiKey)
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod generation;
pub mod ipc;
pub mod models;
pub mod storage;

pub use config::SqlsageConfig;
pub use embeddings::{
    cosine_similarity, create_backend, BackendConfig, EmbeddingBackend, EmbeddingError,
    FallbackEmbeddingClient, GeminiEmbeddingClient, GeminiEmbeddingConfig, HashingEmbedder,
    GEMINI_DIMENSIONS,
};
pub use error::{ExecutionError, SessionError, SqlsageError};
pub use generation::{GeminiGenerationClient, GeminiGenerationConfig, GenerationError, TextGenerator};
pub use storage::Storage;

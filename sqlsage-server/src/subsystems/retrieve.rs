//! Retrieval subsystem: nearest-neighbour search over a session's fragment index.
//!
//! - Embeds the question with the query task type when the backend supports it
//! - Scores every stored fragment by cosine similarity
//! - Returns distinct table names from the closest fragments, at most `k`
//!
//! An empty result is not an error. Falling back to default tables is the caller's job.

use sqlsage_core::embeddings::{cosine_similarity, EmbeddingBackend, EmbeddingError};
use sqlsage_core::models::FragmentIndex;
use sqlsage_core::{SqlsageError, Storage};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Failed to load fragment index: {0}")]
    Index(#[from] SqlsageError),

    #[error("Failed to embed query: {0}")]
    Embedding(#[from] EmbeddingError),
}

/// Rank the index against a query vector.
///
/// Fragments without a vector never match. Ties keep insertion order.
pub fn rank(index: &FragmentIndex, query: &[f32], k: usize) -> Vec<String> {
    let mut scored: Vec<(f32, &str)> = index
        .entries
        .iter()
        .filter_map(|entry| {
            entry
                .vector
                .as_deref()
                .map(|v| (cosine_similarity(query, v), entry.table_name.as_str()))
        })
        .collect();

    // sort_by is stable
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut tables: Vec<String> = Vec::new();
    for (_, table) in scored {
        if tables.len() >= k {
            break;
        }
        if !tables.iter().any(|t| t == table) {
            tables.push(table.to_string());
        }
    }
    tables
}

/// Top-k relevant table names for `query` within the session.
pub async fn top_k(
    storage: &Storage,
    session_id: &Uuid,
    backend: &dyn EmbeddingBackend,
    query: &str,
    k: usize,
) -> Result<Vec<String>, RetrievalError> {
    let index = storage.load_index(session_id)?;
    if index.entries.is_empty() || k == 0 {
        return Ok(Vec::new());
    }

    let query_vector = match backend.embed_query(query).await? {
        Some(v) => v,
        None => {
            tracing::warn!(
                session_id = %session_id,
                backend = backend.name(),
                "Query embedding unavailable, returning no matches"
            );
            return Ok(Vec::new());
        }
    };

    let tables = rank(&index, &query_vector, k);
    tracing::debug!(session_id = %session_id, k = k, matched = tables.len(), "Retrieved relevant tables");
    Ok(tables)
}

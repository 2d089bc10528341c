//! Session creation: extract, persist, index. All or nothing.

use chrono::Utc;
use sqlsage_core::config::CatalogConfig;
use sqlsage_core::embeddings::EmbeddingBackend;
use sqlsage_core::models::{SchemaSnapshot, Session};
use sqlsage_core::{SessionError, Storage};
use uuid::Uuid;

use super::{extract, fragments};

/// Connect to `uri`, snapshot its catalog and build the fragment index.
///
/// On any failure after the snapshot is written, every file for the new id is removed
/// before the error is returned.
pub async fn create_session(
    uri: &str,
    catalog: &CatalogConfig,
    storage: &Storage,
    backend: &dyn EmbeddingBackend,
) -> Result<Session, SessionError> {
    let snapshot = extract::extract_schema(uri, &catalog.schema).await?;
    let id = Uuid::new_v4();

    if let Err(e) = persist(storage, id, &snapshot, backend).await {
        tracing::error!(session_id = %id, error = %e, "Session creation failed, removing partial files");
        storage.remove_session(&id);
        return Err(e);
    }

    let session = Session {
        id,
        connection_uri: uri.to_string(),
        created_at: Utc::now(),
        table_count: snapshot.table_names().len(),
        foreign_key_count: snapshot.foreign_keys.len(),
    };
    tracing::info!(
        session_id = %session.id,
        tables = session.table_count,
        foreign_keys = session.foreign_key_count,
        "Session created"
    );
    Ok(session)
}

async fn persist(
    storage: &Storage,
    id: Uuid,
    snapshot: &SchemaSnapshot,
    backend: &dyn EmbeddingBackend,
) -> Result<(), SessionError> {
    storage.write_snapshot(&id, snapshot)?;
    fragments::build(storage, id, &snapshot.columns, backend).await?;
    Ok(())
}

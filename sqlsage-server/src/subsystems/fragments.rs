//! Fragment store: one embedded text fragment per table, persisted per session.

use sqlsage_core::embeddings::{EmbeddingBackend, EmbeddingError};
use sqlsage_core::models::{ColumnDescriptor, FragmentEntry, FragmentIndex, FragmentIndexHandle};
use sqlsage_core::{SessionError, Storage};
use uuid::Uuid;

/// Render one table's columns as the text that gets embedded.
pub fn render_fragment<'a>(table: &str, columns: impl IntoIterator<Item = &'a ColumnDescriptor>) -> String {
    let mut text = format!("table_name: {}", table);
    for column in columns {
        text.push('\n');
        text.push_str(&column.column_name);
        text.push_str(": ");
        text.push_str(&column.data_type);
    }
    text
}

/// `(table_name, fragment_text)` for every distinct table, in first-appearance order.
pub fn fragments_from_columns(columns: &[ColumnDescriptor]) -> Vec<(String, String)> {
    let mut tables: Vec<&str> = Vec::new();
    for column in columns {
        if !tables.contains(&column.table_name.as_str()) {
            tables.push(&column.table_name);
        }
    }

    tables
        .into_iter()
        .map(|table| {
            let text = render_fragment(table, columns.iter().filter(|c| c.table_name == table));
            (table.to_string(), text)
        })
        .collect()
}

/// Embed every fragment. Zero tables yields a valid, empty index.
pub async fn embed_fragments(
    session_id: Uuid,
    columns: &[ColumnDescriptor],
    backend: &dyn EmbeddingBackend,
) -> Result<FragmentIndex, EmbeddingError> {
    let fragments = fragments_from_columns(columns);
    let mut entries = Vec::with_capacity(fragments.len());

    for (table_name, text) in fragments {
        let vector = backend.embed(&text).await?;
        if vector.is_none() {
            tracing::warn!(
                session_id = %session_id,
                table = %table_name,
                backend = backend.name(),
                "No embedding for fragment; table reachable only through fallback"
            );
        }
        entries.push(FragmentEntry {
            table_name,
            text,
            vector,
        });
    }

    Ok(FragmentIndex {
        session_id,
        backend: backend.name().to_string(),
        dimensions: backend.dimensions(),
        entries,
    })
}

/// Build and persist the session's fragment index.
pub async fn build(
    storage: &Storage,
    session_id: Uuid,
    columns: &[ColumnDescriptor],
    backend: &dyn EmbeddingBackend,
) -> Result<FragmentIndexHandle, SessionError> {
    let index = embed_fragments(session_id, columns, backend).await?;
    let fragments = index.entries.len();
    let path = storage.write_index(&index)?;

    tracing::info!(
        session_id = %session_id,
        fragments = fragments,
        backend = backend.name(),
        "Fragment index built"
    );

    Ok(FragmentIndexHandle {
        session_id,
        path,
        fragments,
    })
}

//! Schema extraction: reads table, column and foreign-key metadata from the catalog.
//!
//! Both catalog queries run on one short-lived connection. The snapshot is returned only
//! if both succeed; persisting it is the caller's job.

use sqlsage_core::db;
use sqlsage_core::models::{ColumnDescriptor, ForeignKeyDescriptor, SchemaSnapshot};
use sqlsage_core::SessionError;
use sqlx::postgres::PgConnection;

const COLUMNS_SQL: &str = r#"
    SELECT
        table_name::text  AS table_name,
        column_name::text AS column_name,
        data_type::text   AS data_type
    FROM information_schema.columns
    WHERE table_schema = $1
    ORDER BY table_name, ordinal_position
"#;

const FOREIGN_KEYS_SQL: &str = r#"
    SELECT
        src.relname::text  AS table_name,
        con.conname::text  AS constraint_name,
        dst.relname::text  AS referenced_table
    FROM pg_constraint con
    JOIN pg_class src ON src.oid = con.conrelid
    JOIN pg_class dst ON dst.oid = con.confrelid
    JOIN pg_namespace ns ON ns.oid = con.connamespace
    WHERE con.contype = 'f' AND ns.nspname = $1
    ORDER BY src.relname, con.conname
"#;

/// Connect to `uri` and read the catalog of `schema`.
///
/// # Errors
/// * `SessionError::Connection`: the database could not be reached
/// * `SessionError::Extraction`: either catalog query failed
pub async fn extract_schema(uri: &str, schema: &str) -> Result<SchemaSnapshot, SessionError> {
    let mut conn = db::connect(uri).await.map_err(SessionError::Connection)?;

    let result = read_catalog(&mut conn, schema).await;
    db::close(conn).await;

    let snapshot = result.map_err(SessionError::Extraction)?;
    tracing::info!(
        schema = schema,
        columns = snapshot.columns.len(),
        foreign_keys = snapshot.foreign_keys.len(),
        "Extracted schema snapshot"
    );
    Ok(snapshot)
}

async fn read_catalog(conn: &mut PgConnection, schema: &str) -> Result<SchemaSnapshot, sqlx::Error> {
    let columns: Vec<ColumnDescriptor> = sqlx::query_as(COLUMNS_SQL)
        .bind(schema)
        .fetch_all(&mut *conn)
        .await?;

    let foreign_keys: Vec<ForeignKeyDescriptor> = sqlx::query_as(FOREIGN_KEYS_SQL)
        .bind(schema)
        .fetch_all(&mut *conn)
        .await?;

    Ok(SchemaSnapshot { columns, foreign_keys })
}

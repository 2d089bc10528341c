use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One connected-database context. Immutable after creation.
#[derive(Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub connection_uri: String,
    pub created_at: DateTime<Utc>,
    pub table_count: usize,
    pub foreign_key_count: usize,
}

impl Session {
    /// File-name-safe key used for the session's storage paths.
    pub fn storage_key(id: &Uuid) -> String {
        id.simple().to_string()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("table_count", &self.table_count)
            .field("foreign_key_count", &self.foreign_key_count)
            .finish_non_exhaustive()
    }
}

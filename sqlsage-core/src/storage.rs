//! Session-scoped files: two schema snapshot tables and one fragment index.
//!
//! Layout under the storage root:
//! - `snapshots/tables_<key>.json`       `(table_name, column_name, data_type)` rows
//! - `snapshots/foreign_keys_<key>.json` `(table_name, foreign_key, referred_table)` rows
//! - `vectors/tables_<key>.json`         fragment index
//!
//! Files are written once at session creation via write-then-rename.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::SqlsageError;
use crate::models::{ColumnDescriptor, ForeignKeyDescriptor, FragmentIndex, SchemaSnapshot, Session};

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tables_path(&self, id: &Uuid) -> PathBuf {
        self.root
            .join("snapshots")
            .join(format!("tables_{}.json", Session::storage_key(id)))
    }

    pub fn foreign_keys_path(&self, id: &Uuid) -> PathBuf {
        self.root
            .join("snapshots")
            .join(format!("foreign_keys_{}.json", Session::storage_key(id)))
    }

    pub fn index_path(&self, id: &Uuid) -> PathBuf {
        self.root
            .join("vectors")
            .join(format!("tables_{}.json", Session::storage_key(id)))
    }

    /// Persist both snapshot tables. If the second write fails the first is removed.
    pub fn write_snapshot(&self, id: &Uuid, snapshot: &SchemaSnapshot) -> Result<(), SqlsageError> {
        let tables_path = self.tables_path(id);
        write_json(&tables_path, &snapshot.columns)?;

        if let Err(e) = write_json(&self.foreign_keys_path(id), &snapshot.foreign_keys) {
            let _ = fs::remove_file(&tables_path);
            return Err(e);
        }
        Ok(())
    }

    pub fn load_snapshot(&self, id: &Uuid) -> Result<SchemaSnapshot, SqlsageError> {
        let columns: Vec<ColumnDescriptor> = read_json(&self.tables_path(id))?;
        let foreign_keys: Vec<ForeignKeyDescriptor> = read_json(&self.foreign_keys_path(id))?;
        Ok(SchemaSnapshot { columns, foreign_keys })
    }

    pub fn write_index(&self, index: &FragmentIndex) -> Result<PathBuf, SqlsageError> {
        let path = self.index_path(&index.session_id);
        write_json(&path, index)?;
        Ok(path)
    }

    pub fn load_index(&self, id: &Uuid) -> Result<FragmentIndex, SqlsageError> {
        read_json(&self.index_path(id))
    }

    /// Best-effort removal of every file belonging to a session.
    pub fn remove_session(&self, id: &Uuid) {
        for path in [self.tables_path(id), self.foreign_keys_path(id), self.index_path(id)] {
            match fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "Removed session file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove session file"),
            }
        }
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), SqlsageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, SqlsageError> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

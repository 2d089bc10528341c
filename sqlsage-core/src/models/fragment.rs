use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// One table's schema rendered as text, plus its embedding.
///
/// `vector` is `None` when a fallback embedding backend could not produce one; such
/// entries are kept for bookkeeping but never match a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentEntry {
    pub table_name: String,
    pub text: String,
    pub vector: Option<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentIndex {
    pub session_id: Uuid,
    pub backend: String,
    pub dimensions: usize,
    pub entries: Vec<FragmentEntry>,
}

#[derive(Debug, Clone)]
pub struct FragmentIndexHandle {
    pub session_id: Uuid,
    pub path: PathBuf,
    pub fragments: usize,
}

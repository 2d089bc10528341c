//! One question-answering turn: retrieve, prompt, generate, execute, format.
//!
//! Every failure after the session lookup is folded into a `QueryResponse`, so callers
//! only have to time the turn and hand the response back.

use std::sync::Arc;

use sqlsage_core::config::RetrievalConfig;
use sqlsage_core::embeddings::EmbeddingBackend;
use sqlsage_core::models::{QueryMetrics, QueryResponse, SchemaSnapshot, Session};
use sqlsage_core::{Storage, TextGenerator};

use super::describe;
use super::execute::{ExecutionOutcome, SqlExecutor};
use super::format;
use super::generate::{self, GenerationResult};
use super::prompt;
use super::retrieve;

#[derive(Clone)]
pub struct Pipeline {
    storage: Storage,
    embedder: Arc<dyn EmbeddingBackend>,
    generator: Arc<dyn TextGenerator>,
    retrieval: RetrievalConfig,
}

impl Pipeline {
    pub fn new(
        storage: Storage,
        embedder: Arc<dyn EmbeddingBackend>,
        generator: Arc<dyn TextGenerator>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            storage,
            embedder,
            generator,
            retrieval,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn embedder(&self) -> &dyn EmbeddingBackend {
        self.embedder.as_ref()
    }

    /// Answer `question` against the session. `processing_time` is left at zero.
    pub async fn answer(
        &self,
        session: &Session,
        question: &str,
        executor: &dyn SqlExecutor,
        describe: bool,
    ) -> QueryResponse {
        let snapshot = match self.storage.load_snapshot(&session.id) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(session_id = %session.id, error = %e, "Failed to load schema snapshot");
                return QueryResponse::text(format!("Processing error: {}", e));
            }
        };

        let tables = self.relevant_tables(session, &snapshot, question).await;
        let schema_info = prompt::render_schema_info(&snapshot.columns, &tables);
        let foreign_keys = prompt::render_foreign_keys(&snapshot.foreign_keys, &tables);
        let prompt_text = prompt::build_prompt(question, &schema_info, &foreign_keys);

        let sql = match generate::generate_sql(self.generator.as_ref(), &prompt_text).await {
            GenerationResult::Sql { sql, .. } => sql,
            GenerationResult::Failure { error, .. } => return QueryResponse::text(error),
        };

        match executor.execute(&sql).await {
            ExecutionOutcome::Message(message) => QueryResponse::Text {
                message: format!("```sql\n{}\n```\n\n{}", sql, message),
                metrics: QueryMetrics::low(),
            },
            ExecutionOutcome::Table(result) => {
                let display = format::display_rows(&result);
                let description = if describe {
                    let headers: Vec<String> = result.columns.iter().map(|c| c.name.clone()).collect();
                    Some(describe::describe(self.generator.as_ref(), &headers, &display).await)
                } else {
                    None
                };

                tracing::info!(
                    session_id = %session.id,
                    tables = tables.len(),
                    rows = result.row_count(),
                    "Query answered"
                );

                let mut response = QueryResponse::table(result, display, sql);
                if let QueryResponse::Table { description: slot, .. } = &mut response {
                    *slot = description;
                }
                response
            }
        }
    }

    /// Retrieved tables, or the first few tables in schema order when retrieval finds
    /// nothing or fails.
    pub async fn relevant_tables(&self, session: &Session, snapshot: &SchemaSnapshot, question: &str) -> Vec<String> {
        let retrieved = match retrieve::top_k(
            &self.storage,
            &session.id,
            self.embedder.as_ref(),
            question,
            self.retrieval.top_k,
        )
        .await
        {
            Ok(tables) => tables,
            Err(e) => {
                tracing::warn!(session_id = %session.id, error = %e, "Retrieval failed, using fallback tables");
                Vec::new()
            }
        };

        if !retrieved.is_empty() {
            return retrieved;
        }

        let fallback: Vec<String> = snapshot
            .table_names()
            .into_iter()
            .take(self.retrieval.fallback_tables)
            .collect();
        tracing::debug!(session_id = %session.id, tables = ?fallback, "Using fallback tables");
        fallback
    }
}

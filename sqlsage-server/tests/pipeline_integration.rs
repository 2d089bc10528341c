//! End-to-end question answering over a stored schema, with a scripted model and a
//! scripted executor. No database or network access.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use sqlsage_core::config::RetrievalConfig;
use sqlsage_core::models::{
    CellValue, ColumnDescriptor, ColumnKind, ForeignKeyDescriptor, QueryComplexity, QueryResponse, ResultColumn,
    SchemaSnapshot, Session, TabularResult,
};
use sqlsage_core::{GenerationError, HashingEmbedder, Storage, TextGenerator};
use sqlsage_server::subsystems::execute::{ExecutionOutcome, SqlExecutor};
use sqlsage_server::subsystems::fragments;
use sqlsage_server::subsystems::orchestrate::Pipeline;
use uuid::Uuid;

const JOIN_REPLY: &str = "```sql
-- revenue per customer
SELECT c.name, SUM(o.total_amount) AS total_amount
FROM customers c
JOIN orders o ON o.customer_id = c.id
GROUP BY c.name
ORDER BY total_amount DESC
LIMIT 5
```";

struct ScriptedModel {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl TextGenerator for ScriptedModel {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Returns `rows` revenue rows and records every statement it is asked to run.
struct RevenueExecutor {
    rows: usize,
    statements: Mutex<Vec<String>>,
}

impl RevenueExecutor {
    fn new(rows: usize) -> Self {
        Self {
            rows,
            statements: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SqlExecutor for RevenueExecutor {
    async fn execute(&self, sql: &str) -> ExecutionOutcome {
        self.statements.lock().unwrap().push(sql.to_string());
        ExecutionOutcome::Table(TabularResult {
            columns: vec![
                ResultColumn {
                    name: "name".to_string(),
                    type_name: "TEXT".to_string(),
                    kind: ColumnKind::Text,
                },
                ResultColumn {
                    name: "total_amount".to_string(),
                    type_name: "NUMERIC".to_string(),
                    kind: ColumnKind::Numeric,
                },
            ],
            rows: (0..self.rows)
                .map(|i| vec![CellValue::Text(format!("customer {}", i)), CellValue::Numeric("1234.5".to_string())])
                .collect(),
        })
    }
}

fn col(table: &str, column: &str, ty: &str) -> ColumnDescriptor {
    ColumnDescriptor {
        table_name: table.to_string(),
        column_name: column.to_string(),
        data_type: ty.to_string(),
    }
}

fn shop_snapshot() -> SchemaSnapshot {
    SchemaSnapshot {
        columns: vec![
            col("customers", "id", "integer"),
            col("customers", "name", "text"),
            col("orders", "id", "integer"),
            col("orders", "customer_id", "integer"),
            col("orders", "total_amount", "numeric"),
        ],
        foreign_keys: vec![ForeignKeyDescriptor {
            table_name: "orders".to_string(),
            constraint_name: "orders_customer_id_fkey".to_string(),
            referenced_table: "customers".to_string(),
        }],
    }
}

/// Persist a snapshot and its fragment index the way session creation does.
async fn stored_session(storage: &Storage, snapshot: &SchemaSnapshot, embedder: &HashingEmbedder) -> Session {
    let id = Uuid::new_v4();
    storage.write_snapshot(&id, snapshot).unwrap();
    fragments::build(storage, id, &snapshot.columns, embedder).await.unwrap();
    Session {
        id,
        connection_uri: "postgresql://scripted".to_string(),
        created_at: Utc::now(),
        table_count: snapshot.table_names().len(),
        foreign_key_count: snapshot.foreign_keys.len(),
    }
}

async fn run_revenue_turn(rows: usize) -> (QueryResponse, Arc<ScriptedModel>) {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::new(dir.path());
    let embedder = HashingEmbedder::new(128);
    let session = stored_session(&storage, &shop_snapshot(), &embedder).await;

    let model = ScriptedModel::new(JOIN_REPLY);
    let pipeline = Pipeline::new(storage, Arc::new(embedder), model.clone(), RetrievalConfig::default());
    let response = pipeline
        .answer(&session, "top 5 customers by revenue", &RevenueExecutor::new(rows), false)
        .await;
    (response, model)
}

#[tokio::test]
async fn test_join_question_produces_medium_table() {
    let (response, model) = run_revenue_turn(5).await;

    match response {
        QueryResponse::Table {
            sql,
            display_rows,
            metrics,
            description,
            ..
        } => {
            assert!(sql.contains("JOIN orders o ON o.customer_id = c.id"));
            assert!(sql.starts_with("-- revenue per customer"));
            assert_eq!(display_rows[0], vec!["customer 0".to_string(), "$1,234.50".to_string()]);
            assert_eq!(metrics.query_complexity, QueryComplexity::Medium);
            assert_eq!(metrics.rows_returned, Some(5));
            assert!(description.is_none());
        }
        other => panic!("Expected Table, got {:?}", other),
    }

    let prompts = model.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("User Question: top 5 customers by revenue"));
    assert!(prompts[0].contains("orders.orders_customer_id_fkey → customers"));
}

#[tokio::test]
async fn test_hundred_rows_is_still_medium() {
    let (response, _) = run_revenue_turn(100).await;
    assert_eq!(response.metrics().query_complexity, QueryComplexity::Medium);
    assert_eq!(response.metrics().rows_returned, Some(100));
}

#[tokio::test]
async fn test_large_result_is_high_complexity() {
    let (response, _) = run_revenue_turn(101).await;
    assert_eq!(response.kind(), "table");
    assert_eq!(response.metrics().query_complexity, QueryComplexity::High);
    assert_eq!(response.metrics().rows_returned, Some(101));
}

#[tokio::test]
async fn test_reply_without_sql_block_is_never_executed() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::new(dir.path());
    let embedder = HashingEmbedder::new(64);
    let session = stored_session(&storage, &shop_snapshot(), &embedder).await;

    let reply = "SELECT * FROM customers; -- no fence";
    let pipeline = Pipeline::new(storage, Arc::new(embedder), ScriptedModel::new(reply), RetrievalConfig::default());
    let executor = RevenueExecutor::new(3);

    let response = pipeline.answer(&session, "list customers", &executor, false).await;
    match response {
        QueryResponse::Text { message, metrics } => {
            assert_eq!(message, format!("No valid SQL found in response:\n{}", reply));
            assert_eq!(metrics.query_complexity, QueryComplexity::Low);
        }
        other => panic!("Expected Text, got {:?}", other),
    }
    assert!(executor.statements.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_index_falls_back_to_first_three_tables() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::new(dir.path());
    let snapshot = SchemaSnapshot {
        columns: ["alpha", "beta", "gamma", "delta"]
            .iter()
            .map(|t| col(t, "id", "integer"))
            .collect(),
        foreign_keys: vec![],
    };

    // Snapshot present but index built from no columns: retrieval has nothing to rank.
    let id = Uuid::new_v4();
    storage.write_snapshot(&id, &snapshot).unwrap();
    fragments::build(&storage, id, &[], &HashingEmbedder::new(16)).await.unwrap();
    let session = Session {
        id,
        connection_uri: "postgresql://scripted".to_string(),
        created_at: Utc::now(),
        table_count: 4,
        foreign_key_count: 0,
    };

    let model = ScriptedModel::new("```sql\nSELECT 1\n```");
    let pipeline = Pipeline::new(storage, Arc::new(HashingEmbedder::new(16)), model.clone(), RetrievalConfig::default());
    pipeline.answer(&session, "anything", &RevenueExecutor::new(1), false).await;

    let prompts = model.prompts.lock().unwrap();
    assert!(prompts[0].contains("Table alpha:"));
    assert!(prompts[0].contains("Table beta:"));
    assert!(prompts[0].contains("Table gamma:"));
    assert!(!prompts[0].contains("Table delta:"));
}

#[tokio::test]
async fn test_describe_requested_attaches_description() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::new(dir.path());
    let embedder = HashingEmbedder::new(64);
    let session = stored_session(&storage, &shop_snapshot(), &embedder).await;

    let model = ScriptedModel::new(JOIN_REPLY);
    let pipeline = Pipeline::new(storage, Arc::new(embedder), model.clone(), RetrievalConfig::default());
    let response = pipeline
        .answer(&session, "top 5 customers by revenue", &RevenueExecutor::new(2), true)
        .await;

    match response {
        QueryResponse::Table { description, .. } => assert!(description.is_some()),
        other => panic!("Expected Table, got {:?}", other),
    }
    let prompts = model.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].starts_with("You are a data analyst."));
}

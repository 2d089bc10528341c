//! Statement execution against the session's database.
//!
//! The generated SQL runs verbatim over the simple query protocol, so every value comes
//! back in text format and is decoded here by its Postgres type name. Failures are
//! folded into an `ExecutionOutcome::Message`; nothing is propagated.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use futures::TryStreamExt;
use sqlsage_core::db;
use sqlsage_core::models::{CellValue, ColumnKind, ResultColumn, TabularResult};
use sqlsage_core::ExecutionError;
use sqlx::postgres::{PgColumn, PgConnection, PgRow};
use sqlx::{Column, Either, Executor, Row, Statement, TypeInfo, ValueRef};

pub const EXECUTED_MESSAGE: &str = "Query executed successfully";

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Table(TabularResult),
    Message(String),
}

#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> ExecutionOutcome;
}

/// Executes against a Postgres URI, one fresh connection per statement.
#[derive(Clone)]
pub struct PgExecutor {
    uri: String,
}

impl PgExecutor {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }

    async fn run(&self, sql: &str) -> Result<ExecutionOutcome, ExecutionError> {
        let mut conn = db::connect(&self.uri).await.map_err(ExecutionError::Connection)?;
        let result = run_statement(&mut conn, sql).await;
        db::close(conn).await;
        result.map_err(ExecutionError::Statement)
    }
}

#[async_trait]
impl SqlExecutor for PgExecutor {
    async fn execute(&self, sql: &str) -> ExecutionOutcome {
        match self.run(sql).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = %e, "Statement execution failed");
                ExecutionOutcome::Message(format!("Execution error: {}", e))
            }
        }
    }
}

async fn run_statement(conn: &mut PgConnection, sql: &str) -> Result<ExecutionOutcome, sqlx::Error> {
    let (rows, statements) = last_result_set(conn, sql).await?;

    let columns = match rows.first() {
        Some(row) => describe_columns(row.columns()),
        None => {
            // No rows tells us nothing about the shape. Describing the statement does
            // not execute it; a statement with no result columns is DDL/DML. Text holding
            // several statements cannot be described, which surfaces as an error.
            let statement = Executor::prepare(&mut *conn, sql).await?;
            if statement.columns().is_empty() {
                return Ok(ExecutionOutcome::Message(EXECUTED_MESSAGE.to_string()));
            }
            describe_columns(statement.columns())
        }
    };

    if statements > 1 {
        tracing::debug!(statements, "Keeping the final statement's result set");
    }

    let mut decoded = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut cells = Vec::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            let raw = row.try_get_raw(i)?;
            let text = if raw.is_null() {
                None
            } else {
                Some(raw.as_str().map_err(sqlx::Error::Decode)?)
            };
            cells.push(decode_cell(&column.type_name, text));
        }
        decoded.push(cells);
    }

    tracing::debug!(columns = columns.len(), rows = decoded.len(), "Statement returned a result set");
    Ok(ExecutionOutcome::Table(TabularResult {
        columns,
        rows: decoded,
    }))
}

/// Run every statement in `sql` and keep the rows of the last one. Each statement's
/// rows are followed by its own query result, which closes that result set.
async fn last_result_set(conn: &mut PgConnection, sql: &str) -> Result<(Vec<PgRow>, usize), sqlx::Error> {
    let mut stream = Executor::fetch_many(&mut *conn, sqlx::raw_sql(sql));
    let mut current: Vec<PgRow> = Vec::new();
    let mut last: Vec<PgRow> = Vec::new();
    let mut statements = 0;

    while let Some(step) = stream.try_next().await? {
        match step {
            Either::Left(_) => {
                statements += 1;
                last = std::mem::take(&mut current);
            }
            Either::Right(row) => current.push(row),
        }
    }

    if !current.is_empty() {
        last = current;
    }
    Ok((last, statements))
}

fn describe_columns(columns: &[PgColumn]) -> Vec<ResultColumn> {
    columns
        .iter()
        .map(|c| {
            let type_name = c.type_info().name().to_string();
            ResultColumn {
                name: c.name().to_string(),
                kind: ColumnKind::from_type_name(&type_name),
                type_name,
            }
        })
        .collect()
}

/// Decode one text-format value. Anything that does not parse as its declared type is
/// kept as text rather than failing the turn.
pub fn decode_cell(type_name: &str, text: Option<&str>) -> CellValue {
    let Some(text) = text else {
        return CellValue::Null;
    };

    match type_name.to_ascii_uppercase().as_str() {
        "INT2" | "INT4" | "INT8" | "OID" => text
            .parse()
            .map(CellValue::Int)
            .unwrap_or_else(|_| CellValue::Numeric(text.to_string())),
        "FLOAT4" | "FLOAT8" => text
            .parse()
            .map(CellValue::Float)
            .unwrap_or_else(|_| CellValue::Numeric(text.to_string())),
        "NUMERIC" | "MONEY" => CellValue::Numeric(text.to_string()),
        "BOOL" => match text {
            "t" | "true" => CellValue::Bool(true),
            "f" | "false" => CellValue::Bool(false),
            _ => CellValue::Text(text.to_string()),
        },
        "DATE" => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map(CellValue::Date)
            .unwrap_or_else(|_| CellValue::Text(text.to_string())),
        "TIMESTAMP" => NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
            .map(CellValue::Timestamp)
            .unwrap_or_else(|_| CellValue::Text(text.to_string())),
        "TIMESTAMPTZ" => DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z")
            .map(|dt| CellValue::Timestamp(dt.naive_local()))
            .unwrap_or_else(|_| CellValue::Text(text.to_string())),
        _ => CellValue::Text(text.to_string()),
    }
}

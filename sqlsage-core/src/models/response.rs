//! The response contract returned to the presentation layer for every turn.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Row count above which a table result is labelled `high` complexity.
pub const HIGH_COMPLEXITY_ROWS: usize = 100;

pub const NOT_CONNECTED_MESSAGE: &str = "Please connect to a database first";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryComplexity {
    Low,
    Medium,
    High,
}

impl QueryComplexity {
    pub fn for_row_count(rows: usize) -> Self {
        if rows > HIGH_COMPLEXITY_ROWS {
            QueryComplexity::High
        } else {
            QueryComplexity::Medium
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryMetrics {
    /// Seconds spent on the whole turn, filled in by the caller.
    pub processing_time: f64,
    pub query_complexity: QueryComplexity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_returned: Option<usize>,
}

impl QueryMetrics {
    pub fn low() -> Self {
        Self {
            processing_time: 0.0,
            query_complexity: QueryComplexity::Low,
            rows_returned: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Temporal,
    Boolean,
    Text,
}

impl ColumnKind {
    /// Classify a Postgres type name as reported by the wire protocol (`INT4`, `NUMERIC`, ...).
    pub fn from_type_name(type_name: &str) -> Self {
        match type_name.to_ascii_uppercase().as_str() {
            "INT2" | "INT4" | "INT8" | "FLOAT4" | "FLOAT8" | "NUMERIC" | "OID" | "MONEY"
            | "SMALLINT" | "INTEGER" | "BIGINT" | "REAL" | "DOUBLE PRECISION" => ColumnKind::Numeric,
            "DATE" | "TIMESTAMP" | "TIMESTAMPTZ" => ColumnKind::Temporal,
            "BOOL" | "BOOLEAN" => ColumnKind::Boolean,
            _ => ColumnKind::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultColumn {
    pub name: String,
    pub type_name: String,
    pub kind: ColumnKind,
}

/// A raw result cell. Numeric values keep their database text in `Numeric` so that
/// arbitrary-precision decimals survive the trip to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Numeric(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Text(String),
}

impl CellValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(i) => Some(*i as f64),
            CellValue::Float(f) => Some(*f),
            CellValue::Numeric(s) => s.parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TabularResult {
    pub columns: Vec<ResultColumn>,
    pub rows: Vec<Vec<CellValue>>,
}

impl TabularResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryResponse {
    Table {
        columns: Vec<ResultColumn>,
        rows: Vec<Vec<CellValue>>,
        /// Display strings, same shape as `rows`.
        display_rows: Vec<Vec<String>>,
        sql: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        metrics: QueryMetrics,
    },
    Text {
        message: String,
        metrics: QueryMetrics,
    },
}

impl QueryResponse {
    pub fn text(message: impl Into<String>) -> Self {
        QueryResponse::Text {
            message: message.into(),
            metrics: QueryMetrics::low(),
        }
    }

    pub fn not_connected() -> Self {
        Self::text(NOT_CONNECTED_MESSAGE)
    }

    pub fn table(result: TabularResult, display_rows: Vec<Vec<String>>, sql: String) -> Self {
        let row_count = result.row_count();
        QueryResponse::Table {
            columns: result.columns,
            rows: result.rows,
            display_rows,
            sql,
            description: None,
            metrics: QueryMetrics {
                processing_time: 0.0,
                query_complexity: QueryComplexity::for_row_count(row_count),
                rows_returned: Some(row_count),
            },
        }
    }

    pub fn metrics(&self) -> &QueryMetrics {
        match self {
            QueryResponse::Table { metrics, .. } | QueryResponse::Text { metrics, .. } => metrics,
        }
    }

    pub fn with_processing_time(mut self, seconds: f64) -> Self {
        match &mut self {
            QueryResponse::Table { metrics, .. } | QueryResponse::Text { metrics, .. } => {
                metrics.processing_time = seconds;
            }
        }
        self
    }

    pub fn kind(&self) -> &'static str {
        match self {
            QueryResponse::Table { .. } => "table",
            QueryResponse::Text { .. } => "text",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complexity_threshold_is_exclusive() {
        assert_eq!(QueryComplexity::for_row_count(0), QueryComplexity::Medium);
        assert_eq!(QueryComplexity::for_row_count(100), QueryComplexity::Medium);
        assert_eq!(QueryComplexity::for_row_count(101), QueryComplexity::High);
    }

    #[test]
    fn test_not_connected_response_shape() {
        let value = serde_json::to_value(QueryResponse::not_connected()).unwrap();
        assert_eq!(value["kind"], "text");
        assert_eq!(value["message"], NOT_CONNECTED_MESSAGE);
        assert_eq!(value["metrics"]["processing_time"], 0.0);
        assert_eq!(value["metrics"]["query_complexity"], "low");
        assert!(value["metrics"].get("rows_returned").is_none());
    }

    #[test]
    fn test_table_response_carries_row_count() {
        let result = TabularResult {
            columns: vec![ResultColumn {
                name: "n".to_string(),
                type_name: "INT4".to_string(),
                kind: ColumnKind::Numeric,
            }],
            rows: vec![vec![CellValue::Int(1)], vec![CellValue::Null]],
        };
        let response = QueryResponse::table(result, vec![vec!["1.00".into()], vec!["".into()]], "SELECT n".into())
            .with_processing_time(0.25);

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["kind"], "table");
        assert_eq!(value["rows"][0][0], 1);
        assert!(value["rows"][1][0].is_null());
        assert_eq!(value["metrics"]["rows_returned"], 2);
        assert_eq!(value["metrics"]["query_complexity"], "medium");
        assert_eq!(value["metrics"]["processing_time"], 0.25);
    }

    #[test]
    fn test_column_kind_classification() {
        assert_eq!(ColumnKind::from_type_name("NUMERIC"), ColumnKind::Numeric);
        assert_eq!(ColumnKind::from_type_name("int8"), ColumnKind::Numeric);
        assert_eq!(ColumnKind::from_type_name("TIMESTAMPTZ"), ColumnKind::Temporal);
        assert_eq!(ColumnKind::from_type_name("BOOL"), ColumnKind::Boolean);
        assert_eq!(ColumnKind::from_type_name("VARCHAR"), ColumnKind::Text);
    }
}

//! sqlsage-cli: talk to a running sqlsage-server over its HTTP API.
//!
//! # Subcommands
//! - `connect <uri>`                                          create a session
//! - `ask <question> [--session ID] [--describe] [--json]`    ask a question
//! - `session <id>`                                           show session metadata
//! - `status`                                                 show server health

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8787";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "sqlsage-cli", version, about = "Ask natural-language questions of a PostgreSQL database")]
struct Cli {
    /// SQLSage HTTP server URL (overrides SQLSAGE_HTTP_URL env var)
    #[arg(long, env = "SQLSAGE_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Connect to a database and create a session
    Connect {
        /// PostgreSQL connection string
        uri: String,
    },

    /// Ask a question within a session
    Ask {
        question: String,

        /// Session id returned by `connect`
        #[arg(long, env = "SQLSAGE_SESSION")]
        session: Option<String>,

        /// Also ask for a short description of the result
        #[arg(long)]
        describe: bool,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Show a session's metadata
    Session { id: String },

    /// Show server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct Metrics {
    pub processing_time: f64,
    pub query_complexity: String,
    pub rows_returned: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct Column {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AskResponse {
    Table {
        columns: Vec<Column>,
        display_rows: Vec<Vec<String>>,
        sql: String,
        description: Option<String>,
        metrics: Metrics,
    },
    Text {
        message: String,
        metrics: Metrics,
    },
}

// ============================================================================
// Rendering
// ============================================================================

/// Left-aligned text table with a dashed rule under the header.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let widths: Vec<usize> = (0..headers.len())
        .map(|i| {
            rows.iter()
                .filter_map(|r| r.get(i))
                .chain(std::iter::once(&headers[i]))
                .map(|c| c.chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |cells: &[String]| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<w$}", c, w = *w))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let rule = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-");

    let mut out = vec![line(headers), rule];
    out.extend(rows.iter().map(|r| line(r.as_slice())));
    out.join("\n")
}

pub fn render_metrics(metrics: &Metrics) -> String {
    match metrics.rows_returned {
        Some(rows) => format!(
            "rows: {}  complexity: {}  time: {:.2}s",
            rows, metrics.query_complexity, metrics.processing_time
        ),
        None => format!("complexity: {}  time: {:.2}s", metrics.query_complexity, metrics.processing_time),
    }
}

pub fn render_response(response: &AskResponse) -> String {
    match response {
        AskResponse::Table {
            columns,
            display_rows,
            sql,
            description,
            metrics,
        } => {
            let headers: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
            let mut out = format!("```sql\n{}\n```\n\n{}", sql, render_table(&headers, display_rows));
            if let Some(d) = description {
                out.push_str("\n\n");
                out.push_str(d);
            }
            out.push_str("\n\n");
            out.push_str(&render_metrics(metrics));
            out
        }
        AskResponse::Text { message, metrics } => format!("{}\n\n{}", message, render_metrics(metrics)),
    }
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

/// Send a request and return the JSON body, exiting with a message on failure.
fn send(request: reqwest::blocking::RequestBuilder, url: &str) -> anyhow::Result<serde_json::Value> {
    let resp = match request.send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("sqlsage-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let status = resp.status();
    let body: serde_json::Value = resp.json().unwrap_or_default();
    if !status.is_success() {
        let error = body["error"].as_str().unwrap_or("unknown error");
        eprintln!("sqlsage-cli: server returned {}: {}", status, error);
        std::process::exit(1);
    }
    Ok(body)
}

fn do_connect(server: &str, uri: &str) -> anyhow::Result<()> {
    let url = format!("{}/connect", server);
    let body = send(client(120)?.post(&url).json(&serde_json::json!({ "uri": uri })), &url)?;

    println!("Session:      {}", body["session_id"].as_str().unwrap_or("?"));
    println!("Tables:       {}", body["tables"]);
    println!("Foreign keys: {}", body["foreign_keys"]);
    println!("Took:         {:.2}s", body["connection_time"].as_f64().unwrap_or(0.0));
    Ok(())
}

fn do_ask(server: &str, question: &str, session: Option<&str>, describe: bool, json: bool) -> anyhow::Result<()> {
    let url = format!("{}/ask", server);
    let payload = serde_json::json!({
        "session_id": session,
        "question": question,
        "describe": describe,
    });
    // Model calls are retried server-side, so allow for several attempts.
    let body = send(client(300)?.post(&url).json(&payload), &url)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let response: AskResponse = serde_json::from_value(body)?;
    println!("{}", render_response(&response));
    Ok(())
}

fn do_session(server: &str, id: &str) -> anyhow::Result<()> {
    let url = format!("{}/sessions/{}", server, id);
    let body = send(client(10)?.get(&url), &url)?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn do_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", server);
    let body = send(client(10)?.get(&url), &url)?;

    println!("SQLSage server: {}", body["status"].as_str().unwrap_or("unknown"));
    println!("Version:        {}", body["version"].as_str().unwrap_or("?"));
    println!("Sessions:       {}", body["sessions"]);
    println!("Embedding:      {}", body["embedding_backend"].as_str().unwrap_or("?"));
    println!("Storage:        {}", body["storage_root"].as_str().unwrap_or("?"));
    println!("Socket:         {}", body["socket"].as_str().unwrap_or("?"));
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Connect { uri } => do_connect(&server, &uri),
        Commands::Ask {
            question,
            session,
            describe,
            json,
        } => do_ask(&server, &question, session.as_deref(), describe, json),
        Commands::Session { id } => do_session(&server, &id),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("sqlsage-cli: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_table_columns_are_padded() {
        let out = render_table(
            &strings(&["name", "total_amount"]),
            &[strings(&["Ada Lovelace", "$1,234.50"]), strings(&["Bo", ""])],
        );
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "name         | total_amount");
        assert_eq!(lines[1], "-------------+-------------");
        assert_eq!(lines[2], "Ada Lovelace | $1,234.50");
        assert_eq!(lines[3], "Bo           |");
    }

    #[test]
    fn test_table_response_parses_and_renders() {
        let body = serde_json::json!({
            "kind": "table",
            "columns": [{ "name": "n", "type_name": "INT8", "kind": "numeric" }],
            "rows": [[3]],
            "display_rows": [["3.00"]],
            "sql": "SELECT count(*) AS n FROM orders",
            "metrics": { "processing_time": 1.5, "query_complexity": "medium", "rows_returned": 1 }
        });
        let response: AskResponse = serde_json::from_value(body).unwrap();
        let out = render_response(&response);

        assert!(out.starts_with("```sql\nSELECT count(*) AS n FROM orders\n```"));
        assert!(out.contains("3.00"));
        assert!(out.ends_with("rows: 1  complexity: medium  time: 1.50s"));
    }

    #[test]
    fn test_text_response_renders_message() {
        let body = serde_json::json!({
            "kind": "text",
            "message": "Please connect to a database first",
            "metrics": { "processing_time": 0.0, "query_complexity": "low" }
        });
        let response: AskResponse = serde_json::from_value(body).unwrap();
        assert_eq!(
            render_response(&response),
            "Please connect to a database first\n\ncomplexity: low  time: 0.00s"
        );
    }
}

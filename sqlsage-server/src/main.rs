use std::sync::Arc;

use clap::Parser;
use sqlsage_core::SqlsageConfig;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use sqlsage_server::server;
use sqlsage_server::state::AppState;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "SQLSAGE_CONFIG", default_value = "sqlsage.toml")]
    config: String,

    /// Check configuration and backends, then exit.
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is a dev convenience; production uses real env vars
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match SqlsageConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let root = config.storage.resolved_root();
    if let Err(e) = std::fs::create_dir_all(&root) {
        eprintln!("Failed to create storage root {}: {}", root.display(), e);
        std::process::exit(1);
    }

    let state = match AppState::from_config(config) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("Failed to create embedding backend: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        println!("✅ Storage root: {}", root.display());
        println!("✅ Embedding backend: {}", state.pipeline.embedder().name());
        if sqlsage_core::embeddings::api_key_from_env().is_some() {
            println!("✅ Gemini API key present");
        } else {
            println!("⚠️  No GOOGLE_API_KEY / GEMINI_API_KEY set, SQL generation will fail");
        }
        println!("✅ SQLSage health check passed");
        return Ok(());
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    if state.config.http.enabled {
        let http_state = state.clone();
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = sqlsage_server::http::start_http_server(http_state, http_shutdown).await {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    let socket_path = state.config.service.socket_path.clone();
    server::run_unix_server(&socket_path, state, tx.subscribe()).await?;

    Ok(())
}

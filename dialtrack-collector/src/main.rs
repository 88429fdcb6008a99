//! dialtrack-collector - telemetry intake service
//!
//! Receives event batches posted by the tracker's HTTP transport and keeps
//! them in a local SQLite database for inspection.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use dialtrack_collector::{build_router, db, AppState, DEFAULT_PORT};

#[derive(Parser, Debug)]
#[command(name = "dialtrack-collector")]
#[command(about = "Telemetry collector for dialtrack call attribution events")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "DIALTRACK_COLLECTOR_PORT")]
    port: u16,

    /// SQLite database file (default: <data_dir>/dialtrack/collector.db)
    #[arg(short, long, env = "DIALTRACK_COLLECTOR_DB")]
    database: Option<PathBuf>,
}

fn default_database_path() -> Result<PathBuf> {
    dirs::data_local_dir()
        .map(|d| d.join("dialtrack").join("collector.db"))
        .context("No platform data directory; pass --database")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Build identification before anything that can stall
    info!(
        "Starting dialtrack-collector v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let db_path = match args.database {
        Some(path) => path,
        None => default_database_path()?,
    };
    info!("Database path: {}", db_path.display());

    let pool = match db::connect(&db_path).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to open event database: {:#}", e);
            return Err(e);
        }
    };

    let app = build_router(AppState::new(pool));

    let addr = format!("127.0.0.1:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("dialtrack-collector listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

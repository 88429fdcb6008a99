//! Event store for the collector
//!
//! One row per received event. Params and user properties are kept as JSON
//! text exactly as the batch carried them.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dialtrack_common::analytics::{StandardEvent, TelemetryBatch};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Default number of events returned by a query
pub const DEFAULT_LIMIT: u32 = 100;

/// Upper bound on events returned by a query
pub const MAX_LIMIT: u32 = 1000;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    client_id TEXT NOT NULL,
    user_id TEXT,
    name TEXT NOT NULL,
    params TEXT NOT NULL,
    user_properties TEXT,
    received_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_name ON events(name);
CREATE INDEX IF NOT EXISTS idx_events_client ON events(client_id);
"#;

/// Open (creating if needed) the event database at `db_path`
pub async fn connect(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::from_str(db_path.to_str().context("Invalid database path")?)
        .context("Failed to parse database path")?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .context("Failed to open event database")?;

    init_schema(&pool).await?;
    info!("Event database ready: {}", db_path.display());
    Ok(pool)
}

/// Single-connection in-memory database
///
/// Every SQLite in-memory connection is its own database, so the pool is
/// pinned to one connection that never idles out.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .context("Failed to open in-memory database")?;
    init_schema(&pool).await?;
    Ok(pool)
}

async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .context("Failed to create event schema")?;
    Ok(())
}

/// Round trip to the database; fails once the pool is closed or the file is gone
pub async fn ping(pool: &SqlitePool) -> Result<()> {
    sqlx::query("SELECT 1 FROM events LIMIT 1")
        .execute(pool)
        .await
        .context("Event database did not answer")?;
    Ok(())
}

/// Store every event of a batch; returns the number of rows written
pub async fn insert_batch(
    pool: &SqlitePool,
    batch: &TelemetryBatch,
    received_at: DateTime<Utc>,
) -> Result<usize> {
    let received = received_at.to_rfc3339();
    let user_properties = batch
        .user_properties
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let mut tx = pool.begin().await?;
    for event in &batch.events {
        let params = serde_json::to_string(&event.params)?;
        sqlx::query(
            "INSERT INTO events (client_id, user_id, name, params, user_properties, received_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&batch.client_id)
        .bind(&batch.user_id)
        .bind(&event.name)
        .bind(params)
        .bind(&user_properties)
        .bind(&received)
        .execute(&mut *tx)
        .await
        .context("Failed to insert event")?;
    }
    tx.commit().await?;

    debug!(client_id = %batch.client_id, count = batch.events.len(), "Stored telemetry batch");
    Ok(batch.events.len())
}

/// Filters for [`query_events`]
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub name: Option<String>,
    pub client_id: Option<String>,
    /// Drop `tracking_session_refreshed` keepalives
    pub exclude_keepalive: bool,
    pub limit: Option<u32>,
}

impl EventFilter {
    /// Requested limit clamped to `1..=MAX_LIMIT`
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

/// Stored event as returned by the query API
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredEvent {
    pub id: i64,
    pub client_id: String,
    pub user_id: Option<String>,
    pub name: String,
    pub params: serde_json::Value,
    pub user_properties: Option<serde_json::Value>,
    pub received_at: String,
}

/// Matching events, newest first
pub async fn query_events(pool: &SqlitePool, filter: &EventFilter) -> Result<Vec<StoredEvent>> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT id, client_id, user_id, name, params, user_properties, received_at FROM events WHERE 1 = 1",
    );
    if let Some(name) = &filter.name {
        query.push(" AND name = ").push_bind(name.clone());
    }
    if let Some(client_id) = &filter.client_id {
        query.push(" AND client_id = ").push_bind(client_id.clone());
    }
    if filter.exclude_keepalive {
        for name in StandardEvent::keepalive_names() {
            query.push(" AND name != ").push_bind(name);
        }
    }
    query
        .push(" ORDER BY id DESC LIMIT ")
        .push_bind(filter.effective_limit() as i64);

    let rows = query
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to query events")?;

    rows.iter()
        .map(|row| -> Result<StoredEvent> {
            let params: String = row.try_get("params")?;
            let user_properties: Option<String> = row.try_get("user_properties")?;
            Ok(StoredEvent {
                id: row.try_get("id")?,
                client_id: row.try_get("client_id")?,
                user_id: row.try_get("user_id")?,
                name: row.try_get("name")?,
                params: serde_json::from_str(&params)?,
                user_properties: user_properties
                    .map(|p| serde_json::from_str(&p))
                    .transpose()?,
                received_at: row.try_get("received_at")?,
            })
        })
        .collect()
}

// SPDX-License-Identifier: GPL-3.0-or-later
pub mod repositories;
pub mod sqlite_adapters;

pub use repositories::{
    ClusterNode, ClusterRepository, ClusterTransaction, RecordingRepository, StorageError,
    StorageResult,
};
pub use sqlite_adapters::{SqliteClusterRepository, SqliteRecordingRepository};

use anyhow::Result;
use messybrainz_config::AppConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Open the configured database, apply migrations, and return the pool.
pub async fn init_database(config: &AppConfig) -> Result<SqlitePool> {
    info!(target: "infrastructure", "initializing database");

    let in_memory = is_in_memory(&config.database.url);
    let db_url = database_url(&config.database.url)?;

    if let Some(path) = db_url.strip_prefix("sqlite://").filter(|_| !in_memory) {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                info!(target: "infrastructure", path = %parent.display(), "created database directory");
            }
        }
    }

    info!(target: "infrastructure", db_url = %db_url, "connecting to database");

    let mut options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .busy_timeout(Duration::from_millis(config.database.busy_timeout_ms));

    let mut pool_options = SqlitePoolOptions::new();
    if in_memory {
        // Every connection to ":memory:" is its own database; keep exactly one alive.
        pool_options = pool_options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    } else {
        options = options.journal_mode(SqliteJournalMode::Wal);
        pool_options = pool_options.max_connections(config.database.pool_max_size);
    }

    let pool = pool_options.connect_with(options).await?;

    info!(target: "infrastructure", db_url = %config.database.url, "running migrations");
    sqlx::migrate!("../../migrations").run(&pool).await?;

    info!(target: "infrastructure", "database initialized successfully");
    Ok(pool)
}

/// Resolve a relative `sqlite://` file path against the working directory.
/// Other URLs pass through unchanged.
fn database_url(url: &str) -> Result<String> {
    if !url.starts_with("sqlite://") || is_in_memory(url) {
        return Ok(url.to_string());
    }

    let path = Path::new(url.trim_start_matches("sqlite://"));
    let absolute_path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    // Forward slashes work for SQLite on all platforms
    let path_str = absolute_path.to_string_lossy().replace('\\', "/");
    Ok(format!("sqlite://{}", path_str))
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

// SPDX-License-Identifier: GPL-3.0-or-later

//! Shared fixtures for the application tests.

use std::path::Path;

use messybrainz_config::AppConfig;
use messybrainz_domain::{CanonicalFields, Recording, RecordingId};
use messybrainz_fingerprint::fingerprint;
use messybrainz_infrastructure::{init_database, RecordingRepository};
use sqlx::SqlitePool;

pub async fn memory_pool() -> SqlitePool {
    let mut config = AppConfig::default();
    config.database.url = "sqlite::memory:".to_string();
    init_database(&config).await.expect("in-memory database")
}

/// A file-backed pool; separate calls on the same path behave like separate processes.
pub async fn file_pool(path: &Path) -> SqlitePool {
    let mut config = AppConfig::default();
    config.database.url = format!("sqlite://{}", path.display());
    config.database.pool_max_size = 4;
    init_database(&config).await.expect("file database")
}

/// Insert a recording directly, bypassing the resolver.
pub async fn seed_recording(recordings: &dyn RecordingRepository, title: &str) -> RecordingId {
    let fields = CanonicalFields {
        artist: "seed artist".to_string(),
        title: title.to_string(),
        ..CanonicalFields::default()
    };
    let recording = Recording::new(fields.clone(), fingerprint(&fields));
    recordings.insert(&recording).await.expect("seed recording");
    recording.id
}

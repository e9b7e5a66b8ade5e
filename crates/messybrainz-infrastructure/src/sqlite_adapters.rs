// SPDX-License-Identifier: GPL-3.0-or-later
use chrono::{DateTime, NaiveDateTime, Utc};
use messybrainz_domain::{CanonicalFields, Fingerprint, Recording, RecordingId};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::repositories::{
    ClusterNode, ClusterRepository, ClusterTransaction, RecordingRepository, StorageError,
    StorageResult,
};

/// SQLx-backed Recording repository
pub struct SqliteRecordingRepository {
    pool: SqlitePool,
}

impl SqliteRecordingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RecordingRepository for SqliteRecordingRepository {
    async fn insert(&self, recording: &Recording) -> StorageResult<()> {
        debug!(target: "repository", recording_id = %recording.id, fingerprint = %recording.fingerprint, "inserting recording");
        let q = r#"
            INSERT INTO recordings (
                id, fingerprint, artist, title, release, recording_mbid,
                track_number, duration_ms, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;

        let fields = &recording.fields;
        let track_number = fields.track_number.map(i64::from);
        let duration_ms = fields
            .duration_ms
            .map(|d| {
                i64::try_from(d)
                    .map_err(|_| StorageError::Corrupt(format!("duration_ms {d} out of range")))
            })
            .transpose()?;

        let result = sqlx::query(q)
            .bind(recording.id.to_string())
            .bind(recording.fingerprint.as_str())
            .bind(&fields.artist)
            .bind(&fields.title)
            .bind(&fields.release)
            .bind(&fields.recording_mbid)
            .bind(track_number)
            .bind(duration_ms)
            .bind(recording.created_at.to_rfc3339())
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                debug!(target: "repository", fingerprint = %recording.fingerprint, "fingerprint already taken");
                Err(StorageError::Conflict {
                    entity: "recording",
                    key: recording.fingerprint.to_string(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get_by_id(&self, id: RecordingId) -> StorageResult<Option<Recording>> {
        debug!(target: "repository", %id, "fetching recording by id");
        let row = sqlx::query("SELECT * FROM recordings WHERE id = ? LIMIT 1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_recording(&r)).transpose()
    }

    async fn get_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> StorageResult<Option<Recording>> {
        debug!(target: "repository", %fingerprint, "fetching recording by fingerprint");
        let row = sqlx::query("SELECT * FROM recordings WHERE fingerprint = ? LIMIT 1")
            .bind(fingerprint.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_recording(&r)).transpose()
    }

    async fn exists(&self, id: RecordingId) -> StorageResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM recordings WHERE id = ? LIMIT 1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn count(&self) -> StorageResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM recordings")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// ============================================================================

/// SQLx-backed cluster forest
pub struct SqliteClusterRepository {
    pool: SqlitePool,
}

impl SqliteClusterRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ClusterRepository for SqliteClusterRepository {
    async fn begin_read(&self) -> StorageResult<Box<dyn ClusterTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteClusterTransaction { tx }))
    }

    async fn begin_write(&self) -> StorageResult<Box<dyn ClusterTransaction>> {
        let mut tx = self.pool.begin().await?;
        // Writing first acquires the write lock before anything is read, so the busy
        // timeout applies and no reader-to-writer upgrade can deadlock.
        let generation: i64 = sqlx::query_scalar(
            "UPDATE cluster_generation SET generation = generation + 1 WHERE id = 1 RETURNING generation",
        )
        .fetch_one(&mut *tx)
        .await?;
        debug!(target: "repository", generation, "cluster write transaction started");
        Ok(Box::new(SqliteClusterTransaction { tx }))
    }
}

pub struct SqliteClusterTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait::async_trait]
impl ClusterTransaction for SqliteClusterTransaction {
    async fn make_set(&mut self, id: RecordingId) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cluster_nodes (recording_id, parent_id, union_rank)
            VALUES (?, ?, 0)
            ON CONFLICT(recording_id) DO NOTHING
            "#,
        )
        .bind(id.to_string())
        .bind(id.to_string())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn node(&mut self, id: RecordingId) -> StorageResult<Option<ClusterNode>> {
        let row = sqlx::query(
            "SELECT recording_id, parent_id, union_rank FROM cluster_nodes WHERE recording_id = ? LIMIT 1",
        )
        .bind(id.to_string())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(|r| row_to_node(&r)).transpose()
    }

    async fn children(&mut self, id: RecordingId) -> StorageResult<Vec<RecordingId>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT recording_id FROM cluster_nodes WHERE parent_id = ? AND recording_id != parent_id",
        )
        .bind(id.to_string())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(|s| parse_recording_id(s)).collect()
    }

    async fn set_parent(&mut self, id: RecordingId, parent: RecordingId) -> StorageResult<()> {
        debug!(target: "repository", %id, %parent, "re-parenting cluster node");
        let result = sqlx::query("UPDATE cluster_nodes SET parent_id = ? WHERE recording_id = ?")
            .bind(parent.to_string())
            .bind(id.to_string())
            .execute(&mut *self.tx)
            .await?;
        expect_one_row(result.rows_affected(), id)
    }

    async fn set_rank(&mut self, id: RecordingId, rank: u32) -> StorageResult<()> {
        let result = sqlx::query("UPDATE cluster_nodes SET union_rank = ? WHERE recording_id = ?")
            .bind(i64::from(rank))
            .bind(id.to_string())
            .execute(&mut *self.tx)
            .await?;
        expect_one_row(result.rows_affected(), id)
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

fn expect_one_row(affected: u64, id: RecordingId) -> StorageResult<()> {
    if affected == 1 {
        Ok(())
    } else {
        Err(StorageError::Corrupt(format!("no cluster node for {id}")))
    }
}

fn parse_recording_id(s: &str) -> StorageResult<RecordingId> {
    Uuid::parse_str(s)
        .map(RecordingId::from_uuid)
        .map_err(|e| StorageError::Corrupt(format!("invalid recording id {s:?}: {e}")))
}

fn parse_dt(s: String) -> StorageResult<DateTime<Utc>> {
    // Try RFC3339 first
    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Ok(dt.with_timezone(&Utc));
    }
    // Fallback to SQLite default CURRENT_TIMESTAMP format: "YYYY-MM-DD HH:MM:SS"
    let ndt = NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| StorageError::Corrupt(format!("invalid timestamp {s:?}: {e}")))?;
    Ok(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
}

fn to_unsigned<T: TryFrom<i64>>(column: &str, value: Option<i64>) -> StorageResult<Option<T>> {
    value
        .map(|v| {
            T::try_from(v).map_err(|_| StorageError::Corrupt(format!("{column} {v} out of range")))
        })
        .transpose()
}

fn row_to_recording(row: &sqlx::sqlite::SqliteRow) -> StorageResult<Recording> {
    let id_str: String = row.try_get("id")?;
    let fingerprint_str: String = row.try_get("fingerprint")?;
    let fingerprint = Fingerprint::from_hex(fingerprint_str.clone())
        .ok_or_else(|| StorageError::Corrupt(format!("invalid fingerprint {fingerprint_str:?}")))?;

    let track_number: Option<i64> = row.try_get("track_number")?;
    let duration_ms: Option<i64> = row.try_get("duration_ms")?;
    let created_at_s: String = row.try_get("created_at")?;

    Ok(Recording {
        id: parse_recording_id(&id_str)?,
        fields: CanonicalFields {
            artist: row.try_get("artist")?,
            title: row.try_get("title")?,
            release: row.try_get("release")?,
            recording_mbid: row.try_get("recording_mbid")?,
            track_number: to_unsigned("track_number", track_number)?,
            duration_ms: to_unsigned("duration_ms", duration_ms)?,
        },
        fingerprint,
        created_at: parse_dt(created_at_s)?,
    })
}

fn row_to_node(row: &sqlx::sqlite::SqliteRow) -> StorageResult<ClusterNode> {
    let id: String = row.try_get("recording_id")?;
    let parent: String = row.try_get("parent_id")?;
    let rank: i64 = row.try_get("union_rank")?;

    Ok(ClusterNode {
        id: parse_recording_id(&id)?,
        parent: parse_recording_id(&parent)?,
        rank: to_unsigned("union_rank", Some(rank))?.unwrap_or_default(),
    })
}

// ============================================================================
// Tests
// ============================================================================

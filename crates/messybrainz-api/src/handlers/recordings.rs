// SPDX-License-Identifier: GPL-3.0-or-later
use axum::{
    extract::{Path, State},
    Json,
};
use messybrainz_application::AppState;
use messybrainz_domain::Recording;
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use super::{parse_recording_id, ApiError, ErrorResponse};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StoredRecordingResponse {
    pub id: String,
    pub artist: String,
    pub title: String,
    pub release: String,
    pub recording_mbid: String,
    pub track_number: Option<u32>,
    pub duration_ms: Option<u64>,
    pub fingerprint: String,
    pub created_at: String,
}

impl From<Recording> for StoredRecordingResponse {
    fn from(recording: Recording) -> Self {
        Self {
            id: recording.id.to_string(),
            artist: recording.fields.artist,
            title: recording.fields.title,
            release: recording.fields.release,
            recording_mbid: recording.fields.recording_mbid,
            track_number: recording.fields.track_number,
            duration_ms: recording.fields.duration_ms,
            fingerprint: recording.fingerprint.to_string(),
            created_at: recording.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AkaResponse {
    pub id: String,
    pub cluster_root: String,
    /// Every other id known to be the same recording, sorted.
    pub equivalents: Vec<String>,
}

/// Get a recording by its MessyBrainz id
#[utoipa::path(
    get,
    path = "/{id}",
    params(
        ("id" = String, Path, description = "MessyBrainz recording id")
    ),
    responses(
        (status = 200, description = "Recording found", body = StoredRecordingResponse),
        (status = 400, description = "Id is not a UUID", body = ErrorResponse),
        (status = 404, description = "Recording not found", body = ErrorResponse),
        (status = 503, description = "Storage unavailable", body = ErrorResponse)
    ),
    tag = "recordings"
)]
pub async fn get_recording(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StoredRecordingResponse>, ApiError> {
    let id = parse_recording_id(&id)?;
    debug!(target: "api", %id, "fetching recording");

    let recording = state.get_recording(id).await?;
    Ok(Json(recording.into()))
}

/// List the ids known to refer to the same recording
#[utoipa::path(
    get,
    path = "/{id}/aka",
    params(
        ("id" = String, Path, description = "MessyBrainz recording id")
    ),
    responses(
        (status = 200, description = "Cluster of the recording", body = AkaResponse),
        (status = 400, description = "Id is not a UUID", body = ErrorResponse),
        (status = 404, description = "Recording not found", body = ErrorResponse),
        (status = 503, description = "Storage unavailable", body = ErrorResponse)
    ),
    tag = "recordings"
)]
pub async fn get_aka(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AkaResponse>, ApiError> {
    let id = parse_recording_id(&id)?;
    debug!(target: "api", %id, "fetching equivalents");

    let cluster = state.cluster_of(id).await?;
    Ok(Json(AkaResponse {
        id: id.to_string(),
        cluster_root: cluster.root.to_string(),
        equivalents: cluster.others(id).iter().map(ToString::to_string).collect(),
    }))
}

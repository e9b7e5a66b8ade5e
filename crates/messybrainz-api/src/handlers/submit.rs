// SPDX-License-Identifier: GPL-3.0-or-later
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use messybrainz_application::{AppState, ResolutionError, ResolvedRecording};
use messybrainz_domain::RawRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use utoipa::ToSchema;

use super::{ApiError, ErrorResponse};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Shape of one submitted listen. Values may be strings or numbers; unknown keys are ignored.
#[derive(Debug, ToSchema)]
pub struct SubmitRecordRequest {
    /// Also accepted as `artist_name`.
    pub artist: Option<String>,
    /// Also accepted as `track_name`.
    pub title: Option<String>,
    /// Also accepted as `release_name`.
    pub release: Option<String>,
    /// Also accepted as `recording_id`.
    pub recording_mbid: Option<String>,
    pub track_number: Option<u32>,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RecordingResponse {
    pub id: String,
    pub artist: String,
    pub title: String,
    pub release: String,
    pub recording_mbid: String,
    pub track_number: Option<u32>,
    pub duration_ms: Option<u64>,
}

impl From<ResolvedRecording> for RecordingResponse {
    fn from(resolved: ResolvedRecording) -> Self {
        Self {
            id: resolved.id.to_string(),
            artist: resolved.fields.artist,
            title: resolved.fields.title,
            release: resolved.fields.release,
            recording_mbid: resolved.fields.recording_mbid,
            track_number: resolved.fields.track_number,
            duration_ms: resolved.fields.duration_ms,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubmitResponse {
    pub payload: Vec<RecordingResponse>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a batch of listens and receive the recording id for each, in order
#[utoipa::path(
    post,
    path = "/submit",
    request_body = Vec<SubmitRecordRequest>,
    responses(
        (status = 200, description = "Every record resolved", body = SubmitResponse),
        (status = 400, description = "Malformed batch or record", body = ErrorResponse),
        (status = 403, description = "Client address not allowed to submit", body = ErrorResponse),
        (status = 503, description = "Storage unavailable", body = ErrorResponse)
    ),
    tag = "recordings"
)]
pub async fn submit_listens(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let Json(body) = body.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

    let Value::Array(items) = body else {
        return Err(ApiError::bad_request("request body must be a JSON array of records"));
    };

    let records = items
        .iter()
        .enumerate()
        .map(|(position, item)| coerce_record(item).map_err(|err| err.at_index(position)))
        .collect::<Result<Vec<_>, _>>()?;

    debug!(target: "api", records = records.len(), "submission received");

    let resolved = state.submit_batch(&records).await?;
    Ok(Json(SubmitResponse {
        payload: resolved.into_iter().map(RecordingResponse::from).collect(),
    }))
}

// ============================================================================
// Boundary coercion
// ============================================================================

/// Turn one loosely typed JSON object into a [`RawRecord`].
pub fn coerce_record(value: &Value) -> Result<RawRecord, ResolutionError> {
    let Value::Object(object) = value else {
        return Err(ResolutionError::invalid("each record must be a JSON object"));
    };

    Ok(RawRecord {
        artist: text_field(object, &["artist", "artist_name"])?,
        title: text_field(object, &["title", "track_name"])?,
        release: text_field(object, &["release", "release_name"])?,
        recording_mbid: text_field(object, &["recording_mbid", "recording_id"])?,
        track_number: integer_field(object, "track_number")?
            .map(|n| {
                u32::try_from(n).map_err(|_| {
                    ResolutionError::invalid(format!("track_number {n} is out of range"))
                })
            })
            .transpose()?,
        duration_ms: integer_field(object, "duration_ms")?,
    })
}

/// First non-null value among `keys`; strings pass through and numbers are stringified.
fn text_field(object: &Map<String, Value>, keys: &[&str]) -> Result<Option<String>, ResolutionError> {
    let Some((key, value)) = first_present(object, keys) else {
        return Ok(None);
    };

    match value {
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        _ => Err(ResolutionError::invalid(format!(
            "{key} must be a string or a number"
        ))),
    }
}

/// A non-negative integer given as a JSON number or a numeric string.
fn integer_field(object: &Map<String, Value>, key: &str) -> Result<Option<u64>, ResolutionError> {
    let Some((_, value)) = first_present(object, &[key]) else {
        return Ok(None);
    };

    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };

    parsed.map(Some).ok_or_else(|| {
        ResolutionError::invalid(format!("{key} must be a non-negative integer"))
    })
}

fn first_present<'a>(
    object: &'a Map<String, Value>,
    keys: &[&'a str],
) -> Option<(&'a str, &'a Value)> {
    keys.iter()
        .find_map(|key| object.get(*key).filter(|v| !v.is_null()).map(|v| (*key, v)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn aliases_and_numbers_are_coerced() {
        let record = coerce_record(&json!({
            "artist_name": "Radiohead",
            "track_name": 15,
            "release_name": "In Rainbows",
            "recording_id": "9a1b2c3d-0000-4000-8000-000000000001",
            "track_number": "3",
            "duration_ms": 240000,
            "listened_at": 1700000000
        }))
        .expect("coerces");

        assert_eq!(record.artist.as_deref(), Some("Radiohead"));
        assert_eq!(record.title.as_deref(), Some("15"));
        assert_eq!(record.release.as_deref(), Some("In Rainbows"));
        assert_eq!(
            record.recording_mbid.as_deref(),
            Some("9a1b2c3d-0000-4000-8000-000000000001")
        );
        assert_eq!(record.track_number, Some(3));
        assert_eq!(record.duration_ms, Some(240_000));
    }

    #[test]
    fn canonical_keys_win_over_aliases() {
        let record = coerce_record(&json!({
            "artist": "Björk",
            "artist_name": "Someone Else",
            "title": "Jóga"
        }))
        .expect("coerces");

        assert_eq!(record.artist.as_deref(), Some("Björk"));
    }

    #[test]
    fn nulls_and_blank_numbers_are_absent() {
        let record = coerce_record(&json!({
            "artist": null,
            "artist_name": "Low",
            "title": "Words",
            "track_number": "",
            "duration_ms": null
        }))
        .expect("coerces");

        assert_eq!(record.artist.as_deref(), Some("Low"));
        assert_eq!(record.track_number, None);
        assert_eq!(record.duration_ms, None);
    }

    #[test]
    fn bad_shapes_are_invalid_input() {
        assert!(coerce_record(&json!("just a string")).is_err());
        assert!(coerce_record(&json!({"artist": ["a", "b"]})).is_err());
        assert!(coerce_record(&json!({"artist": "a", "duration_ms": -5})).is_err());
        assert!(coerce_record(&json!({"artist": "a", "duration_ms": 1.5})).is_err());
        assert!(coerce_record(&json!({"artist": "a", "track_number": 5_000_000_000u64})).is_err());
    }
}

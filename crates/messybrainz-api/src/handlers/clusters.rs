// SPDX-License-Identifier: GPL-3.0-or-later
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use messybrainz_application::AppState;
use messybrainz_domain::MergeOutcome;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use super::{parse_recording_id, ApiError, ErrorResponse};

#[derive(Debug, Deserialize, ToSchema)]
pub struct MergeRequest {
    pub a: String,
    pub b: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MergeResponse {
    /// `merged` or `already_equivalent`.
    pub outcome: String,
    pub root: String,
}

impl From<MergeOutcome> for MergeResponse {
    fn from(outcome: MergeOutcome) -> Self {
        let label = match outcome {
            MergeOutcome::Merged { .. } => "merged",
            MergeOutcome::AlreadyEquivalent { .. } => "already_equivalent",
        };
        Self {
            outcome: label.to_string(),
            root: outcome.root().to_string(),
        }
    }
}

/// Declare two recordings to be the same. Requires the admin API key.
#[utoipa::path(
    post,
    path = "/merge",
    request_body = MergeRequest,
    responses(
        (status = 200, description = "Clusters merged or already equivalent", body = MergeResponse),
        (status = 400, description = "Malformed id", body = ErrorResponse),
        (status = 401, description = "Missing or wrong admin key", body = ErrorResponse),
        (status = 403, description = "Merging is disabled", body = ErrorResponse),
        (status = 404, description = "Recording not found", body = ErrorResponse),
        (status = 503, description = "Storage unavailable", body = ErrorResponse)
    ),
    security(("admin_key" = [])),
    tag = "clusters"
)]
pub async fn merge_recordings(
    State(state): State<AppState>,
    request: Result<Json<MergeRequest>, JsonRejection>,
) -> Result<Json<MergeResponse>, ApiError> {
    let Json(request) = request.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let a = parse_recording_id(&request.a)?;
    let b = parse_recording_id(&request.b)?;

    let outcome = state.merge(a, b).await?;
    info!(target: "api", %a, %b, root = %outcome.root(), "merge requested");
    Ok(Json(outcome.into()))
}

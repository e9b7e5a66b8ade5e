// SPDX-License-Identifier: GPL-3.0-or-later
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use messybrainz_application::AppState;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::handlers::ApiError;

pub const ADMIN_KEY_HEADER: &str = "X-Api-Key";

/// Guards admin routes with `http.admin_api_key`. Without a configured key every call is refused.
pub async fn admin_key_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.http.admin_api_key.as_deref().filter(|k| !k.is_empty())
    else {
        warn!(target: "auth", "admin request refused, no admin key configured");
        return ApiError::new(StatusCode::FORBIDDEN, "admin endpoints are disabled").into_response();
    };

    let provided = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        debug!(target: "auth", "admin key accepted");
        next.run(request).await
    } else {
        warn!(target: "auth", "admin request with missing or wrong key");
        ApiError::new(StatusCode::UNAUTHORIZED, "missing or invalid admin key").into_response()
    }
}

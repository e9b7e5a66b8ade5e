// SPDX-License-Identifier: GPL-3.0-or-later
pub mod handlers;
pub mod middleware;

use axum::{
    http::Method,
    middleware as axum_middleware,
    routing::{get, post},
    Json, Router,
};
use handlers::clusters::{merge_recordings, MergeRequest, MergeResponse, __path_merge_recordings};
use handlers::recordings::{
    get_aka, get_recording, AkaResponse, StoredRecordingResponse, __path_get_aka,
    __path_get_recording,
};
use handlers::submit::{
    submit_listens, RecordingResponse, SubmitRecordRequest, SubmitResponse, __path_submit_listens,
};
use handlers::ErrorResponse;
use messybrainz_application::AppState;
use middleware::admin_key::{admin_key_middleware, ADMIN_KEY_HEADER};
use middleware::ip_filter::ip_filter_middleware;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(Serialize, utoipa::ToSchema)]
struct HealthResponse {
    status: &'static str,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "system"
)]
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

struct AdminKeySecurity;

impl Modify for AdminKeySecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "admin_key",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(ADMIN_KEY_HEADER))),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        submit_listens,
        get_recording,
        get_aka,
        merge_recordings,
    ),
    components(
        schemas(
            HealthResponse,
            SubmitRecordRequest,
            SubmitResponse,
            RecordingResponse,
            StoredRecordingResponse,
            AkaResponse,
            MergeRequest,
            MergeResponse,
            ErrorResponse,
        )
    ),
    modifiers(&AdminKeySecurity),
    tags(
        (name = "system", description = "System health and status endpoints"),
        (name = "recordings", description = "Listen submission and recording lookup"),
        (name = "clusters", description = "Recording equivalence management")
    ),
    info(
        title = "MessyBrainz API",
        version = "0.1.0",
        description = "Listen submission and recording identity service",
    )
)]
pub struct ApiDoc;

async fn openapi_document() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn router(state: AppState) -> Router {
    info!(target: "api", "building router");

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let submit = Router::new()
        .route("/submit", post(submit_listens))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            ip_filter_middleware,
        ));

    let admin = Router::new()
        .route("/merge", post(merge_recordings))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            admin_key_middleware,
        ));

    let public = Router::new()
        .route("/health", get(health))
        .route("/api-doc/openapi.json", get(openapi_document))
        .route("/:id", get(get_recording))
        .route("/:id/aka", get(get_aka))
        .merge(submit)
        .layer(cors);

    Router::new()
        .merge(public)
        .merge(admin)
        .with_state(state)
}

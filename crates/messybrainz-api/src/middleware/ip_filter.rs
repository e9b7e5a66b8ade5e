// SPDX-License-Identifier: GPL-3.0-or-later
use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use messybrainz_application::AppState;
use tracing::{debug, warn};

use crate::handlers::ApiError;

/// Admits submissions only from `http.allowed_submit_ips`. An empty list admits everyone.
pub async fn ip_filter_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let allowed = &state.config.http.allowed_submit_ips;
    if allowed.is_empty() {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| canonical_ip(addr.ip()));

    match peer {
        Some(ip) if allowed.iter().any(|a| canonical_ip(*a) == ip) => {
            debug!(target: "api", %ip, "submission address allowed");
            next.run(request).await
        }
        Some(ip) => {
            warn!(target: "api", %ip, "submission from address outside the allow list");
            ApiError::new(StatusCode::FORBIDDEN, "submissions from this address are not allowed")
                .into_response()
        }
        None => {
            warn!(target: "api", "submission without a known peer address");
            ApiError::new(StatusCode::FORBIDDEN, "submissions from this address are not allowed")
                .into_response()
        }
    }
}

/// Fold IPv4-mapped IPv6 addresses so dual-stack listeners compare equal to IPv4 entries.
fn canonical_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        v4 => v4,
    }
}

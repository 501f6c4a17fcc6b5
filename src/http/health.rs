//! Health endpoints.
//!
//! Cluster probes either hit `/healthz` (or `/_/healthz`) or send the
//! internal header on an arbitrary path. Both get an empty `200` without
//! touching sessions, proxying or page rendering.

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, Request},
    middleware::Next,
    response::Response,
};

use crate::http::response::empty_ok;

/// Header marking internal health-check traffic.
pub const INTERNAL_REQUEST_HEADER: HeaderName = HeaderName::from_static("resf-internal-req");

pub fn is_internal_request(headers: &HeaderMap) -> bool {
    headers
        .get(&INTERNAL_REQUEST_HEADER)
        .is_some_and(|v| v.as_bytes() == b"yes")
}

/// Answer internal health checks before any other stage.
pub async fn internal_health_check(req: Request<Body>, next: Next) -> Response {
    if is_internal_request(req.headers()) {
        return empty_ok();
    }
    next.run(req).await
}

pub async fn healthz() -> Response {
    empty_ok()
}

//! Request identification and classification.
//!
//! # Responsibilities
//! - Name the request-id header shared by tracing and the proxy
//! - Classify requests for metrics labels
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Classification mirrors dispatch order: health, auth, proxy, page

use axum::http::{HeaderMap, HeaderName};

/// Correlation header set on every request and forwarded upstream.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Request ID assigned by the request-id layer, if present.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// What kind of traffic a request is, as a metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Health,
    Auth,
    Proxy,
    Page,
}

impl RequestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestKind::Health => "health",
            RequestKind::Auth => "auth",
            RequestKind::Proxy => "proxy",
            RequestKind::Page => "page",
        }
    }
}

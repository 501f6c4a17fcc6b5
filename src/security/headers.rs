//! Production hardening response headers.
//!
//! # Responsibilities
//! - Add the standard browser hardening headers to every response
//!
//! # Design Decisions
//! - No Content-Security-Policy: bundles ship their own inline bootstrap
//! - Headers are only added when absent, so upstream APIs keep their own
//! - Development responses are left alone

use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

/// Hardening headers and their values.
pub fn hardening_headers() -> [(HeaderName, HeaderValue); 11] {
    [
        ("cross-origin-opener-policy", "same-origin"),
        ("cross-origin-resource-policy", "same-origin"),
        ("origin-agent-cluster", "?1"),
        ("referrer-policy", "no-referrer"),
        ("strict-transport-security", "max-age=15552000; includeSubDomains"),
        ("x-content-type-options", "nosniff"),
        ("x-dns-prefetch-control", "off"),
        ("x-download-options", "noopen"),
        ("x-frame-options", "SAMEORIGIN"),
        ("x-permitted-cross-domain-policies", "none"),
        ("x-xss-protection", "0"),
    ]
    .map(|(name, value)| (HeaderName::from_static(name), HeaderValue::from_static(value)))
}

/// Wrap `router` so every response carries the hardening headers.
pub fn harden(router: Router) -> Router {
    hardening_headers()
        .into_iter()
        .fold(router, |router, (name, value)| {
            router.layer(SetResponseHeaderLayer::if_not_present(name, value))
        })
}

//! History API fallback for client-side routing.
//!
//! A browser navigating to `/builds/42` expects the SPA shell, not a 404.
//! Navigations are recognised by method, `Accept` header and a last path
//! segment without a dot; they are rewritten to `/index.html`.

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, Uri},
};

pub const INDEX_PATH: &str = "/index.html";

fn accepts_html(headers: &HeaderMap) -> bool {
    let Some(accept) = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    !accept.starts_with("application/json")
        && (accept.contains("text/html") || accept.contains("*/*"))
}

fn looks_like_file(path: &str) -> bool {
    path.rsplit('/').next().is_some_and(|segment| segment.contains('.'))
}

/// Whether a request should be answered with the SPA shell.
pub fn wants_index(method: &Method, headers: &HeaderMap, path: &str) -> bool {
    (method == Method::GET || method == Method::HEAD)
        && accepts_html(headers)
        && !looks_like_file(path)
}

/// Rewrite navigations to the index document.
pub async fn history_fallback(mut req: Request<Body>) -> Request<Body> {
    if wants_index(req.method(), req.headers(), req.uri().path()) {
        tracing::trace!(path = %req.uri().path(), "History fallback to index");
        *req.uri_mut() = Uri::from_static(INDEX_PATH);
    }
    req
}

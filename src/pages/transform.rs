//! HTML transform stage.
//!
//! Re-renders every `200 text/html` response through the template engine
//! with the request's parameters. Everything else passes untouched.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::SessionHandle;
use crate::pages::template::{render_html, TemplateContext};

pub fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.trim_start().starts_with("text/html"))
}

pub async fn transform_html(
    State(ctx): State<TemplateContext>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let session = req.extensions().get::<SessionHandle>().cloned();
    let path = req.uri().path().to_string();
    let response = next.run(req).await;

    if response.status() != StatusCode::OK || !is_html(response.headers()) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let source = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(path = %path, error = %e, "Failed to read HTML body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let params = ctx.params(session.as_ref().map(|h| h.0.as_ref()));
    match render_html(&String::from_utf8_lossy(&source), &params) {
        Ok(html) => {
            parts.headers.remove(header::CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(html))
        }
        Err(e) => {
            tracing::error!(path = %path, error = %e, "Failed to render HTML");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render page").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_is_html() {
        let mut headers = HeaderMap::new();
        assert!(!is_html(&headers));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
        assert!(is_html(&headers));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/css"));
        assert!(!is_html(&headers));
    }
}

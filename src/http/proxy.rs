//! API reverse proxy.
//!
//! # Responsibilities
//! - Forward a matched request to its resolved upstream (prefix stripped)
//! - Inject the session's bearer token, refreshing it first when expired
//! - Stream request and response bodies without buffering
//!
//! # Design Decisions
//! - One upstream attempt per request: no retry, no timeout, no caching
//! - Upstream failures answer `502` and are logged with the request id
//! - The client's own `Authorization` header never reaches the upstream

use axum::{
    body::{Body, HttpBody},
    http::{header, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
};
use std::time::Instant;

use crate::auth::{AuthContext, SessionHandle};
use crate::http::request::{request_id, RequestKind};
use crate::http::response::strip_hop_by_hop;
use crate::observability::metrics;
use crate::routing::ResolvedApi;

/// Forward `req` to `route`, with `remainder` as the path below the base.
pub async fn forward(
    client: &reqwest::Client,
    auth: Option<&AuthContext>,
    route: &ResolvedApi,
    remainder: &str,
    req: Request<Body>,
) -> Response {
    let start = Instant::now();
    let request_id = request_id(req.headers()).to_string();

    let session = req.extensions().get::<SessionHandle>().cloned();
    let bearer = match (auth, session) {
        (Some(auth), Some(SessionHandle(session))) => match auth.bearer_token(&session).await {
            Ok(token) => Some(token),
            Err(_) => {
                metrics::record_request(RequestKind::Proxy, StatusCode::FOUND.as_u16(), start);
                return auth.reauthenticate();
            }
        },
        _ => None,
    };

    let (parts, body) = req.into_parts();
    let url = route.upstream_url(remainder, parts.uri.query());

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::AUTHORIZATION);
    match HeaderValue::from_str(&route.authority()) {
        Ok(host) => {
            headers.insert(header::HOST, host);
        }
        Err(_) => {
            headers.remove(header::HOST);
        }
    }
    if let Some(token) = bearer {
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
            headers.insert(header::AUTHORIZATION, value);
        }
    }

    tracing::debug!(
        request_id = %request_id,
        service = %route.service,
        method = %parts.method,
        upstream = %url,
        "Proxying request"
    );

    let mut upstream = client.request(parts.method, url).headers(headers);
    if body.size_hint().exact() != Some(0) {
        upstream = upstream.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }

    match upstream.send().await {
        Ok(resp) => {
            let status = resp.status();
            metrics::record_proxy(route.service.as_str(), status.as_u16());
            metrics::record_request(RequestKind::Proxy, status.as_u16(), start);

            let mut response_headers = resp.headers().clone();
            strip_hop_by_hop(&mut response_headers);

            let mut response = Response::new(Body::from_stream(resp.bytes_stream()));
            *response.status_mut() = status;
            *response.headers_mut() = response_headers;
            response
        }
        Err(e) => {
            tracing::error!(
                request_id = %request_id,
                service = %route.service,
                error = %e,
                "Upstream request failed"
            );
            metrics::record_proxy(route.service.as_str(), StatusCode::BAD_GATEWAY.as_u16());
            metrics::record_request(RequestKind::Proxy, StatusCode::BAD_GATEWAY.as_u16(), start);
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}

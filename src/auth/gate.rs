//! Authentication gate middleware.
//!
//! Runs before dispatch. Health endpoints and the `/oauth2/*` handlers pass
//! straight through; every other request either carries a live session,
//! gets redirected to login (auth required), or continues anonymously.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use url::form_urlencoded;

use crate::auth::context::{AuthContext, SessionHandle};
use crate::http::response::found;

/// Paths that never require a session.
pub fn is_public_path(path: &str) -> bool {
    matches!(path, "/healthz" | "/_/healthz") || path.starts_with("/oauth2/")
}

/// Login URL remembering where the user was going.
pub fn login_location(path_and_query: &str) -> String {
    let return_to: String = form_urlencoded::byte_serialize(path_and_query.as_bytes()).collect();
    format!("/oauth2/login?returnTo={}", return_to)
}

pub async fn auth_gate(
    State(auth): State<Arc<AuthContext>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if is_public_path(req.uri().path()) {
        return next.run(req).await;
    }

    if let Some(session) = auth.current_session(req.headers()) {
        if let Some(suffixes) = &auth.settings().email_suffixes {
            if !session.email_allowed(suffixes) {
                tracing::info!(
                    session = %session.id(),
                    email = ?session.user().email,
                    "Email not allowed, rejecting"
                );
                return found(&auth.settings().reject_redirect_url);
            }
        }
        req.extensions_mut().insert(SessionHandle(session));
        return next.run(req).await;
    }

    if auth.settings().required {
        let target = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        tracing::debug!(path = %req.uri().path(), "No session, redirecting to login");
        return found(&login_location(target));
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_paths() {
        assert!(is_public_path("/healthz"));
        assert!(is_public_path("/_/healthz"));
        assert!(is_public_path("/oauth2/callback"));
        assert!(!is_public_path("/oauth2"));
        assert!(!is_public_path("/healthz/deep"));
        assert!(!is_public_path("/api/healthz"));
    }

    #[test]
    fn test_login_location_encodes_target() {
        assert_eq!(
            login_location("/builds?page=2&q=a b"),
            "/oauth2/login?returnTo=%2Fbuilds%3Fpage%3D2%26q%3Da+b"
        );
    }
}

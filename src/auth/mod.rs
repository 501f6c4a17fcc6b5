//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! /oauth2/login    → handlers.rs (pending login) → provider authorize URL
//! /oauth2/callback → handlers.rs → provider.rs (code exchange, ID token)
//!                  → session.rs (store) → cookie.rs (signed id)
//! any request      → gate.rs (cookie → session, allowlist, login redirect)
//! proxied request  → context.rs (bearer token, single-flight refresh)
//! ```
//!
//! # Design Decisions
//! - Sessions stay server-side; the cookie is an HMAC-signed id
//! - The provider is a trait object so handlers never touch HTTP to the IdP
//! - Refresh failures end the session and send the user back to `/`

pub mod context;
pub mod cookie;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod provider;
pub mod session;

use axum::{routing::get, Router};
use std::sync::Arc;

pub use context::{AuthContext, SessionHandle};
pub use error::AuthError;
pub use provider::{IdentityProvider, OidcProvider};
pub use session::{Session, TokenSet, UserInfo};

/// Callback path registered with the provider.
pub const CALLBACK_PATH: &str = "/oauth2/callback";

/// Router for the `/oauth2/*` endpoints.
pub fn routes(auth: Arc<AuthContext>) -> Router {
    Router::new()
        .route("/oauth2/login", get(handlers::login).post(handlers::login))
        .route(CALLBACK_PATH, get(handlers::callback).post(handlers::callback))
        .route("/oauth2/logout", get(handlers::logout).post(handlers::logout))
        .with_state(auth)
}

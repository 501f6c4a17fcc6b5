//! Shared authentication state.

use axum::http::{header, HeaderMap};
use axum::response::Response;
use std::sync::Arc;
use std::time::Instant;

use crate::auth::cookie::SessionCookies;
use crate::auth::provider::IdentityProvider;
use crate::auth::session::{PendingLogins, Session, SessionStore};
use crate::auth::AuthError;
use crate::config::settings::{AuthSettings, Settings};
use crate::http::response::found;

/// Session attached to a request by the auth gate.
#[derive(Debug, Clone)]
pub struct SessionHandle(pub Arc<Session>);

/// Everything the gate and the OIDC handlers share.
pub struct AuthContext {
    settings: AuthSettings,
    public_base: String,
    cookies: SessionCookies,
    sessions: SessionStore,
    pending: PendingLogins,
    provider: Arc<dyn IdentityProvider>,
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("settings", &self.settings)
            .field("cookies", &self.cookies)
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

impl AuthContext {
    pub fn new(
        settings: &Settings,
        auth: AuthSettings,
        provider: Arc<dyn IdentityProvider>,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            settings: auth,
            public_base: settings.public_url(""),
            cookies: SessionCookies::new(&settings.session_secret, &settings.session)?,
            sessions: SessionStore::new(&settings.session),
            pending: PendingLogins::default(),
            provider,
        })
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    pub fn cookies(&self) -> &SessionCookies {
        &self.cookies
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn pending(&self) -> &PendingLogins {
        &self.pending
    }

    pub fn provider(&self) -> &dyn IdentityProvider {
        self.provider.as_ref()
    }

    /// Absolute URL of a path on this application.
    pub fn public_url(&self, path: &str) -> String {
        format!("{}{}", self.public_base, path)
    }

    /// Live session referenced by the request cookie, if any.
    pub fn current_session(&self, headers: &HeaderMap) -> Option<Arc<Session>> {
        let id = self.cookies.session_id(headers)?;
        self.sessions.get(&id)
    }

    /// Access token to forward upstream, refreshed when expired.
    ///
    /// A failed refresh ends the session.
    pub async fn bearer_token(&self, session: &Session) -> Result<String, AuthError> {
        match session.access_token(self.provider()).await {
            Ok(token) => Ok(token),
            Err(e) => {
                tracing::warn!(session = %session.id(), error = %e, "User has to re-authenticate");
                self.sessions.remove(session.id());
                Err(e)
            }
        }
    }

    /// Redirect to `/` with the session cookie cleared.
    pub fn reauthenticate(&self) -> Response {
        let mut response = found("/");
        response
            .headers_mut()
            .append(header::SET_COOKIE, self.cookies.clear());
        response
    }

    /// Drop expired sessions and stale pending logins.
    pub fn sweep(&self, now: Instant) {
        let sessions = self.sessions.sweep(now);
        let pending = self.pending.sweep(now);
        if sessions > 0 || pending > 0 {
            tracing::debug!(sessions, pending, "Swept expired auth state");
        }
    }
}

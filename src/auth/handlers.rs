//! `/oauth2/*` handlers.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::Response,
    Form,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::context::AuthContext;
use crate::auth::session::PendingLogin;
use crate::auth::AuthError;
use crate::http::response::found;
use crate::observability::metrics;

#[derive(Debug, Default, Deserialize)]
pub struct ReturnTo {
    #[serde(rename = "returnTo")]
    pub return_to: Option<String>,
}

impl ReturnTo {
    /// Local path to continue at. Anything that could leave the site is
    /// replaced by `/`.
    pub fn path(&self) -> String {
        match self.return_to.as_deref() {
            Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
                path.to_string()
            }
            _ => "/".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

pub async fn login(State(auth): State<Arc<AuthContext>>, Query(query): Query<ReturnTo>) -> Response {
    let request = auth.provider().authorization_request();
    auth.pending().insert(
        request.state,
        PendingLogin::new(request.nonce, request.pkce_verifier, query.path()),
    );
    found(request.url.as_str())
}

pub async fn callback(
    State(auth): State<Arc<AuthContext>>,
    headers: HeaderMap,
    Form(params): Form<CallbackParams>,
) -> Result<Response, AuthError> {
    let result = complete_login(&auth, &headers, params).await;
    match &result {
        Ok(_) => metrics::record_login("success"),
        Err(e) => {
            tracing::warn!(error = %e, "Login callback failed");
            metrics::record_login("failure");
        }
    }
    result
}

async fn complete_login(
    auth: &AuthContext,
    headers: &HeaderMap,
    params: CallbackParams,
) -> Result<Response, AuthError> {
    if let Some(error) = params.error {
        let description = params.error_description.unwrap_or_default();
        return Err(AuthError::Provider(format!("{} {}", error, description).trim().to_string()));
    }

    let state = params.state.ok_or(AuthError::InvalidState)?;
    let pending = auth.pending().take(&state).ok_or(AuthError::InvalidState)?;
    let code = params.code.ok_or(AuthError::MissingCode)?;

    let (user, tokens) = auth.provider().exchange_code(&code, &pending).await?;

    if let Some(previous) = auth.cookies().session_id(headers) {
        auth.sessions().remove(&previous);
    }
    let session = auth.sessions().create(user, tokens);
    tracing::info!(
        session = %session.id(),
        sub = %session.user().sub,
        "User logged in"
    );

    let mut response = found(&pending.return_to);
    response
        .headers_mut()
        .append(header::SET_COOKIE, auth.cookies().issue(session.id())?);
    Ok(response)
}

pub async fn logout(
    State(auth): State<Arc<AuthContext>>,
    headers: HeaderMap,
    Query(query): Query<ReturnTo>,
) -> Response {
    let return_to = query.path();
    let session = auth
        .cookies()
        .session_id(&headers)
        .and_then(|id| auth.sessions().remove(&id));

    let location = match session {
        Some(session) => {
            tracing::info!(session = %session.id(), "User logged out");
            let id_token = session.id_token().await;
            auth.provider()
                .logout_url(id_token.as_deref(), &auth.public_url(&return_to))
                .map(|url| url.to_string())
                .unwrap_or(return_to)
        }
        None => return_to,
    };

    let mut response = found(&location);
    response
        .headers_mut()
        .append(header::SET_COOKIE, auth.cookies().clear());
    response
}

//! Authentication errors and their HTTP mapping.

use axum::http::header::InvalidHeaderValue;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::http::response::found;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Provider discovery failed: {0}")]
    Discovery(String),

    #[error("Identity provider returned an error: {0}")]
    Provider(String),

    #[error("Unknown or expired login state")]
    InvalidState,

    #[error("Missing authorization code")]
    MissingCode,

    #[error("Code exchange failed: {0}")]
    Exchange(String),

    #[error("Token response carried no ID token")]
    MissingIdToken,

    #[error("ID token verification failed: {0}")]
    Claims(String),

    #[error("Token refresh failed: {0}")]
    Refresh(String),

    #[error("Session has no refresh token")]
    RefreshUnavailable,

    #[error("Invalid session cookie: {0}")]
    Cookie(#[from] InvalidHeaderValue),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::Discovery(_) | AuthError::Cookie(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
            }
            AuthError::Refresh(_) | AuthError::RefreshUnavailable => found("/"),
            _ => (StatusCode::BAD_REQUEST, self.to_string()).into_response(),
        }
    }
}

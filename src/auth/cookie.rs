//! Signed session cookies.
//!
//! The cookie only carries the session id plus an HMAC-SHA256 tag keyed by
//! the session secret: `<id>.<base64url(tag)>`. Session contents stay on
//! the server.

use axum::http::{header, HeaderMap, HeaderValue};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use cookie::{Cookie, SameSite};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;

use crate::auth::AuthError;
use crate::config::settings::SessionSettings;

type HmacSha256 = Hmac<Sha256>;

/// Issues and verifies the session cookie.
#[derive(Clone)]
pub struct SessionCookies {
    key: Vec<u8>,
    name: String,
    max_age: Duration,
    secure: bool,
    removal: HeaderValue,
}

impl std::fmt::Debug for SessionCookies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCookies")
            .field("name", &self.name)
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

impl SessionCookies {
    pub fn new(secret: &str, settings: &SessionSettings) -> Result<Self, AuthError> {
        let mut cookies = Self {
            key: secret.as_bytes().to_vec(),
            name: settings.cookie_name.clone(),
            max_age: settings.absolute,
            secure: settings.secure_cookie,
            removal: HeaderValue::from_static(""),
        };

        let mut removal = cookies.build(String::new());
        removal.make_removal();
        cookies.removal = set_cookie(&removal)?;
        Ok(cookies)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn build(&self, value: String) -> Cookie<'static> {
        let max_age = i64::try_from(self.max_age.as_secs()).unwrap_or(i64::MAX);
        Cookie::build((self.name.clone(), value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .max_age(cookie::time::Duration::seconds(max_age))
            .build()
    }

    fn tag(&self, id: &str) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key).ok()?;
        mac.update(id.as_bytes());
        Some(mac)
    }

    /// Sign a session id into a cookie value.
    pub fn sign(&self, id: &str) -> String {
        let tag = self
            .tag(id)
            .map(|mac| URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
            .unwrap_or_default();
        format!("{}.{}", id, tag)
    }

    /// Verify a cookie value and return the session id it carries.
    pub fn verify(&self, value: &str) -> Option<String> {
        let (id, tag) = value.rsplit_once('.')?;
        let tag = URL_SAFE_NO_PAD.decode(tag).ok()?;
        self.tag(id)?.verify_slice(&tag).ok()?;
        Some(id.to_string())
    }

    /// Extract and verify the session id from request headers.
    pub fn session_id(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(Cookie::split_parse_encoded)
            .filter_map(Result::ok)
            .find(|cookie| cookie.name() == self.name)
            .and_then(|cookie| self.verify(cookie.value()))
    }

    /// `Set-Cookie` value establishing a session.
    pub fn issue(&self, id: &str) -> Result<HeaderValue, AuthError> {
        set_cookie(&self.build(self.sign(id)))
    }

    /// `Set-Cookie` value removing the session cookie.
    pub fn clear(&self) -> HeaderValue {
        self.removal.clone()
    }
}

fn set_cookie(cookie: &Cookie<'_>) -> Result<HeaderValue, AuthError> {
    Ok(HeaderValue::from_str(&cookie.encoded().to_string())?)
}

//! Server-side sessions.
//!
//! # Responsibilities
//! - Hold user identity and tokens for each logged-in browser
//! - Enforce the rolling (idle) and absolute lifetime bounds
//! - Serialize token refresh per session (single flight)
//! - Track pending logins between `/oauth2/login` and the callback
//!
//! # Design Decisions
//! - Sessions live in a `DashMap`; the browser only holds a signed id
//! - Tokens sit behind a per-session `tokio::sync::Mutex`: the first
//!   request that finds them expired refreshes, later ones reuse the result
//! - Time is passed in (`Instant`) so lifetime rules are testable

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::auth::provider::IdentityProvider;
use crate::auth::AuthError;
use crate::config::settings::SessionSettings;
use crate::observability::metrics;

/// How long a pending login stays valid.
pub const PENDING_LOGIN_TTL: Duration = Duration::from_secs(600);

/// Identity claims kept for the template and the allowlist check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// Tokens issued by the identity provider.
#[derive(Debug, Clone, Default)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    /// `None` when the provider did not send `expires_in`.
    pub expires_at: Option<SystemTime>,
}

impl TokenSet {
    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Fold a refresh response into the current set. Providers that do not
    /// rotate refresh tokens or re-issue ID tokens leave the old ones valid.
    fn apply_refresh(&mut self, refreshed: TokenSet) {
        self.access_token = refreshed.access_token;
        self.expires_at = refreshed.expires_at;
        if refreshed.refresh_token.is_some() {
            self.refresh_token = refreshed.refresh_token;
        }
        if refreshed.id_token.is_some() {
            self.id_token = refreshed.id_token;
        }
    }
}

/// A logged-in browser session.
#[derive(Debug)]
pub struct Session {
    id: String,
    user: UserInfo,
    tokens: AsyncMutex<TokenSet>,
    created_at: Instant,
    last_seen: Mutex<Instant>,
    email_allowed: AtomicBool,
}

impl Session {
    fn new(user: UserInfo, tokens: TokenSet, now: Instant) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user,
            tokens: AsyncMutex::new(tokens),
            created_at: now,
            last_seen: Mutex::new(now),
            email_allowed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user(&self) -> &UserInfo {
        &self.user
    }

    /// Whether the session is within both lifetime bounds at `now`.
    pub fn is_live(&self, now: Instant, rolling: Duration, absolute: Duration) -> bool {
        let last_seen = *self.last_seen.lock().unwrap_or_else(|e| e.into_inner());
        now.saturating_duration_since(self.created_at) < absolute
            && now.saturating_duration_since(last_seen) < rolling
    }

    fn touch(&self, now: Instant) {
        let mut last_seen = self.last_seen.lock().unwrap_or_else(|e| e.into_inner());
        if now > *last_seen {
            *last_seen = now;
        }
    }

    /// Check the email allowlist once; a passing session is remembered.
    pub fn email_allowed(&self, suffixes: &[String]) -> bool {
        if self.email_allowed.load(Ordering::Acquire) {
            return true;
        }
        let allowed = self
            .user
            .email
            .as_deref()
            .is_some_and(|email| suffixes.iter().any(|suffix| email.ends_with(suffix.as_str())));
        if allowed {
            self.email_allowed.store(true, Ordering::Release);
        }
        allowed
    }

    /// ID token for the logout hint.
    pub async fn id_token(&self) -> Option<String> {
        self.tokens.lock().await.id_token.clone()
    }

    /// Current access token, refreshing it first when expired.
    ///
    /// Concurrent callers queue on the token lock, so an expired token is
    /// refreshed at most once per expiry. A failed refresh drops the refresh
    /// token, so callers queued behind it fail without another attempt.
    pub async fn access_token(&self, provider: &dyn IdentityProvider) -> Result<String, AuthError> {
        let mut tokens = self.tokens.lock().await;
        if !tokens.is_expired(SystemTime::now()) {
            return Ok(tokens.access_token.clone());
        }

        let Some(refresh_token) = tokens.refresh_token.clone() else {
            metrics::record_token_refresh("unavailable");
            return Err(AuthError::RefreshUnavailable);
        };

        tracing::debug!(session = %self.id, "Access token expired, refreshing");
        match provider.refresh(&refresh_token).await {
            Ok(refreshed) => {
                tokens.apply_refresh(refreshed);
                metrics::record_token_refresh("success");
                Ok(tokens.access_token.clone())
            }
            Err(e) => {
                tokens.refresh_token = None;
                metrics::record_token_refresh("failure");
                Err(e)
            }
        }
    }
}

/// All live sessions of this process.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<Session>>,
    rolling: Duration,
    absolute: Duration,
}

impl SessionStore {
    pub fn new(settings: &SessionSettings) -> Self {
        Self {
            sessions: DashMap::new(),
            rolling: settings.rolling,
            absolute: settings.absolute,
        }
    }

    /// Create a session after a successful login.
    pub fn create(&self, user: UserInfo, tokens: TokenSet) -> Arc<Session> {
        self.create_at(user, tokens, Instant::now())
    }

    fn create_at(&self, user: UserInfo, tokens: TokenSet, now: Instant) -> Arc<Session> {
        let session = Arc::new(Session::new(user, tokens, now));
        self.sessions.insert(session.id.clone(), session.clone());
        metrics::record_sessions_active(self.sessions.len());
        session
    }

    /// Look up a live session and extend its rolling window.
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.get_at(id, Instant::now())
    }

    pub fn get_at(&self, id: &str, now: Instant) -> Option<Arc<Session>> {
        let session = self.sessions.get(id).map(|s| s.value().clone())?;
        if session.is_live(now, self.rolling, self.absolute) {
            session.touch(now);
            Some(session)
        } else {
            tracing::debug!(session = %id, "Session expired");
            self.remove(id);
            None
        }
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let removed = self.sessions.remove(id).map(|(_, s)| s);
        metrics::record_sessions_active(self.sessions.len());
        removed
    }

    /// Drop every session past either lifetime bound. Returns how many.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, s| s.is_live(now, self.rolling, self.absolute));
        metrics::record_sessions_active(self.sessions.len());
        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// State kept between the login redirect and the callback.
#[derive(Debug, Clone)]
pub struct PendingLogin {
    pub nonce: String,
    pub pkce_verifier: String,
    pub return_to: String,
    created_at: Instant,
}

impl PendingLogin {
    pub fn new(nonce: String, pkce_verifier: String, return_to: String) -> Self {
        Self {
            nonce,
            pkce_verifier,
            return_to,
            created_at: Instant::now(),
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) < PENDING_LOGIN_TTL
    }
}

/// Pending logins keyed by the OAuth2 `state` value.
#[derive(Debug, Default)]
pub struct PendingLogins {
    inner: DashMap<String, PendingLogin>,
}

impl PendingLogins {
    pub fn insert(&self, state: String, pending: PendingLogin) {
        self.inner.insert(state, pending);
    }

    /// Consume the pending login for `state`. Each state works once.
    pub fn take(&self, state: &str) -> Option<PendingLogin> {
        self.inner
            .remove(state)
            .map(|(_, p)| p)
            .filter(|p| p.is_fresh(Instant::now()))
    }

    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.inner.len();
        self.inner.retain(|_, p| p.is_fresh(now));
        before.saturating_sub(self.inner.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::provider::AuthorizationRequest;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use url::Url;

    const DAY: Duration = Duration::from_secs(86_400);

    fn settings() -> SessionSettings {
        SessionSettings {
            cookie_name: "appSession".to_string(),
            rolling: DAY,
            absolute: DAY * 7,
            secure_cookie: false,
        }
    }

    fn user(email: &str) -> UserInfo {
        UserInfo {
            sub: "user-1".to_string(),
            email: Some(email.to_string()),
            name: Some("Test User".to_string()),
            picture: None,
        }
    }

    fn expired_tokens() -> TokenSet {
        TokenSet {
            access_token: "stale".to_string(),
            refresh_token: Some("refresh-1".to_string()),
            id_token: Some("id-1".to_string()),
            expires_at: Some(SystemTime::UNIX_EPOCH),
        }
    }

    struct CountingProvider {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl IdentityProvider for CountingProvider {
        fn authorization_request(&self) -> AuthorizationRequest {
            unreachable!("not used")
        }

        async fn exchange_code(
            &self,
            _code: &str,
            _pending: &PendingLogin,
        ) -> Result<(UserInfo, TokenSet), AuthError> {
            unreachable!("not used")
        }

        async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, AuthError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                return Err(AuthError::Refresh("invalid_grant".to_string()));
            }
            assert_eq!(refresh_token, "refresh-1");
            Ok(TokenSet {
                access_token: format!("fresh-{}", n),
                refresh_token: None,
                id_token: None,
                expires_at: Some(SystemTime::now() + Duration::from_secs(300)),
            })
        }

        fn logout_url(&self, _id_token_hint: Option<&str>, _return_to: &str) -> Option<Url> {
            None
        }
    }

    #[test]
    fn test_rolling_window() {
        let store = SessionStore::new(&settings());
        let start = Instant::now();
        let session = store.create_at(user("a@example.com"), TokenSet::default(), start);

        // Activity keeps extending the idle window.
        assert!(store.get_at(session.id(), start + DAY / 2).is_some());
        assert!(store.get_at(session.id(), start + DAY + DAY / 4).is_some());

        // Idle for a full day ends it.
        assert!(store.get_at(session.id(), start + DAY * 3).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_absolute_window() {
        let store = SessionStore::new(&settings());
        let start = Instant::now();
        let session = store.create_at(user("a@example.com"), TokenSet::default(), start);

        let mut now = start;
        for _ in 0..6 {
            now += DAY - Duration::from_secs(60);
            assert!(store.get_at(session.id(), now).is_some());
        }
        assert!(store.get_at(session.id(), start + DAY * 7).is_none());
    }

    #[test]
    fn test_sweep() {
        let store = SessionStore::new(&settings());
        let start = Instant::now();
        store.create_at(user("a@example.com"), TokenSet::default(), start);
        store.create_at(user("b@example.com"), TokenSet::default(), start + DAY);
        assert_eq!(store.sweep(start + DAY + DAY / 2), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_email_allowlist() {
        let suffixes = vec!["@example.com".to_string()];
        let store = SessionStore::new(&settings());

        let other = store.create(user("user@other.com"), TokenSet::default());
        assert!(!other.email_allowed(&suffixes));

        let allowed = store.create(user("user@example.com"), TokenSet::default());
        assert!(allowed.email_allowed(&suffixes));
        // Remembered after the first pass.
        assert!(allowed.email_allowed(&[]));

        let no_email = store.create(UserInfo::default(), TokenSet::default());
        assert!(!no_email.email_allowed(&suffixes));
    }

    #[test]
    fn test_pending_logins_single_use() {
        let pending = PendingLogins::default();
        pending.insert(
            "state-1".to_string(),
            PendingLogin::new("nonce".to_string(), "verifier".to_string(), "/builds".to_string()),
        );
        assert_eq!(pending.take("state-1").unwrap().return_to, "/builds");
        assert!(pending.take("state-1").is_none());
        assert!(pending.take("unknown").is_none());
    }

    #[tokio::test]
    async fn test_fresh_token_not_refreshed() {
        let provider = CountingProvider { calls: AtomicUsize::new(0), fail: false };
        let store = SessionStore::new(&settings());
        let session = store.create(
            user("a@example.com"),
            TokenSet {
                access_token: "valid".to_string(),
                expires_at: Some(SystemTime::now() + Duration::from_secs(60)),
                ..TokenSet::default()
            },
        );
        assert_eq!(session.access_token(&provider).await.unwrap(), "valid");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrent_refresh_is_single_flight() {
        let provider = Arc::new(CountingProvider { calls: AtomicUsize::new(0), fail: false });
        let store = SessionStore::new(&settings());
        let session = store.create(user("a@example.com"), expired_tokens());

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let session = session.clone();
            let provider = provider.clone();
            tasks.push(tokio::spawn(async move {
                session.access_token(provider.as_ref()).await
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), "fresh-1");
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        // Refresh token kept when the provider does not rotate it.
        assert_eq!(session.id_token().await.as_deref(), Some("id-1"));
    }

    #[tokio::test]
    async fn test_failed_refresh_is_single_flight() {
        let provider = Arc::new(CountingProvider { calls: AtomicUsize::new(0), fail: true });
        let store = SessionStore::new(&settings());
        let session = store.create(user("a@example.com"), expired_tokens());

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let session = session.clone();
            let provider = provider.clone();
            tasks.push(tokio::spawn(async move {
                session.access_token(provider.as_ref()).await
            }));
        }
        let mut failed = 0;
        let mut unavailable = 0;
        for task in tasks {
            match task.await.unwrap() {
                Err(AuthError::Refresh(_)) => failed += 1,
                Err(AuthError::RefreshUnavailable) => unavailable += 1,
                other => panic!("unexpected result: {:?}", other),
            }
        }
        assert_eq!((failed, unavailable), (1, 7));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_and_missing_refresh_token() {
        let provider = CountingProvider { calls: AtomicUsize::new(0), fail: true };
        let store = SessionStore::new(&settings());

        let session = store.create(user("a@example.com"), expired_tokens());
        assert!(matches!(
            session.access_token(&provider).await,
            Err(AuthError::Refresh(_))
        ));

        let no_refresh = store.create(
            user("a@example.com"),
            TokenSet { refresh_token: None, ..expired_tokens() },
        );
        assert!(matches!(
            no_refresh.access_token(&provider).await,
            Err(AuthError::RefreshUnavailable)
        ));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}

//! Shared utilities for integration testing.

#![allow(dead_code)]

use async_trait::async_trait;
use frontend_edge::auth::provider::{AuthorizationRequest, IdentityProvider};
use frontend_edge::auth::session::PendingLogin;
use frontend_edge::auth::{AuthError, TokenSet, UserInfo};
use frontend_edge::config::schema::ApiConfig;
use frontend_edge::{EnvSnapshot, FrontendConfig, FrontendServer, Settings, Shutdown};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use url::Url;

pub const SECRET: &str = "0123456789abcdef0123456789abcdef";

/// Start an upstream that answers every request with a JSON description of
/// what it received: method, path (with query), host and authorization.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    tokio::spawn(async move {
                        let mut reader = BufReader::new(socket);
                        let mut request_line = String::new();
                        if reader.read_line(&mut request_line).await.is_err() {
                            return;
                        }
                        let mut parts = request_line.split_whitespace();
                        let method = parts.next().unwrap_or_default().to_string();
                        let path = parts.next().unwrap_or_default().to_string();

                        let mut host = None;
                        let mut authorization = None;
                        let mut content_length = 0usize;
                        let mut chunked = false;
                        loop {
                            let mut line = String::new();
                            match reader.read_line(&mut line).await {
                                Ok(0) | Err(_) => break,
                                Ok(_) => {}
                            }
                            let line = line.trim_end();
                            if line.is_empty() {
                                break;
                            }
                            if let Some((name, value)) = line.split_once(':') {
                                match name.to_ascii_lowercase().as_str() {
                                    "host" => host = Some(value.trim().to_string()),
                                    "authorization" => authorization = Some(value.trim().to_string()),
                                    "content-length" => content_length = value.trim().parse().unwrap_or(0),
                                    "transfer-encoding" => chunked = value.contains("chunked"),
                                    _ => {}
                                }
                            }
                        }

                        // Drain the request body before answering.
                        let mut received = Vec::new();
                        if chunked {
                            let mut line = String::new();
                            while reader.read_line(&mut line).await.unwrap_or(0) > 0 {
                                if line == "0\r\n" {
                                    break;
                                }
                                line.clear();
                            }
                            let _ = reader.read_line(&mut line).await;
                        } else if content_length > 0 {
                            received.resize(content_length, 0);
                            let _ = reader.read_exact(&mut received).await;
                        }

                        let body = serde_json::json!({
                            "method": method,
                            "path": path,
                            "host": host,
                            "authorization": authorization,
                        })
                        .to_string();
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        let mut socket = reader.into_inner();
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Identity provider double with a programmable refresh outcome.
pub struct FakeProvider {
    pub user: UserInfo,
    pub refresh_calls: AtomicUsize,
    pub fail_refresh: AtomicBool,
    logins: AtomicUsize,
}

impl FakeProvider {
    pub fn new(email: &str) -> Arc<Self> {
        Arc::new(Self {
            user: user(email),
            refresh_calls: AtomicUsize::new(0),
            fail_refresh: AtomicBool::new(false),
            logins: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn authorization_request(&self) -> AuthorizationRequest {
        let n = self.logins.fetch_add(1, Ordering::SeqCst);
        let state = format!("state-{}", n);
        AuthorizationRequest {
            url: Url::parse(&format!("https://id.example.com/authorize?state={}", state)).unwrap(),
            state,
            nonce: format!("nonce-{}", n),
            pkce_verifier: format!("verifier-{}", n),
        }
    }

    async fn exchange_code(
        &self,
        code: &str,
        _pending: &PendingLogin,
    ) -> Result<(UserInfo, TokenSet), AuthError> {
        if code != "good-code" {
            return Err(AuthError::Exchange("invalid_grant".to_string()));
        }
        Ok((self.user.clone(), valid_tokens("login-token")))
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenSet, AuthError> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(50)).await;
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(AuthError::Refresh("invalid_grant".to_string()));
        }
        Ok(valid_tokens(&format!("refreshed-{}", n)))
    }

    fn logout_url(&self, id_token_hint: Option<&str>, return_to: &str) -> Option<Url> {
        let mut url = Url::parse("https://id.example.com/logout").unwrap();
        url.query_pairs_mut()
            .append_pair("id_token_hint", id_token_hint.unwrap_or_default())
            .append_pair("post_logout_redirect_uri", return_to);
        Some(url)
    }
}

pub fn user(email: &str) -> UserInfo {
    UserInfo {
        sub: "user-1".to_string(),
        email: Some(email.to_string()),
        name: Some("Test User".to_string()),
        picture: Some("https://id.example.com/avatar.png".to_string()),
    }
}

pub fn valid_tokens(access_token: &str) -> TokenSet {
    TokenSet {
        access_token: access_token.to_string(),
        refresh_token: Some("refresh-1".to_string()),
        id_token: Some("id-token-1".to_string()),
        expires_at: Some(SystemTime::now() + Duration::from_secs(3600)),
    }
}

pub fn expired_tokens() -> TokenSet {
    TokenSet {
        expires_at: Some(SystemTime::UNIX_EPOCH),
        ..valid_tokens("stale")
    }
}

/// Development config with auth enabled, pages served from `output_dir`.
pub fn dev_config(output_dir: &std::path::Path) -> FrontendConfig {
    let mut config = FrontendConfig::default();
    config.auth.issuer_url = Some("https://id.example.com".to_string());
    config.auth.client_id = Some("frontend".to_string());
    config.pages.dev.output_dir = output_dir.display().to_string();
    config
}

pub fn api(prefix: &str, dev_url: &str) -> ApiConfig {
    ApiConfig {
        prefix: prefix.to_string(),
        service: None,
        prod_url: Some(dev_url.to_string()),
        prod_service: None,
        dev_url: Some(dev_url.to_string()),
    }
}

pub fn resolve(config: FrontendConfig, env: &[(&str, &str)]) -> Settings {
    Settings::resolve(config, &EnvSnapshot::from_pairs(env.iter().copied())).unwrap()
}

/// A server running on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub server_auth: Option<Arc<frontend_edge::auth::AuthContext>>,
    shutdown: Shutdown,
}

impl TestServer {
    pub async fn start(settings: Settings, provider: Option<Arc<FakeProvider>>) -> Self {
        let mut builder = FrontendServer::builder(settings);
        if let Some(provider) = provider {
            builder = builder.identity_provider(provider);
        }
        let server = builder.build().await.unwrap();
        let server_auth = server.auth().cloned();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let rx = shutdown.subscribe();
        tokio::spawn(async move {
            let _ = server.run(listener, rx).await;
        });

        Self {
            addr,
            server_auth,
            shutdown,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Create a session directly and return its `Cookie` header value.
    pub fn login(&self, user: UserInfo, tokens: TokenSet) -> String {
        let auth = self.server_auth.as_ref().expect("auth enabled");
        let session = auth.sessions().create(user, tokens);
        format!("{}={}", auth.cookies().name(), auth.cookies().sign(session.id()))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// HTTP client that reports redirects instead of following them.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

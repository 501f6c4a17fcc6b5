//! Resolved runtime settings.
//!
//! `Settings` is the validated, immutable view of (config file + environment)
//! that every subsystem is built from. Nothing reads the process environment
//! after `Settings::resolve` returns.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::config::env::EnvSnapshot;
use crate::config::loader::ConfigError;
use crate::config::schema::{FrontendConfig, ObservabilityConfig};
use crate::config::validation::{validate_config, ValidationError};
use crate::routing::matcher::ApiPrefix;
use crate::routing::upstream::{resolve_api, ResolvedApi};

/// Session secret used outside production when `RESF_SECRET` is unset.
pub const DEV_SECRET: &str = "dev-secret-123";

/// Minimum production session secret length.
pub const MIN_SECRET_LEN: usize = 32;

/// Production listener port when `PORT` is unset.
pub const DEFAULT_PRODUCTION_PORT: u16 = 8086;

/// Default destination for users rejected by the email allowlist.
pub const DEFAULT_REJECT_REDIRECT_URL: &str = "https://rockylinux.org";

/// Process-wide mode, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Production,
    Development,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Production => f.write_str("production"),
            RunMode::Development => f.write_str("development"),
        }
    }
}

/// Resolved OIDC settings. Present only when auth is not disabled.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Redirect unauthenticated users to login.
    pub required: bool,
    pub issuer_url: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub email_suffixes: Option<Vec<String>>,
    pub reject_redirect_url: String,
}

/// Session lifetime and cookie settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub cookie_name: String,
    pub rolling: Duration,
    pub absolute: Duration,
    /// Mark cookies `Secure` (base URL is https).
    pub secure_cookie: bool,
}

/// Development bundle settings.
#[derive(Debug, Clone)]
pub struct DevSettings {
    pub output_dir: PathBuf,
    pub watch_dir: PathBuf,
    pub build_command: Vec<String>,
    pub debounce: Duration,
}

/// How the SPA shell is served.
#[derive(Debug, Clone)]
pub enum PageSettings {
    Production { bundle_root: PathBuf },
    Development(DevSettings),
}

/// Fully resolved settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub mode: RunMode,
    pub bind_address: SocketAddr,
    pub base_url: Url,
    pub session_secret: String,
    pub auth: Option<AuthSettings>,
    pub session: SessionSettings,
    pub apis: Vec<ResolvedApi>,
    pub pages: PageSettings,
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Resolve a config file against the environment.
    ///
    /// Fails on the production secret rule before anything else so that a
    /// misconfigured production process never gets as far as binding.
    pub fn resolve(config: FrontendConfig, env: &EnvSnapshot) -> Result<Self, ConfigError> {
        let mode = if env.is_production() {
            RunMode::Production
        } else {
            RunMode::Development
        };

        let session_secret = session_secret(mode, env)?;

        let mut config = config;
        if let Some(url) = env.get("FRONTEND_URL") {
            config.base_url = url.to_string();
        }

        let mut errors = match validate_config(&config, mode) {
            Ok(()) => Vec::new(),
            Err(errors) => errors,
        };

        let bind_address = match bind_address(&config, mode, env) {
            Ok(addr) => Some(addr),
            Err(e) => {
                errors.push(e);
                None
            }
        };

        let auth = match auth_settings(&config, env) {
            Ok(auth) => auth,
            Err(e) => {
                errors.push(e);
                None
            }
        };

        let mut apis = Vec::with_capacity(config.apis.len());
        for api in &config.apis {
            // Invalid prefixes were already reported by validation.
            let Ok(prefix) = ApiPrefix::parse(&api.prefix) else {
                continue;
            };
            match resolve_api(api, prefix, mode, env) {
                Ok(resolved) => apis.push(resolved),
                Err(e) => errors.push(e),
            }
        }

        let base_url = Url::parse(&config.base_url).ok();

        match (errors.is_empty(), bind_address, base_url) {
            (true, Some(bind_address), Some(base_url)) => {
                let session = SessionSettings {
                    cookie_name: config.session.cookie_name.clone(),
                    rolling: Duration::from_secs(config.session.rolling_duration_secs),
                    absolute: Duration::from_secs(config.session.absolute_duration_secs),
                    secure_cookie: base_url.scheme() == "https",
                };
                Ok(Self {
                    mode,
                    bind_address,
                    base_url,
                    session_secret,
                    auth,
                    session,
                    apis,
                    pages: page_settings(&config, mode),
                    observability: config.observability,
                })
            }
            _ => Err(ConfigError::Validation(errors)),
        }
    }

    pub fn is_production(&self) -> bool {
        self.mode == RunMode::Production
    }

    /// Absolute URL for a path on this application.
    pub fn public_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }
}

fn session_secret(mode: RunMode, env: &EnvSnapshot) -> Result<String, ConfigError> {
    match (mode, env.get("RESF_SECRET")) {
        (_, Some(secret)) if secret.len() >= MIN_SECRET_LEN => Ok(secret.to_string()),
        (RunMode::Production, _) => Err(ConfigError::Secret(format!(
            "RESF_SECRET has to be at least {} characters in production",
            MIN_SECRET_LEN
        ))),
        (RunMode::Development, Some(secret)) => Ok(secret.to_string()),
        (RunMode::Development, None) => Ok(DEV_SECRET.to_string()),
    }
}

fn bind_address(
    config: &FrontendConfig,
    mode: RunMode,
    env: &EnvSnapshot,
) -> Result<SocketAddr, ValidationError> {
    let raw = match mode {
        RunMode::Production => format!(
            "0.0.0.0:{}",
            env.get("PORT")
                .map(str::to_string)
                .unwrap_or_else(|| DEFAULT_PRODUCTION_PORT.to_string())
        ),
        RunMode::Development => format!("{}:{}", config.listener.host, config.listener.port),
    };
    raw.parse()
        .map_err(|_| ValidationError::InvalidBindAddress(raw.clone()))
}

fn auth_settings(
    config: &FrontendConfig,
    env: &EnvSnapshot,
) -> Result<Option<AuthSettings>, ValidationError> {
    if config.auth.disabled {
        return Ok(None);
    }

    let required = match env.get("DISABLE_AUTH_ENFORCE") {
        Some(value) => value == "false",
        None => !config.auth.disable_enforce,
    };

    let email_suffixes = match env.get("AUTH_OPTIONS_REQUIRE_EMAIL_SUFFIX") {
        Some(raw) => {
            let suffixes: Vec<String> = raw.split(',').map(|s| s.trim().to_string()).collect();
            if suffixes.iter().any(String::is_empty) {
                return Err(ValidationError::EmptyEmailSuffix);
            }
            Some(suffixes)
        }
        None => config.auth.require_email_suffix.clone(),
    };

    let reject_redirect_url = env
        .get("AUTH_REJECT_REDIRECT_URL")
        .map(str::to_string)
        .or_else(|| config.auth.reject_redirect_url.clone())
        .unwrap_or_else(|| DEFAULT_REJECT_REDIRECT_URL.to_string());

    let client_secret = env
        .get("OIDC_CLIENT_SECRET")
        .map(str::to_string)
        .or_else(|| config.auth.client_secret.clone());

    // Presence of issuer and client id is checked by validation.
    Ok(Some(AuthSettings {
        required,
        issuer_url: config.auth.issuer_url.clone().unwrap_or_default(),
        client_id: config.auth.client_id.clone().unwrap_or_default(),
        client_secret,
        email_suffixes,
        reject_redirect_url,
    }))
}

fn page_settings(config: &FrontendConfig, mode: RunMode) -> PageSettings {
    match mode {
        RunMode::Production => PageSettings::Production {
            bundle_root: PathBuf::from(&config.pages.bundle_root),
        },
        RunMode::Development => {
            let dev = &config.pages.dev;
            let output_dir = PathBuf::from(&dev.output_dir);
            let watch_dir = match (&dev.watch_dir, dev.build_command.is_empty()) {
                (Some(dir), _) => PathBuf::from(dir),
                (None, true) => output_dir.clone(),
                (None, false) => PathBuf::from("src"),
            };
            PageSettings::Development(DevSettings {
                output_dir,
                watch_dir,
                build_command: dev.build_command.clone(),
                debounce: Duration::from_millis(dev.debounce_ms),
            })
        }
    }
}

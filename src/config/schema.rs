//! Configuration schema definitions.
//!
//! This module defines the on-disk configuration structure for the frontend
//! server. All types derive Serde traits for deserialization from TOML and
//! every section has defaults so a minimal file is enough to start.

use serde::{Deserialize, Serialize};

/// Root configuration for the frontend edge server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FrontendConfig {
    /// Public URL the application is reached at. Used for the OIDC
    /// callback and post-logout redirects.
    pub base_url: String,

    /// Listener configuration (development bind address and port).
    pub listener: ListenerConfig,

    /// Authentication settings.
    pub auth: AuthConfig,

    /// Session lifetime and cookie settings.
    pub session: SessionConfig,

    /// API prefixes proxied to backend services.
    pub apis: Vec<ApiConfig>,

    /// SPA shell serving.
    pub pages: PagesConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:15000".to_string(),
            listener: ListenerConfig::default(),
            auth: AuthConfig::default(),
            session: SessionConfig::default(),
            apis: Vec::new(),
            pages: PagesConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
///
/// In production the port comes from `PORT` (default 8086); these values
/// only apply in development.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind host (e.g., "127.0.0.1").
    pub host: String,

    /// Development port.
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 15000,
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Turn OIDC off entirely. No sessions, no login routes.
    pub disabled: bool,

    /// Let unauthenticated users through instead of redirecting them to
    /// login. Overridden by `DISABLE_AUTH_ENFORCE`.
    pub disable_enforce: bool,

    /// OIDC issuer base URL.
    pub issuer_url: Option<String>,

    /// OAuth2 client id.
    pub client_id: Option<String>,

    /// OAuth2 client secret. Overridden by `OIDC_CLIENT_SECRET`.
    pub client_secret: Option<String>,

    /// Allowed email suffixes. Overridden by
    /// `AUTH_OPTIONS_REQUIRE_EMAIL_SUFFIX`.
    pub require_email_suffix: Option<Vec<String>>,

    /// Where rejected users are sent. Overridden by
    /// `AUTH_REJECT_REDIRECT_URL`.
    pub reject_redirect_url: Option<String>,
}

/// Session lifetime configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name of the session cookie.
    pub cookie_name: String,

    /// Idle lifetime; every request extends the session by this much.
    pub rolling_duration_secs: u64,

    /// Hard lifetime from login, regardless of activity.
    pub absolute_duration_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "appSession".to_string(),
            rolling_duration_secs: 86_400,
            absolute_duration_secs: 86_400 * 7,
        }
    }
}

/// A proxied API prefix.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Path prefix to match (e.g., "/api").
    pub prefix: String,

    /// Service identifier used for the `URL_<SERVICE>` override. Derived
    /// from the prefix when absent.
    #[serde(default)]
    pub service: Option<String>,

    /// Upstream base URL in production.
    #[serde(default)]
    pub prod_url: Option<String>,

    /// In-cluster service used in production when `prod_url` is absent.
    #[serde(default)]
    pub prod_service: Option<ServiceRef>,

    /// Upstream base URL in development.
    #[serde(default)]
    pub dev_url: Option<String>,
}

/// Reference to an in-cluster HTTP service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceRef {
    /// Service name, e.g. "peridotserver".
    pub name: String,

    /// Namespace used outside of the dev environment.
    pub namespace: String,

    /// Optional port appended to the hostname.
    #[serde(default)]
    pub port: Option<u16>,
}

/// SPA shell serving configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PagesConfig {
    /// Directory whose single subdirectory holds the production bundle.
    pub bundle_root: String,

    /// Development bundle settings.
    pub dev: DevConfig,
}

impl Default for PagesConfig {
    fn default() -> Self {
        Self {
            bundle_root: "/home/app/bundle".to_string(),
            dev: DevConfig::default(),
        }
    }
}

/// Development bundle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DevConfig {
    /// Directory the build writes to and the server serves from.
    pub output_dir: String,

    /// Directory watched for source changes. Defaults to `output_dir`
    /// when there is no build command.
    pub watch_dir: Option<String>,

    /// Command (program + args) that rebuilds the bundle.
    pub build_command: Vec<String>,

    /// Quiet period before a change triggers a rebuild.
    pub debounce_ms: u64,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            output_dir: "dist".to_string(),
            watch_dir: None,
            build_command: Vec::new(),
            debounce_ms: 250,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log filter when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Prometheus endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "frontend_edge=info,tower_http=info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

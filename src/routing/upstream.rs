//! Upstream target resolution.
//!
//! # Responsibilities
//! - Turn an `[[apis]]` entry into a concrete base URL for the running mode
//! - Apply the `URL_<SERVICE>` override
//! - Compute default in-cluster hostnames for service references
//!
//! # Design Decisions
//! - Resolution happens once at startup; handlers only see `ResolvedApi`
//! - Priority: `URL_<SERVICE>` → production/development target by mode
//! - Environment comes from an `EnvSnapshot`, never read at request time

use std::fmt;
use url::Url;

use crate::config::env::EnvSnapshot;
use crate::config::schema::{ApiConfig, ServiceRef};
use crate::config::settings::RunMode;
use crate::config::validation::ValidationError;
use crate::routing::matcher::ApiPrefix;

/// Typed service identifier, e.g. `API` or `MANAGE_API`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceId(String);

impl ServiceId {
    /// Normalize a configured identifier to upper snake case.
    pub fn new(raw: &str) -> Self {
        Self(
            raw.chars()
                .map(|c| match c {
                    '/' | '-' | '.' => '_',
                    c => c.to_ascii_uppercase(),
                })
                .collect(),
        )
    }

    /// Name of the environment variable overriding this service's URL.
    pub fn override_var(&self) -> String {
        format!("URL_{}", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a resolved target URL came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSource {
    EnvOverride,
    Production,
    ProductionService,
    Development,
}

/// A proxied prefix with its upstream fixed for the life of the process.
#[derive(Debug, Clone)]
pub struct ResolvedApi {
    pub prefix: ApiPrefix,
    pub service: ServiceId,
    pub base: Url,
    pub source: TargetSource,
}

impl ResolvedApi {
    /// Build the upstream URL for a stripped remainder.
    ///
    /// The remainder is appended to the base path; an empty remainder maps
    /// to the base path itself (or `/`).
    pub fn upstream_url(&self, remainder: &str, query: Option<&str>) -> Url {
        let mut url = self.base.clone();
        let base_path = self.base.path().trim_end_matches('/');
        let path = match (base_path.is_empty(), remainder.is_empty()) {
            (true, true) => "/".to_string(),
            (false, true) => base_path.to_string(),
            _ => format!("{}{}", base_path, remainder),
        };
        url.set_path(&path);
        url.set_query(query);
        url
    }

    /// Value for the upstream `Host` header.
    pub fn authority(&self) -> String {
        let host = self.base.host_str().unwrap_or_default();
        match self.base.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }
}

/// Resolve one API entry for the given mode.
pub fn resolve_api(
    api: &ApiConfig,
    prefix: ApiPrefix,
    mode: RunMode,
    env: &EnvSnapshot,
) -> Result<ResolvedApi, ValidationError> {
    let service = match &api.service {
        Some(raw) => ServiceId::new(raw),
        None => ServiceId::new(&prefix.derived_service_name()),
    };

    let (raw, source) = if let Some(url) = env.get(&service.override_var()) {
        (url.to_string(), TargetSource::EnvOverride)
    } else {
        match mode {
            RunMode::Production => match (&api.prod_url, &api.prod_service) {
                (Some(url), _) => (url.clone(), TargetSource::Production),
                (None, Some(svc)) => (service_endpoint(svc, env), TargetSource::ProductionService),
                (None, None) => {
                    return Err(ValidationError::MissingUpstream {
                        prefix: prefix.to_string(),
                        mode,
                    })
                }
            },
            RunMode::Development => match &api.dev_url {
                Some(url) => (url.clone(), TargetSource::Development),
                None => {
                    return Err(ValidationError::MissingUpstream {
                        prefix: prefix.to_string(),
                        mode,
                    })
                }
            },
        }
    };

    let base = Url::parse(&raw)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .ok_or_else(|| ValidationError::InvalidUpstream {
            prefix: prefix.to_string(),
            url: raw.clone(),
        })?;

    Ok(ResolvedApi {
        prefix,
        service,
        base,
        source,
    })
}

/// `<svc>-<protocol>-<env>-service`, env from `RESF_ENV` (default `dev`).
pub fn service_name(svc: &str, protocol: &str, env: &EnvSnapshot) -> String {
    let deployment = env.get("RESF_ENV").unwrap_or("dev");
    format!("{}-{}-{}-service", svc, protocol, deployment)
}

/// Namespace a service lives in.
///
/// `RESF_FORCE_NS` wins. In the dev environment the namespace is `RESF_NS`
/// or `<user>-dev`; elsewhere the configured namespace is used.
pub fn namespace(configured: &str, env: &EnvSnapshot) -> String {
    if let Some(forced) = env.get("RESF_FORCE_NS") {
        return forced.to_string();
    }
    match env.get("RESF_ENV") {
        None | Some("dev") => match env.get("RESF_NS") {
            Some(ns) => ns.to_string(),
            None => format!("{}-dev", env.get("USER").unwrap_or("local")),
        },
        Some(_) => configured.to_string(),
    }
}

/// In-cluster HTTP endpoint for a service reference.
pub fn service_endpoint(svc: &ServiceRef, env: &EnvSnapshot) -> String {
    let override_var = format!("{}_HTTP_ENDPOINT_OVERRIDE", ServiceId::new(&svc.name));
    if let Some(endpoint) = env.get(&override_var) {
        return endpoint.to_string();
    }

    let port = svc.port.map(|p| format!(":{}", p)).unwrap_or_default();
    format!(
        "http://{}.{}.svc.cluster.local{}",
        service_name(&svc.name, "http", env),
        namespace(&svc.namespace, env),
        port
    )
}

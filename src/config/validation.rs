//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate API prefixes and detect overlapping routes
//! - Check that enabled features have what they need (issuer, client id)
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function of the config and run mode
//! - Runs before settings are resolved and before anything binds

use thiserror::Error;
use url::Url;

use crate::config::schema::FrontendConfig;
use crate::config::settings::RunMode;
use crate::routing::matcher::ApiPrefix;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("base_url {0:?} is not an absolute http(s) URL")]
    InvalidBaseUrl(String),

    #[error("bind address {0:?} is invalid")]
    InvalidBindAddress(String),

    #[error("api prefix {prefix:?} {reason}")]
    InvalidPrefix { prefix: String, reason: String },

    #[error("api prefixes {first:?} and {second:?} overlap")]
    OverlappingPrefixes { first: String, second: String },

    #[error("api prefix {prefix:?} has no upstream for {mode} mode")]
    MissingUpstream { prefix: String, mode: RunMode },

    #[error("api prefix {prefix:?} has invalid upstream URL {url:?}")]
    InvalidUpstream { prefix: String, url: String },

    #[error("auth is enabled but {0} is not set")]
    MissingAuthField(&'static str),

    #[error("email suffix allowlist contains an empty entry")]
    EmptyEmailSuffix,

    #[error("session durations must be non-zero and rolling <= absolute")]
    InvalidSessionDurations,

    #[error("development build_command is set but its program is empty")]
    EmptyBuildCommand,
}

/// Validate a configuration for the given mode.
pub fn validate_config(config: &FrontendConfig, mode: RunMode) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match Url::parse(&config.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => errors.push(ValidationError::InvalidBaseUrl(config.base_url.clone())),
    }

    let mut prefixes: Vec<ApiPrefix> = Vec::with_capacity(config.apis.len());
    for api in &config.apis {
        match ApiPrefix::parse(&api.prefix) {
            Ok(prefix) => {
                if let Some(existing) = prefixes.iter().find(|p| p.overlaps(&prefix)) {
                    errors.push(ValidationError::OverlappingPrefixes {
                        first: existing.to_string(),
                        second: prefix.to_string(),
                    });
                }
                prefixes.push(prefix);
            }
            Err(reason) => errors.push(ValidationError::InvalidPrefix {
                prefix: api.prefix.clone(),
                reason: reason.to_string(),
            }),
        }
    }

    if !config.auth.disabled {
        if config.auth.issuer_url.as_deref().map_or(true, str::is_empty) {
            errors.push(ValidationError::MissingAuthField("auth.issuer_url"));
        }
        if config.auth.client_id.as_deref().map_or(true, str::is_empty) {
            errors.push(ValidationError::MissingAuthField("auth.client_id"));
        }
        if let Some(suffixes) = &config.auth.require_email_suffix {
            if suffixes.iter().any(|s| s.trim().is_empty()) {
                errors.push(ValidationError::EmptyEmailSuffix);
            }
        }
    }

    let session = &config.session;
    if session.rolling_duration_secs == 0
        || session.absolute_duration_secs == 0
        || session.rolling_duration_secs > session.absolute_duration_secs
    {
        errors.push(ValidationError::InvalidSessionDurations);
    }

    if mode == RunMode::Development {
        if let Some(program) = config.pages.dev.build_command.first() {
            if program.trim().is_empty() {
                errors.push(ValidationError::EmptyBuildCommand);
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ApiConfig;

    fn api(prefix: &str) -> ApiConfig {
        ApiConfig {
            prefix: prefix.to_string(),
            service: None,
            prod_url: Some("http://prod".to_string()),
            prod_service: None,
            dev_url: Some("http://dev".to_string()),
        }
    }

    fn valid() -> FrontendConfig {
        let mut config = FrontendConfig::default();
        config.auth.issuer_url = Some("https://id.example.com".to_string());
        config.auth.client_id = Some("frontend".to_string());
        config.apis = vec![api("/api"), api("/manage/api")];
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid(), RunMode::Development).is_ok());
        assert!(validate_config(&valid(), RunMode::Production).is_ok());
    }

    #[test]
    fn test_overlapping_prefixes_rejected() {
        let mut config = valid();
        config.apis.push(api("/api/v2"));
        let errors = validate_config(&config, RunMode::Development).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::OverlappingPrefixes {
                first: "/api".to_string(),
                second: "/api/v2".to_string(),
            }]
        );
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = valid();
        config.base_url = "nowhere".to_string();
        config.auth.client_id = None;
        config.apis.push(api("api"));
        config.apis.push(api("/"));

        let errors = validate_config(&config, RunMode::Development).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::InvalidBaseUrl("nowhere".to_string())));
        assert!(errors.contains(&ValidationError::MissingAuthField("auth.client_id")));
    }

    #[test]
    fn test_auth_fields_ignored_when_disabled() {
        let mut config = FrontendConfig::default();
        config.auth.disabled = true;
        assert!(validate_config(&config, RunMode::Development).is_ok());
    }

    #[test]
    fn test_empty_suffix_rejected() {
        let mut config = valid();
        config.auth.require_email_suffix = Some(vec!["@example.com".to_string(), " ".to_string()]);
        let errors = validate_config(&config, RunMode::Production).unwrap_err();
        assert_eq!(errors, vec![ValidationError::EmptyEmailSuffix]);
    }

    #[test]
    fn test_session_durations() {
        let mut config = valid();
        config.session.rolling_duration_secs = config.session.absolute_duration_secs + 1;
        let errors = validate_config(&config, RunMode::Production).unwrap_err();
        assert_eq!(errors, vec![ValidationError::InvalidSessionDurations]);
    }
}

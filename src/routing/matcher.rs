//! API prefix matching.
//!
//! # Responsibilities
//! - Match a request path against a configured API prefix
//! - Strip the prefix exactly once, returning the remainder
//!
//! # Design Decisions
//! - Matching is per path segment: `/api` matches `/api` and `/api/x`,
//!   never `/apix`
//! - Path matching is case-sensitive
//! - No regex; a prefix is a plain string compared byte-wise

use std::fmt;

/// A validated API path prefix such as `/api` or `/manage/api`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiPrefix(String);

/// Why a prefix string was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixError {
    MissingLeadingSlash,
    Root,
    TrailingSlash,
}

impl fmt::Display for PrefixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefixError::MissingLeadingSlash => write!(f, "must start with '/'"),
            PrefixError::Root => write!(f, "must not be '/'"),
            PrefixError::TrailingSlash => write!(f, "must not end with '/'"),
        }
    }
}

impl ApiPrefix {
    /// Parse and validate a prefix.
    pub fn parse(raw: &str) -> Result<Self, PrefixError> {
        if !raw.starts_with('/') {
            return Err(PrefixError::MissingLeadingSlash);
        }
        if raw == "/" {
            return Err(PrefixError::Root);
        }
        if raw.ends_with('/') {
            return Err(PrefixError::TrailingSlash);
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Strip this prefix from `path`.
    ///
    /// Returns the remainder (empty or starting with `/`) when the path is
    /// under this prefix.
    pub fn strip<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(self.0.as_str())?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }

    /// True when one prefix would capture paths of the other.
    pub fn overlaps(&self, other: &ApiPrefix) -> bool {
        self.strip(other.as_str()).is_some() || other.strip(self.as_str()).is_some()
    }

    /// Service identifier derived from the prefix: `/manage/api` becomes
    /// `MANAGE_API`.
    pub fn derived_service_name(&self) -> String {
        self.0[1..]
            .chars()
            .map(|c| match c {
                '/' | '-' | '.' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect()
    }
}

impl fmt::Display for ApiPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rules() {
        assert!(ApiPrefix::parse("/api").is_ok());
        assert!(ApiPrefix::parse("/manage/api").is_ok());
        assert_eq!(ApiPrefix::parse("api"), Err(PrefixError::MissingLeadingSlash));
        assert_eq!(ApiPrefix::parse("/"), Err(PrefixError::Root));
        assert_eq!(ApiPrefix::parse("/api/"), Err(PrefixError::TrailingSlash));
    }

    #[test]
    fn test_strip_segments() {
        let prefix = ApiPrefix::parse("/api").unwrap();

        assert_eq!(prefix.strip("/api"), Some(""));
        assert_eq!(prefix.strip("/api/"), Some("/"));
        assert_eq!(prefix.strip("/api/v1/builds"), Some("/v1/builds"));
        assert_eq!(prefix.strip("/apix"), None);
        assert_eq!(prefix.strip("/API/v1"), None);
        assert_eq!(prefix.strip("/other/api"), None);
    }

    #[test]
    fn test_strip_reconstructs_original() {
        let prefix = ApiPrefix::parse("/manage/api").unwrap();
        for path in ["/manage/api", "/manage/api/", "/manage/api/a/b/c", "/manage/api/api/x"] {
            let rest = prefix.strip(path).unwrap();
            assert_eq!(format!("{}{}", prefix, rest), path);
        }
    }

    #[test]
    fn test_overlap() {
        let api = ApiPrefix::parse("/api").unwrap();
        let nested = ApiPrefix::parse("/api/v2").unwrap();
        let manage = ApiPrefix::parse("/manage/api").unwrap();
        let apix = ApiPrefix::parse("/apix").unwrap();

        assert!(api.overlaps(&nested));
        assert!(nested.overlaps(&api));
        assert!(api.overlaps(&api.clone()));
        assert!(!api.overlaps(&manage));
        assert!(!api.overlaps(&apix));
    }

    #[test]
    fn test_derived_service_name() {
        assert_eq!(ApiPrefix::parse("/api").unwrap().derived_service_name(), "API");
        assert_eq!(
            ApiPrefix::parse("/manage/api").unwrap().derived_service_name(),
            "MANAGE_API"
        );
        assert_eq!(
            ApiPrefix::parse("/build-logs").unwrap().derived_service_name(),
            "BUILD_LOGS"
        );
    }
}

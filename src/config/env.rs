//! Process environment snapshot.
//!
//! The environment is read once at startup and handed around as a value so
//! that resolution is a pure function of (file, environment). Tests build
//! snapshots from literal pairs instead of mutating the process environment.

use std::collections::HashMap;
use std::ffi::OsString;

/// `NODE_ENV` value that selects production mode.
pub const PRODUCTION: &str = "production";

/// Immutable copy of the environment variables relevant at startup.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the current process environment.
    ///
    /// Variables whose name or value is not valid Unicode are skipped.
    pub fn from_process() -> Self {
        Self::from_os_pairs(std::env::vars_os())
    }

    fn from_os_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        Self {
            vars: pairs
                .into_iter()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        }
    }

    /// Build a snapshot from explicit key/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Look up a variable. Empty values count as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// True when `NODE_ENV=production`.
    pub fn is_production(&self) -> bool {
        self.get("NODE_ENV") == Some(PRODUCTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_values_are_unset() {
        let env = EnvSnapshot::from_pairs([("RESF_SECRET", ""), ("PORT", "9000")]);
        assert_eq!(env.get("RESF_SECRET"), None);
        assert_eq!(env.get("PORT"), Some("9000"));
        assert_eq!(env.get("MISSING"), None);
    }

    #[test]
    fn test_production_flag() {
        assert!(EnvSnapshot::from_pairs([("NODE_ENV", "production")]).is_production());
        assert!(!EnvSnapshot::from_pairs([("NODE_ENV", "development")]).is_production());
        assert!(!EnvSnapshot::default().is_production());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_unicode_variables_skipped() {
        use std::os::unix::ffi::OsStringExt;

        let env = EnvSnapshot::from_os_pairs([
            (OsString::from("PORT"), OsString::from("9000")),
            (OsString::from("BROKEN"), OsString::from_vec(vec![0xff, 0xfe])),
            (OsString::from_vec(vec![0xff]), OsString::from("value")),
        ]);
        assert_eq!(env.get("PORT"), Some("9000"));
        assert_eq!(env.get("BROKEN"), None);
        assert_eq!(env.vars.len(), 1);
    }
}

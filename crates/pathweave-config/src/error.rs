//! Configuration errors.

use std::path::PathBuf;

use thiserror::Error;

/// Where a configuration layer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Global,
    Local,
    Explicit,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ConfigSource::Global => "global",
            ConfigSource::Local => "local",
            ConfigSource::Explicit => "explicit",
        })
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {source_kind} config '{path}': {source}")]
    Unreadable {
        source_kind: ConfigSource,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{source_kind} config '{path}' is not valid TOML: {source}")]
    Malformed {
        source_kind: ConfigSource,
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A merged value is out of range
    #[error("{key} {reason}")]
    Invalid {
        key: &'static str,
        reason: &'static str,
    },
}

impl ConfigError {
    /// Dotted key of an out-of-range value.
    pub fn key(&self) -> Option<&'static str> {
        match self {
            ConfigError::Invalid { key, .. } => Some(*key),
            _ => None,
        }
    }

    pub(crate) fn positive(key: &'static str) -> Self {
        ConfigError::Invalid {
            key,
            reason: "must be greater than zero",
        }
    }
}

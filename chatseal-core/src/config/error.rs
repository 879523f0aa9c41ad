//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A `CHATSEAL_*` override could not be parsed; `key` is the variable name
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    /// A loaded value is out of range; `field` is `section.key`
    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    /// Variable or field the error is about, if it names one
    pub fn key(&self) -> Option<&str> {
        match self {
            ConfigError::InvalidValue { key, .. } => Some(key),
            ConfigError::Invalid { field, .. } => Some(field),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_names_variable() {
        let err = ConfigError::InvalidValue {
            key: "CHATSEAL_CACHE_YIELD_EVERY".to_string(),
            reason: "invalid digit found in string".to_string(),
        };
        assert_eq!(err.key(), Some("CHATSEAL_CACHE_YIELD_EVERY"));
        assert_eq!(
            err.to_string(),
            "Invalid value for CHATSEAL_CACHE_YIELD_EVERY: invalid digit found in string"
        );
    }

    #[test]
    fn test_read_error_shows_path() {
        let err = ConfigError::Read {
            path: PathBuf::from("/etc/chatseal.toml"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().starts_with("Failed to read /etc/chatseal.toml:"));
        assert_eq!(err.key(), None);
    }
}

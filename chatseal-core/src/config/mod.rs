//! Configuration management for chatseal
//!
//! Defaults, TOML file load/save and `CHATSEAL_*` environment overrides.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

mod error;

pub use error::ConfigError;

/// What to do when a participant's public key (or our own) is unavailable
/// at send time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingKeyPolicy {
    /// Refuse to send; the caller surfaces the error
    #[default]
    Block,
    /// Send the message as plaintext and log a warning
    Degrade,
}

impl FromStr for MissingKeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "block" => Ok(MissingKeyPolicy::Block),
            "degrade" => Ok(MissingKeyPolicy::Degrade),
            other => Err(format!("expected 'block' or 'degrade', got '{}'", other)),
        }
    }
}

impl fmt::Display for MissingKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingKeyPolicy::Block => write!(f, "block"),
            MissingKeyPolicy::Degrade => write!(f, "degrade"),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub keystore: KeystoreConfig,
    pub crypto: CryptoConfig,
    pub cache: CacheConfig,
    pub display: DisplayConfig,
    pub logging: LoggingConfig,
}

/// Local key persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeystoreConfig {
    /// Key ring file
    pub path: PathBuf,

    /// Name of the environment variable holding the key ring password;
    /// unset means the ring is stored unencrypted
    pub password_env: Option<String>,
}

/// Send/receive policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    pub missing_key_policy: MissingKeyPolicy,

    /// Largest plaintext accepted for encryption, in bytes
    pub max_plaintext_bytes: usize,
}

/// Reconciliation pass tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Messages decrypted between cooperative yields (0 = never yield)
    pub yield_every: usize,
}

/// Localised placeholders shown instead of message text
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub deleted_placeholder: String,
    pub undecryptable_placeholder: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for KeystoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/keyring.bin"),
            password_env: None,
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            missing_key_policy: MissingKeyPolicy::Block,
            max_plaintext_bytes: 64 * 1024, // 64 KiB
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { yield_every: 16 }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            deleted_placeholder: "This message was deleted".to_string(),
            undecryptable_placeholder: "This message could not be decrypted".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl KeystoreConfig {
    /// Password from the configured environment variable, if any
    pub fn password(&self) -> Option<String> {
        self.password_env
            .as_ref()
            .and_then(|name| env::var(name).ok())
    }
}

/// Parse the override in `key`, if set
fn env_override<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: CHATSEAL_<SECTION>_<KEY>
    /// Example: CHATSEAL_CRYPTO_MISSING_KEY_POLICY=degrade
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `CHATSEAL_*` variables onto this configuration
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(path) = env_override::<PathBuf>("CHATSEAL_KEYSTORE_PATH")? {
            self.keystore.path = path;
        }
        if let Some(name) = env_override::<String>("CHATSEAL_KEYSTORE_PASSWORD_ENV")? {
            self.keystore.password_env = Some(name);
        }

        if let Some(policy) = env_override("CHATSEAL_CRYPTO_MISSING_KEY_POLICY")? {
            self.crypto.missing_key_policy = policy;
        }
        if let Some(max) = env_override("CHATSEAL_CRYPTO_MAX_PLAINTEXT_BYTES")? {
            self.crypto.max_plaintext_bytes = max;
        }

        if let Some(yield_every) = env_override("CHATSEAL_CACHE_YIELD_EVERY")? {
            self.cache.yield_every = yield_every;
        }

        if let Some(text) = env_override("CHATSEAL_DISPLAY_DELETED_PLACEHOLDER")? {
            self.display.deleted_placeholder = text;
        }
        if let Some(text) = env_override("CHATSEAL_DISPLAY_UNDECRYPTABLE_PLACEHOLDER")? {
            self.display.undecryptable_placeholder = text;
        }

        if let Some(level) = env_override("CHATSEAL_LOG_LEVEL")? {
            self.logging.level = level;
        }
        if let Some(json) = env_override("CHATSEAL_LOG_JSON")? {
            self.logging.json_format = json;
        }

        Ok(())
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.keystore.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "keystore.path",
                reason: "must not be empty".to_string(),
            });
        }

        if self.crypto.max_plaintext_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "crypto.max_plaintext_bytes",
                reason: "must be greater than 0".to_string(),
            });
        }

        if self.display.deleted_placeholder.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "display.deleted_placeholder",
                reason: "must not be empty".to_string(),
            });
        }
        if self.display.undecryptable_placeholder.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "display.undecryptable_placeholder",
                reason: "must not be empty".to_string(),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Invalid {
                field: "logging.level",
                reason: format!("unknown level '{}'", self.logging.level),
            });
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;

        std::fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

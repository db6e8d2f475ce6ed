//! Client configuration.
//!
//! [`ClientConfig`] is loaded from TOML (usually
//! `$XDG_CONFIG_HOME/resumable/config.toml`), then overridden by CLI flags.
//! Every field has a default so an empty file is a valid config.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::download::{CONNECT_TIMEOUT_SECS, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`ClientConfig`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid config value for `{field}`: {message}")]
    Invalid {
        /// Offending field name.
        field: &'static str,
        /// What was wrong.
        message: String,
    },
}

/// Cache behaviour requested from servers and proxies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePolicy {
    /// Send no cache directives.
    Default,
    /// Send `Cache-Control: no-cache` and `Pragma: no-cache`.
    #[default]
    Bypass,
}

/// Settings shared by every session and request made through one client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Directory that download destinations are resolved under.
    pub base_dir: PathBuf,
    /// Copy chunk size in bytes; also the progress granularity.
    pub chunk_size: usize,
    /// TCP/TLS connect timeout.
    pub connect_timeout_secs: u64,
    /// Per-read timeout on the body. `None` means transfers may run indefinitely.
    pub read_timeout_secs: Option<u64>,
    /// Proxy URL applied to all schemes.
    pub proxy: Option<String>,
    /// Keep a cookie jar for the lifetime of the client.
    pub cookies: bool,
    /// Cache directives sent with every request.
    pub cache: CachePolicy,
    /// Accept and transparently decode gzip/deflate bodies.
    pub decompress: bool,
    /// Skip TLS certificate verification.
    pub accept_invalid_certs: bool,
    /// User-Agent override.
    pub user_agent: Option<String>,
    /// Extra headers sent with every request unless the request sets them.
    pub default_headers: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            chunk_size: DEFAULT_CHUNK_SIZE,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: None,
            proxy: None,
            cookies: true,
            cache: CachePolicy::default(),
            decompress: true,
            accept_invalid_certs: false,
            user_agent: None,
            default_headers: BTreeMap::new(),
        }
    }
}

impl ClientConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys, and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Loads the default config file if one exists, else returns defaults.
    ///
    /// # Errors
    ///
    /// Returns an error only when a file exists and is unreadable or invalid.
    pub fn load_default() -> Result<Self, ConfigError> {
        match default_config_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(ConfigError::Invalid {
                field: "chunk_size",
                message: format!(
                    "{}. Expected range: 1..={MAX_CHUNK_SIZE}",
                    self.chunk_size
                ),
            });
        }
        validate_timeout_secs("connect_timeout_secs", Some(self.connect_timeout_secs))?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        if let Some(proxy) = &self.proxy
            && url::Url::parse(proxy).is_err()
        {
            return Err(ConfigError::Invalid {
                field: "proxy",
                message: format!("{proxy:?} is not a URL"),
            });
        }
        Ok(())
    }
}

fn validate_timeout_secs(field: &'static str, value: Option<u64>) -> Result<(), ConfigError> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        return Err(ConfigError::Invalid {
            field,
            message: format!("{value}. Expected range: 1..=3600"),
        });
    }
    Ok(())
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/resumable/config.toml`
/// 2. `$HOME/.config/resumable/config.toml`
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("resumable")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("resumable")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

//! Manager configuration loaded from a TOML file.
//!
//! ```toml
//! database_url = "postgres://monitor@localhost/monitor"
//! ipc_socket = "/run/monitor/proxy_group.sock"
//! status_check_interval_secs = 5
//!
//! [user_macros]
//! FAILOVER_DELAY = "2m"
//!
//! [process]
//! process_num = 1
//! ```

use crate::proxy_group::adapters::macros::UserMacroTable;
use crate::proxy_group::services::{ManagerSettings, ProcessIdentity};
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use chrono::TimeDelta;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read configuration {path}: {source}")]
    Read {
        /// Configuration path.
        path: Utf8PathBuf,
        /// Underlying error.
        source: Arc<std::io::Error>,
    },

    /// The file is not valid TOML for [`ManagerConfig`].
    #[error("cannot parse configuration: {0}")]
    Parse(Arc<toml::de::Error>),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration of the proxy group manager process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManagerConfig {
    /// `PostgreSQL` connection URL.
    pub database_url: String,
    /// Maximum number of pooled database connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
    /// Path of the Unix socket the update service listens on.
    pub ipc_socket: Utf8PathBuf,
    /// Seconds between health evaluations.
    #[serde(default = "default_status_check_interval_secs")]
    pub status_check_interval_secs: u64,
    /// Longest sleep between loop iterations, in seconds.
    #[serde(default = "default_loop_sleep_secs")]
    pub loop_sleep_secs: u64,
    /// Seconds between flush attempts while the database is down.
    #[serde(default = "default_flush_retry_secs")]
    pub flush_retry_secs: u64,
    /// Park the process forever after shutdown instead of exiting.
    #[serde(default)]
    pub park_after_shutdown: bool,
    /// Tracing filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// User macros available to group settings.
    #[serde(default)]
    pub user_macros: BTreeMap<String, String>,
    /// Identity of the hosting process.
    #[serde(default)]
    pub process: ProcessIdentity,
}

const fn default_pool_max_size() -> u32 {
    2
}

const fn default_status_check_interval_secs() -> u64 {
    5
}

const fn default_loop_sleep_secs() -> u64 {
    1
}

const fn default_flush_retry_secs() -> u64 {
    10
}

fn default_log_filter() -> String {
    "info".to_owned()
}

impl ManagerConfig {
    /// Reads and validates the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read and
    /// [`ConfigError::Parse`] or [`ConfigError::Invalid`] for bad content.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let read_error = |err: std::io::Error| ConfigError::Read {
            path: path.to_owned(),
            source: Arc::new(err),
        };
        let file_name = path.file_name().ok_or_else(|| {
            read_error(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "configuration path has no file name",
            ))
        })?;
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(read_error)?;
        let contents = dir.read_to_string(file_name).map_err(read_error)?;
        Self::from_toml(&contents)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(contents).map_err(|err| ConfigError::Parse(Arc::new(err)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::Invalid("database_url must not be empty".to_owned()));
        }
        if self.ipc_socket.as_str().is_empty() {
            return Err(ConfigError::Invalid("ipc_socket must not be empty".to_owned()));
        }
        if self.pool_max_size == 0 {
            return Err(ConfigError::Invalid("pool_max_size must be positive".to_owned()));
        }
        for (name, value) in [
            ("status_check_interval_secs", self.status_check_interval_secs),
            ("loop_sleep_secs", self.loop_sleep_secs),
            ("flush_retry_secs", self.flush_retry_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        status_check_interval(self.status_check_interval_secs)?;
        Ok(())
    }

    /// Returns the manager tunables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the status check interval does
    /// not fit a duration.
    pub fn manager_settings(&self) -> Result<ManagerSettings, ConfigError> {
        Ok(ManagerSettings {
            status_check_interval: status_check_interval(self.status_check_interval_secs)?,
            loop_sleep: Duration::from_secs(self.loop_sleep_secs),
            flush_retry: Duration::from_secs(self.flush_retry_secs),
        })
    }

    /// Returns the configured user macros.
    #[must_use]
    pub fn user_macros(&self) -> UserMacroTable {
        UserMacroTable::new(&self.user_macros)
    }
}

fn status_check_interval(secs: u64) -> Result<TimeDelta, ConfigError> {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(|| {
            ConfigError::Invalid(format!("status_check_interval_secs {secs} is too large"))
        })
}

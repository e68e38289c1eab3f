//! TOML configuration for the record store and its backend.
//!
//! # Responsibility
//! - Select the storage variant and its location.
//! - Carry cache TTL, backend I/O timeout and logging settings.
//!
//! # Invariants
//! - Relative backend paths resolve against the config file's directory.
//! - `io_timeout_secs` is never zero.
//!
//! ```toml
//! [store]
//! cache_ttl_secs = 600
//! io_timeout_secs = 10
//!
//! [backend]
//! kind = "sheet"
//! path = "orgaco.workbook.json"
//! worksheet = "Sheet1"
//!
//! [logging]
//! level = "info"
//! dir = "/var/log/orgaco"
//! ```

use crate::repo::sheet_repo::DEFAULT_WORKSHEET;
use crate::service::record_store::DEFAULT_CACHE_TTL;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_IO_TIMEOUT_SECS: u64 = 10;

/// Root configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreSettings,
    pub backend: BackendConfig,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSettings {
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_io_timeout_secs")]
    pub io_timeout_secs: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            io_timeout_secs: default_io_timeout_secs(),
        }
    }
}

impl StoreSettings {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }
}

/// Storage variant selection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum BackendConfig {
    /// SQLite database file holding the group table.
    Sqlite { path: PathBuf },
    /// Workbook document with one worksheet of groups.
    Sheet {
        path: PathBuf,
        #[serde(default = "default_worksheet")]
        worksheet: String,
    },
}

impl BackendConfig {
    pub fn path(&self) -> &Path {
        match self {
            Self::Sqlite { path } | Self::Sheet { path, .. } => path,
        }
    }

    fn path_mut(&mut self) -> &mut PathBuf {
        match self {
            Self::Sqlite { path } | Self::Sheet { path, .. } => path,
        }
    }
}

/// Optional file logging. Logging stays off unless `dir` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub dir: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(toml::de::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

impl AppConfig {
    /// Reads and validates a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_toml_str(&contents)?;
        if let Some(base) = path.parent() {
            let backend_path = config.backend.path_mut();
            if backend_path.is_relative() {
                *backend_path = base.join(&*backend_path);
            }
        }
        Ok(config)
    }

    /// Parses and validates config text without touching the filesystem.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.store.io_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "store.io_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.backend.path().as_os_str().is_empty() {
            return Err(ConfigError::Invalid("backend.path cannot be empty".to_string()));
        }
        if let BackendConfig::Sheet { worksheet, .. } = &self.backend {
            if worksheet.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "backend.worksheet cannot be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL.as_secs()
}

fn default_io_timeout_secs() -> u64 {
    DEFAULT_IO_TIMEOUT_SECS
}

fn default_worksheet() -> String {
    DEFAULT_WORKSHEET.to_string()
}

//! Core runtime configuration.
//!
//! Resolved once at process startup and passed into [`crate::HospitalCore`],
//! so nothing reads process-wide environment variables while handling a
//! request.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::models::DEFAULT_PER_PAGE;

pub const DB_PATH_VAR: &str = "MEDICORE_DB_PATH";
pub const PAGE_SIZE_VAR: &str = "MEDICORE_PAGE_SIZE";
pub const MAX_PAGE_SIZE_VAR: &str = "MEDICORE_MAX_PAGE_SIZE";
pub const BUSY_TIMEOUT_VAR: &str = "MEDICORE_BUSY_TIMEOUT_MS";
pub const LOG_VAR: &str = "MEDICORE_LOG";

const DEFAULT_DB_PATH: &str = "medicore.db";
const DEFAULT_MAX_PAGE_SIZE: u32 = 100;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;
const DEFAULT_LOG: &str = "medicore=info";

/// Configuration errors.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var} cannot be empty")]
    Empty { var: &'static str },

    #[error("page size {page_size} exceeds maximum page size {max_page_size}")]
    PageSizeAboveMax { page_size: u32, max_page_size: u32 },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Core configuration resolved at startup.
#[derive(Clone, Debug, PartialEq)]
pub struct CoreConfig {
    db_path: PathBuf,
    page_size: u32,
    max_page_size: u32,
    busy_timeout: Duration,
    log_directive: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            page_size: DEFAULT_PER_PAGE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            log_directive: DEFAULT_LOG.to_string(),
        }
    }
}

impl CoreConfig {
    /// Defaults with an explicit database path.
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    /// Read configuration from the process environment.
    ///
    /// Binaries apply `dotenvy::dotenv()` first so a `.env` file is honoured.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup. Unset or blank
    /// keys fall back to their defaults.
    pub fn from_lookup<F>(mut lookup: F) -> ConfigResult<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut value = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let db_path = value(DB_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);
        let page_size = match value(PAGE_SIZE_VAR) {
            Some(v) => parse_positive(PAGE_SIZE_VAR, &v)?,
            None => defaults.page_size,
        };
        let max_page_size = match value(MAX_PAGE_SIZE_VAR) {
            Some(v) => parse_positive(MAX_PAGE_SIZE_VAR, &v)?,
            None => defaults.max_page_size,
        };
        let busy_timeout = match value(BUSY_TIMEOUT_VAR) {
            Some(v) => Duration::from_millis(parse_positive(BUSY_TIMEOUT_VAR, &v)?),
            None => defaults.busy_timeout,
        };
        let log_directive = value(LOG_VAR).unwrap_or(defaults.log_directive);

        Self {
            db_path,
            page_size,
            max_page_size,
            busy_timeout,
            log_directive,
        }
        .validated()
    }

    pub fn set_page_size(mut self, page_size: u32, max_page_size: u32) -> ConfigResult<Self> {
        self.page_size = page_size;
        self.max_page_size = max_page_size;
        self.validated()
    }

    pub fn set_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Page size used when a caller does not ask for one.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Upper bound on caller-supplied page sizes.
    pub fn max_page_size(&self) -> u32 {
        self.max_page_size
    }

    pub fn busy_timeout(&self) -> Duration {
        self.busy_timeout
    }

    /// `tracing_subscriber::EnvFilter` directive for binaries.
    pub fn log_directive(&self) -> &str {
        &self.log_directive
    }

    fn validated(self) -> ConfigResult<Self> {
        if self.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Empty { var: DB_PATH_VAR });
        }
        if self.page_size == 0 {
            return Err(ConfigError::InvalidNumber {
                var: PAGE_SIZE_VAR,
                value: "0".into(),
            });
        }
        if self.page_size > self.max_page_size {
            return Err(ConfigError::PageSizeAboveMax {
                page_size: self.page_size,
                max_page_size: self.max_page_size,
            });
        }
        Ok(self)
    }
}

fn parse_positive<T>(var: &'static str, value: &str) -> ConfigResult<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match value.parse::<T>() {
        Ok(n) if n > T::default() => Ok(n),
        _ => Err(ConfigError::InvalidNumber {
            var,
            value: value.to_string(),
        }),
    }
}

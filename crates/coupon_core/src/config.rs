//! Environment-driven configuration for the core and its binaries.
//!
//! # Responsibility
//! - Collect database, logging and compensation settings in one place.
//! - Parse `COUPON_*` environment variables with explicit error reporting.
//!
//! # Invariants
//! - Missing variables fall back to defaults; malformed ones are errors,
//!   never silently ignored.
//! - `CompensationPolicy::max_attempts` is at least 1.

use crate::db::DbOptions;
use crate::logging::{default_log_level, normalize_level};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_DB_PATH: &str = "COUPON_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "COUPON_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "COUPON_LOG_DIR";
pub const ENV_BUSY_TIMEOUT_MS: &str = "COUPON_BUSY_TIMEOUT_MS";
pub const ENV_RELEASE_MAX_ATTEMPTS: &str = "COUPON_RELEASE_MAX_ATTEMPTS";
pub const ENV_RELEASE_BACKOFF_MS: &str = "COUPON_RELEASE_BACKOFF_MS";

const DEFAULT_DB_FILE_NAME: &str = "coupons.sqlite3";

/// Retry schedule for compensating releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompensationPolicy {
    /// Total release attempts before the reservation is queued.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles each retry.
    pub initial_backoff: Duration,
    /// Upper bound for a single delay.
    pub max_backoff: Duration,
}

impl Default for CompensationPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(200),
        }
    }
}

impl CompensationPolicy {
    /// No retries and no sleeping. Used where compensation must not block.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }
}

/// Core runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub db_path: PathBuf,
    pub log_level: &'static str,
    /// File logging is enabled only when a directory is configured.
    pub log_dir: Option<PathBuf>,
    pub busy_timeout: Duration,
    pub compensation: CompensationPolicy,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_FILE_NAME),
            log_level: default_log_level(),
            log_dir: None,
            busy_timeout: DbOptions::default().busy_timeout,
            compensation: CompensationPolicy::default(),
        }
    }
}

/// Configuration parsing failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidNumber { var: &'static str, value: String },
    InvalidLogLevel { var: &'static str, message: String },
    ZeroAttempts { var: &'static str },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNumber { var, value } => {
                write!(f, "{var} must be a non-negative integer, got `{value}`")
            }
            Self::InvalidLogLevel { var, message } => write!(f, "{var}: {message}"),
            Self::ZeroAttempts { var } => write!(f, "{var} must be at least 1"),
        }
    }
}

impl Error for ConfigError {}

impl CoreConfig {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let db_path = read(ENV_DB_PATH)
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let log_level = match read(ENV_LOG_LEVEL) {
            Some(value) => normalize_level(&value).map_err(|err| ConfigError::InvalidLogLevel {
                var: ENV_LOG_LEVEL,
                message: err.to_string(),
            })?,
            None => defaults.log_level,
        };

        let log_dir = read(ENV_LOG_DIR).map(PathBuf::from);

        let busy_timeout = match read(ENV_BUSY_TIMEOUT_MS) {
            Some(value) => Duration::from_millis(parse_number(ENV_BUSY_TIMEOUT_MS, &value)?),
            None => defaults.busy_timeout,
        };

        let mut compensation = defaults.compensation;
        if let Some(value) = read(ENV_RELEASE_MAX_ATTEMPTS) {
            let attempts = parse_number(ENV_RELEASE_MAX_ATTEMPTS, &value)?;
            if attempts == 0 {
                return Err(ConfigError::ZeroAttempts {
                    var: ENV_RELEASE_MAX_ATTEMPTS,
                });
            }
            compensation.max_attempts =
                u32::try_from(attempts).map_err(|_| ConfigError::InvalidNumber {
                    var: ENV_RELEASE_MAX_ATTEMPTS,
                    value: value.clone(),
                })?;
        }
        if let Some(value) = read(ENV_RELEASE_BACKOFF_MS) {
            compensation.initial_backoff =
                Duration::from_millis(parse_number(ENV_RELEASE_BACKOFF_MS, &value)?);
            compensation.max_backoff = compensation.max_backoff.max(compensation.initial_backoff);
        }

        Ok(Self {
            db_path,
            log_level,
            log_dir,
            busy_timeout,
            compensation,
        })
    }

    /// Connection options derived from this configuration.
    pub fn db_options(&self) -> DbOptions {
        DbOptions {
            busy_timeout: self.busy_timeout,
            ..DbOptions::default()
        }
    }
}

fn parse_number(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidNumber {
        var,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::{
        CompensationPolicy, ConfigError, CoreConfig, ENV_BUSY_TIMEOUT_MS, ENV_DB_PATH,
        ENV_LOG_LEVEL, ENV_RELEASE_BACKOFF_MS, ENV_RELEASE_MAX_ATTEMPTS,
    };
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn config_from(pairs: &[(&str, &str)]) -> Result<CoreConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        CoreConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = config_from(&[]).expect("defaults should parse");
        assert_eq!(config, CoreConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            (ENV_DB_PATH, "/var/lib/coupons/db.sqlite3"),
            (ENV_LOG_LEVEL, " WARNING "),
            (ENV_BUSY_TIMEOUT_MS, "250"),
            (ENV_RELEASE_MAX_ATTEMPTS, "5"),
            (ENV_RELEASE_BACKOFF_MS, "500"),
        ])
        .expect("overrides should parse");

        assert_eq!(config.db_path, PathBuf::from("/var/lib/coupons/db.sqlite3"));
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert_eq!(config.compensation.max_attempts, 5);
        assert_eq!(config.compensation.initial_backoff, Duration::from_millis(500));
        assert!(config.compensation.max_backoff >= config.compensation.initial_backoff);
        assert_eq!(config.db_options().busy_timeout, Duration::from_millis(250));
    }

    #[test]
    fn malformed_values_name_the_variable() {
        let err = config_from(&[(ENV_BUSY_TIMEOUT_MS, "soon")]).unwrap_err();
        assert!(err.to_string().contains(ENV_BUSY_TIMEOUT_MS));

        let err = config_from(&[(ENV_RELEASE_MAX_ATTEMPTS, "0")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::ZeroAttempts {
                var: ENV_RELEASE_MAX_ATTEMPTS
            }
        );

        let err = config_from(&[(ENV_LOG_LEVEL, "loud")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLogLevel { .. }));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = CompensationPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(35),
        };
        assert_eq!(policy.backoff_after(1), Duration::from_millis(10));
        assert_eq!(policy.backoff_after(2), Duration::from_millis(20));
        assert_eq!(policy.backoff_after(3), Duration::from_millis(35));
        assert_eq!(CompensationPolicy::immediate(0).max_attempts, 1);
    }
}

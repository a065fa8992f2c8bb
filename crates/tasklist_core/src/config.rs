//! Runtime configuration for the store and logging.
//!
//! # Responsibility
//! - Hold tunables for connection bootstrap, conflict retries and logging.
//! - Resolve values from `TASKLIST_*` environment variables.
//!
//! # Invariants
//! - Unparseable numeric variables fall back to defaults; they never fail
//!   startup.

use log::warn;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_DB_PATH: &str = "TASKLIST_DB_PATH";
pub const ENV_BUSY_TIMEOUT_MS: &str = "TASKLIST_BUSY_TIMEOUT_MS";
pub const ENV_MAX_RETRIES: &str = "TASKLIST_MAX_RETRIES";
pub const ENV_LOG_LEVEL: &str = "TASKLIST_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "TASKLIST_LOG_DIR";

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
/// File name used under the OS temp dir when no DB path is configured.
pub const DEFAULT_DB_FILE_NAME: &str = "tasklist.sqlite3";
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF: Duration = Duration::from_millis(25);

/// Bounded retry policy for transactions that hit lock contention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always at least 1.
    pub max_attempts: u32,
    /// Sleep between attempts, multiplied by the attempt number.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Single attempt, no retry.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub(crate) fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// Item store settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Database file. `None` opens a private in-memory database.
    pub db_path: Option<PathBuf>,
    /// SQLite busy handler timeout applied to every connection.
    pub busy_timeout: Duration,
    /// Retry policy used by the task repository.
    pub retry: RetryPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// File-backed config with default tunables.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Reads `TASKLIST_DB_PATH`, `TASKLIST_BUSY_TIMEOUT_MS` and
    /// `TASKLIST_MAX_RETRIES`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`StoreConfig::from_env`], but falls back to the shared
    /// [`default_db_path`] file instead of an in-memory database.
    ///
    /// UI entry points and the CLI use this so they see the same store.
    pub fn from_env_or_default_file() -> Self {
        Self::from_env().or_default_file()
    }

    fn or_default_file(mut self) -> Self {
        if self.db_path.is_none() {
            self.db_path = Some(default_db_path());
        }
        self
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(path) = non_blank(lookup(ENV_DB_PATH)) {
            config.db_path = Some(PathBuf::from(path));
        }
        if let Some(ms) = parse_number::<u64>(ENV_BUSY_TIMEOUT_MS, lookup(ENV_BUSY_TIMEOUT_MS)) {
            config.busy_timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_number::<u32>(ENV_MAX_RETRIES, lookup(ENV_MAX_RETRIES)) {
            config.retry.max_attempts = attempts.max(1);
        }
        config
    }
}

/// Logging settings consumed by [`crate::logging::init_logging`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    pub log_dir: PathBuf,
}

impl LogConfig {
    /// Reads `TASKLIST_LOG_LEVEL` and `TASKLIST_LOG_DIR`.
    ///
    /// Returns `None` when no log directory is configured.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let log_dir = non_blank(lookup(ENV_LOG_DIR))?;
        let level = non_blank(lookup(ENV_LOG_LEVEL))
            .unwrap_or_else(|| default_log_level().to_string());
        Some(Self {
            level,
            log_dir: PathBuf::from(log_dir),
        })
    }
}

/// Store file shared by entry points when `TASKLIST_DB_PATH` is unset.
pub fn default_db_path() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_DB_FILE_NAME)
}

/// Returns the default log level for current build mode.
///
/// - `debug` builds -> `debug`
/// - `release` builds -> `info`
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: Option<String>) -> Option<T> {
    let raw = non_blank(value)?;
    match raw.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("event=config_parse module=config status=error key={key} error_code=invalid_number");
            None
        }
    }
}

//! Configuration for the task factory
//!
//! Settings arrive either as `(key, value)` string pairs handed over by the
//! host framework, or as a TOML document with the same keys:
//!
//! ```toml
//! max-threads = 8
//! thread-timeout-ms = 500
//! ```

use crate::error::{ConfigError, ConfigResult};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Key for the worker thread limit
pub const MAX_THREADS_KEY: &str = "max-threads";

/// Key for the idle timeout of a worker thread
pub const THREAD_TIMEOUT_KEY: &str = "thread-timeout-ms";

/// Upper bound for `max-threads`
pub const MAX_THREADS_LIMIT: usize = 1000;

/// Idle time after which a worker thread retires
pub const DEFAULT_THREAD_TIMEOUT: Duration = Duration::from_millis(1000);

/// A single `(key, value)` setting
pub type Setting = (String, String);

/// Validated task factory configuration
///
/// Only obtainable through the validating constructors, so a value of this
/// type always holds `max-threads` in 1..=1000 and a timeout of at least one
/// millisecond.
///
/// ```compile_fail
/// use jboot::TaskFactoryConfig;
/// use std::time::Duration;
///
/// let config = TaskFactoryConfig {
///     max_threads: 0,
///     thread_timeout: Duration::ZERO,
/// };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskFactoryConfig {
    max_threads: usize,
    thread_timeout: Duration,
}

/// Raw TOML form, validated through the same rules as string settings
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawTaskFactoryConfig {
    max_threads: Option<i64>,
    thread_timeout_ms: Option<i64>,
}

impl TaskFactoryConfig {
    /// Create a configuration with the default thread timeout
    pub fn new(max_threads: usize) -> ConfigResult<Self> {
        Ok(Self {
            max_threads: validate_max_threads(max_threads as i64, &max_threads.to_string())?,
            thread_timeout: DEFAULT_THREAD_TIMEOUT,
        })
    }

    /// Builder: set the idle timeout
    ///
    /// The timeout is kept in whole milliseconds; anything below one
    /// millisecond is rejected.
    pub fn with_thread_timeout(mut self, timeout: Duration) -> ConfigResult<Self> {
        let ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        self.thread_timeout = validate_thread_timeout(ms, &format!("{timeout:?}"))?;
        Ok(self)
    }

    /// Maximum number of concurrently alive worker threads
    #[must_use]
    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    /// Idle time after which a worker thread retires
    #[must_use]
    pub fn thread_timeout(&self) -> Duration {
        self.thread_timeout
    }

    /// Parse `(key, value)` settings
    ///
    /// `max-threads` is required and must lie in 1..=1000. `thread-timeout-ms`
    /// is optional and must be > 0. Duplicate or unknown keys are rejected.
    pub fn from_settings<K, V>(settings: &[(K, V)]) -> ConfigResult<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut max_threads = None;
        let mut thread_timeout = None;

        for (key, value) in settings {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                MAX_THREADS_KEY => {
                    if max_threads.is_some() {
                        return Err(ConfigError::MultipleDefinition {
                            key: key.to_string(),
                        });
                    }
                    let parsed = parse_integer(key, value)?;
                    max_threads = Some(validate_max_threads(parsed, value)?);
                }
                THREAD_TIMEOUT_KEY => {
                    if thread_timeout.is_some() {
                        return Err(ConfigError::MultipleDefinition {
                            key: key.to_string(),
                        });
                    }
                    let parsed = parse_integer(key, value)?;
                    thread_timeout = Some(validate_thread_timeout(parsed, value)?);
                }
                _ => {
                    return Err(ConfigError::UnknownKey {
                        key: key.to_string(),
                    })
                }
            }
        }

        let max_threads = max_threads.ok_or_else(|| ConfigError::MissingField {
            field: MAX_THREADS_KEY.to_string(),
        })?;

        Ok(Self {
            max_threads,
            thread_timeout: thread_timeout.unwrap_or(DEFAULT_THREAD_TIMEOUT),
        })
    }

    /// Parse a TOML document
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        let raw: RawTaskFactoryConfig =
            toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        let max_threads = raw.max_threads.ok_or_else(|| ConfigError::MissingField {
            field: MAX_THREADS_KEY.to_string(),
        })?;
        let max_threads = validate_max_threads(max_threads, &max_threads.to_string())?;

        let thread_timeout = match raw.thread_timeout_ms {
            Some(ms) => validate_thread_timeout(ms, &ms.to_string())?,
            None => DEFAULT_THREAD_TIMEOUT,
        };

        Ok(Self {
            max_threads,
            thread_timeout,
        })
    }

    /// Load a TOML configuration file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::ParseError(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Render back into `(key, value)` settings
    #[must_use]
    pub fn to_settings(&self) -> Vec<Setting> {
        vec![
            (MAX_THREADS_KEY.to_string(), self.max_threads.to_string()),
            (
                THREAD_TIMEOUT_KEY.to_string(),
                self.thread_timeout.as_millis().to_string(),
            ),
        ]
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_integer(key: &str, value: &str) -> ConfigResult<i64> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| invalid(key, value, "value is not an integer"))
}

fn validate_max_threads(max_threads: i64, raw: &str) -> ConfigResult<usize> {
    if !(1..=MAX_THREADS_LIMIT as i64).contains(&max_threads) {
        return Err(invalid(
            MAX_THREADS_KEY,
            raw,
            &format!("value has to be between 1 and {MAX_THREADS_LIMIT}"),
        ));
    }
    Ok(max_threads as usize)
}

fn validate_thread_timeout(ms: i64, raw: &str) -> ConfigResult<Duration> {
    if ms < 1 {
        return Err(invalid(THREAD_TIMEOUT_KEY, raw, "value must be > 0"));
    }
    Ok(Duration::from_millis(ms as u64))
}

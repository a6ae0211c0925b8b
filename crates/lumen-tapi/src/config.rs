//! Engine configuration.
//!
//! Settings are read from the process environment with strict validation.
//! Unset variables fall back to defaults; malformed values are rejected
//! rather than silently replaced.

use lumen_core::LogFormat;

use crate::error::{Error, Result};
use crate::resolver::DEFAULT_MAX_LOWER_DEPTH;

const ENV_MAX_LOWER_DEPTH: &str = "LUMEN_MAX_LOWER_DEPTH";
const ENV_NOTIFICATION_BUFFER: &str = "LUMEN_NOTIFICATION_BUFFER";
const ENV_STREAM_BUFFER: &str = "LUMEN_STREAM_BUFFER";
const ENV_LOG_FORMAT: &str = "LUMEN_LOG_FORMAT";

const DEFAULT_NOTIFICATION_BUFFER: u64 = 1024;
const DEFAULT_STREAM_BUFFER: u64 = 256;

/// Runtime configuration for the propagation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum lower-connection depth before resolution aborts.
    pub max_lower_depth: usize,
    /// Capacity of the channel notification sink.
    pub notification_buffer: usize,
    /// Capacity of each inbound stream queue.
    pub stream_buffer: usize,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_lower_depth: DEFAULT_MAX_LOWER_DEPTH,
            notification_buffer: 1024,
            stream_buffer: 256,
            log_format: LogFormat::default(),
        }
    }
}

impl EngineConfig {
    /// Loads config from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a value is not a positive integer
    /// or names an unknown log format.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Loads config with a custom environment source.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a value is not a positive integer
    /// or names an unknown log format.
    pub fn from_env_with<F>(get_env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_lower_depth = parse_positive_usize_env(
            &get_env,
            ENV_MAX_LOWER_DEPTH,
            DEFAULT_MAX_LOWER_DEPTH as u64,
        )?;
        let notification_buffer =
            parse_positive_usize_env(&get_env, ENV_NOTIFICATION_BUFFER, DEFAULT_NOTIFICATION_BUFFER)?;
        let stream_buffer =
            parse_positive_usize_env(&get_env, ENV_STREAM_BUFFER, DEFAULT_STREAM_BUFFER)?;
        let log_format = match get_env(ENV_LOG_FORMAT) {
            Some(raw) => raw
                .parse::<LogFormat>()
                .map_err(|e| Error::configuration(format!("{ENV_LOG_FORMAT}: {e}")))?,
            None => LogFormat::default(),
        };

        Ok(Self {
            max_lower_depth,
            notification_buffer,
            stream_buffer,
            log_format,
        })
    }
}

fn parse_positive_usize_env<F>(get_env: &F, key: &str, default: u64) -> Result<usize>
where
    F: Fn(&str) -> Option<String>,
{
    let parsed = match get_env(key) {
        None => default,
        Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
            Error::configuration(format!("{key} must be a positive integer, got '{raw}'"))
        })?,
    };
    if parsed == 0 {
        return Err(Error::configuration(format!(
            "{key} must be greater than zero"
        )));
    }
    usize::try_from(parsed).map_err(|_| {
        Error::configuration(format!("{key} value {parsed} exceeds supported range"))
    })
}

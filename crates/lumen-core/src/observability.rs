//! Observability infrastructure for Lumen.
//!
//! Structured logging with consistent spans. This module provides
//! initialization helpers and span constructors used by the propagation
//! engine and the lifecycle drivers.

use std::str::FromStr;
use std::sync::Once;

use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::Error;

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(Error::InvalidInput(format!(
                "unknown log format '{other}' (expected 'json' or 'pretty')"
            ))),
        }
    }
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `lumen_tapi=debug`)
///
/// # Example
///
/// ```rust
/// use lumen_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .try_init();
            }
            LogFormat::Pretty => {
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .try_init();
            }
        }
    });
}

/// Creates a span for one propagation pass.
///
/// # Example
///
/// ```rust
/// use lumen_core::observability::propagation_span;
///
/// let span = propagation_span("topology_change", 2);
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn propagation_span(trigger: &str, edge_point_count: usize) -> Span {
    tracing::info_span!(
        "propagation",
        trigger = trigger,
        edge_points = edge_point_count,
    )
}

/// Creates a span for handling one lifecycle event.
#[must_use]
pub fn lifecycle_span(stream: &str, service_id: &str) -> Span {
    tracing::info_span!("lifecycle", stream = stream, service_id = service_id)
}

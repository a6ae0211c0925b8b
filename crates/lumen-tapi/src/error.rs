//! Error types for the connectivity-state engine.

use lumen_core::{ConnectionId, ServiceId, StreamId};

/// The result type used throughout lumen-tapi.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in propagation and lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A cycle was detected in the lower-connection or service-support graph.
    #[error("cycle detected: {cycle:?}")]
    CycleDetected {
        /// The cycle path, starting and ending at the repeated id.
        cycle: Vec<String>,
    },

    /// The lower-connection chain is deeper than the configured bound.
    #[error("lower-connection depth {depth} exceeds limit {limit} at {connection_id}")]
    DepthExceeded {
        /// The connection at which the limit was hit.
        connection_id: ConnectionId,
        /// The depth reached.
        depth: usize,
        /// The configured limit.
        limit: usize,
    },

    /// A connectivity service was not found in the graph store.
    #[error("service not found: {service_id}")]
    ServiceNotFound {
        /// The service ID that was not found.
        service_id: ServiceId,
    },

    /// A graph-store operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid configuration.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// The path computation collaborator failed.
    #[error("path computation failed: {message}")]
    PathComputation {
        /// Description of the failure.
        message: String,
    },

    /// The interface provisioning collaborator failed.
    #[error("provisioning failed on {node}: {message}")]
    Provisioning {
        /// The node that failed.
        node: String,
        /// Description of the failure.
        message: String,
    },

    /// Publishing an outbound notification failed.
    #[error("notification publish failed: {message}")]
    Publish {
        /// Description of the failure.
        message: String,
    },

    /// No worker is registered for an inbound stream.
    #[error("unknown stream: {stream}")]
    UnknownStream {
        /// The stream id.
        stream: StreamId,
    },

    /// The worker for an inbound stream has stopped.
    #[error("stream closed: {stream}")]
    StreamClosed {
        /// The stream id.
        stream: StreamId,
    },

    /// An error from lumen-core.
    #[error("core error: {0}")]
    Core(#[from] lumen_core::Error),
}

impl Error {
    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns a short label for metrics.
    #[must_use]
    pub const fn kind_label(&self) -> &'static str {
        match self {
            Self::CycleDetected { .. } => "cycle",
            Self::DepthExceeded { .. } => "depth",
            Self::ServiceNotFound { .. } => "not_found",
            Self::Storage { .. } => "storage",
            Self::Core(_) => "invalid_input",
            Self::Configuration { .. } => "configuration",
            Self::PathComputation { .. } => "path_computation",
            Self::Provisioning { .. } => "provisioning",
            Self::Publish { .. } => "publish",
            Self::UnknownStream { .. } | Self::StreamClosed { .. } => "stream",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn cycle_error_display() {
        let err = Error::CycleDetected {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert!(err.to_string().contains("cycle detected"));
        assert_eq!(err.kind_label(), "cycle");
    }

    #[test]
    fn depth_error_display() {
        let err = Error::DepthExceeded {
            connection_id: ConnectionId::new("TOP-1"),
            depth: 5,
            limit: 4,
        };
        let msg = err.to_string();
        assert!(msg.contains("TOP-1"));
        assert!(msg.contains("exceeds limit 4"));
    }

    #[test]
    fn storage_error_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::storage_with_source("failed to commit", source);
        assert!(err.to_string().contains("storage error"));
        assert!(StdError::source(&err).is_some());
    }
}

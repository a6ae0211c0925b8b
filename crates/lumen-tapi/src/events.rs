//! Upstream lifecycle events.
//!
//! Path computation and provisioning results arrive as [`LifecycleEvent`]
//! records on named streams (one stream per upstream source). Delivery is
//! at-least-once, so the same logical result may be seen more than once; see
//! [`crate::dedup`] for how redeliveries are filtered.
//!
//! ## Delivery identity
//!
//! Two events are the same delivery when their kind, service, status and
//! status message match. The `sequence_marker` (a ULID assigned when the
//! record is built) and the arrival timestamp are bookkeeping only and are
//! never part of the comparison.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use lumen_core::{ServiceId, StreamId};

/// Kind of upstream lifecycle notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// Result of a path computation request.
    PathComputationRequest,
    /// Result of releasing resources reserved by an earlier computation.
    CancelResourceReserve,
    /// Result of configuring the devices along a computed path.
    ServiceImplementationRequest,
    /// Result of removing a service from the devices.
    ServiceDelete,
}

impl EventKind {
    /// Returns a label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::PathComputationRequest => "path_computation_request",
            Self::CancelResourceReserve => "cancel_resource_reserve",
            Self::ServiceImplementationRequest => "service_implementation_request",
            Self::ServiceDelete => "service_delete",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Outcome reported by the upstream source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum EventStatus {
    /// Work accepted, result not yet known.
    Pending,
    /// Work completed.
    Successful,
    /// Work failed.
    Failed,
}

impl EventStatus {
    /// Returns a label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Successful => "successful",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// An immutable upstream lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    /// Stream the event arrived on.
    pub stream: StreamId,
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Service (or path) the event refers to.
    pub service_id: ServiceId,
    /// Reported outcome.
    pub status: EventStatus,
    /// Free-form status message from the upstream source.
    pub status_message: String,
    /// Unique marker assigned when the record was built (ULID).
    pub sequence_marker: String,
    /// When the record was built.
    pub received_at: DateTime<Utc>,
}

impl LifecycleEvent {
    /// Creates a new event with a fresh sequence marker.
    #[must_use]
    pub fn new(
        stream: StreamId,
        kind: EventKind,
        service_id: ServiceId,
        status: EventStatus,
        status_message: impl Into<String>,
    ) -> Self {
        Self {
            stream,
            kind,
            service_id,
            status,
            status_message: status_message.into(),
            sequence_marker: Ulid::new().to_string(),
            received_at: Utc::now(),
        }
    }

    /// Creates a `Successful` event.
    #[must_use]
    pub fn successful(
        stream: StreamId,
        kind: EventKind,
        service_id: ServiceId,
        status_message: impl Into<String>,
    ) -> Self {
        Self::new(stream, kind, service_id, EventStatus::Successful, status_message)
    }

    /// Creates a `Failed` event.
    #[must_use]
    pub fn failed(
        stream: StreamId,
        kind: EventKind,
        service_id: ServiceId,
        status_message: impl Into<String>,
    ) -> Self {
        Self::new(stream, kind, service_id, EventStatus::Failed, status_message)
    }

    /// Returns true if `other` is a redelivery of the same logical result.
    ///
    /// Compares kind, service, status and status message by value.
    #[must_use]
    pub fn is_same_delivery(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.service_id == other.service_id
            && self.status == other.status
            && self.status_message == other.status_message
    }
}

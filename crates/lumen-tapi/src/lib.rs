//! # lumen-tapi
//!
//! Connectivity-state propagation and notification engine for layered
//! optical/OTN topologies.
//!
//! This crate keeps the operational state of a derived, layered topology
//! abstraction consistent as the physical network changes and as service
//! lifecycle events arrive:
//!
//! - **Resolution**: A connection's state is derived from its lower
//!   connections, or from the edge points behind its CEPs
//! - **Propagation**: Services are settled in layer order (media, ODU, DSR,
//!   ETH) and changes cascade to the services they support
//! - **Deduplication**: At-least-once upstream deliveries are filtered per
//!   stream
//! - **Notification**: One outbound change record per service whose state
//!   actually changed
//!
//! ## Core Concepts
//!
//! - **Edge point**: Termination point on a node, the ground truth for health
//! - **Connection**: Cross-connection (two CEPs) or top connection (lower
//!   connections), referenced by id only
//! - **Connectivity service**: Customer-facing service built on top
//!   connections, possibly supported by services at an adjacent layer
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use lumen_core::EdgePointId;
//! use lumen_tapi::error::Result;
//! use lumen_tapi::model::OperationalState;
//! use lumen_tapi::notifier::{InMemoryNotificationSink, Notifier};
//! use lumen_tapi::propagator::LayerPropagator;
//! use lumen_tapi::store::memory::InMemoryGraphStore;
//! use lumen_tapi::topology::TopologyListener;
//!
//! # async fn run() -> Result<()> {
//! let store = Arc::new(InMemoryGraphStore::new());
//! let sink = Arc::new(InMemoryNotificationSink::new());
//! let listener = TopologyListener::new(LayerPropagator::new(store), Notifier::new(sink));
//!
//! let changed = listener
//!     .on_edge_point_changes(&[(EdgePointId::new("ROADM-A:DEG1-TTP"), OperationalState::Disabled)])
//!     .await?;
//! println!("{} services changed", changed.len());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod dedup;
pub mod drivers;
pub mod engine;
pub mod error;
pub mod events;
pub mod lock;
pub mod metrics;
pub mod model;
pub mod notifier;
pub mod propagator;
pub mod resolver;
pub mod runtime;
pub mod store;
pub mod support;
pub mod topology;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::dedup::Deduplicator;
    pub use crate::drivers::path::{PathComputationDriver, PathDescription, ServiceRequest};
    pub use crate::drivers::provisioning::ProvisioningDriver;
    pub use crate::drivers::{
        Dispatch, DriverContext, InterfaceProvisioner, LifecycleDriver, PathComputer,
    };
    pub use crate::engine::Engine;
    pub use crate::error::{Error, Result};
    pub use crate::events::{EventKind, EventStatus, LifecycleEvent};
    pub use crate::lock::ServiceLocks;
    pub use crate::metrics::EngineMetrics;
    pub use crate::model::{
        Connection, ConnectivityService, EdgePoint, LayerProtocolName, OperationalState,
        ServiceState,
    };
    pub use crate::notifier::{Notification, NotificationSink, Notifier};
    pub use crate::propagator::{LayerPropagator, ServiceChange};
    pub use crate::resolver::ConnectionStateResolver;
    pub use crate::runtime::StreamRuntime;
    pub use crate::store::{GraphStore, WriteBatch};
    pub use crate::topology::TopologyListener;
}

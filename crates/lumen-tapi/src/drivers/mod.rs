//! Lifecycle drivers.
//!
//! Drivers translate upstream lifecycle events into graph mutations:
//!
//! - [`path::PathComputationDriver`]: builds connections, CEPs and a pending
//!   service from a computed path, or removes them when the computation fails
//!   or its reservation is cancelled
//! - [`provisioning::ProvisioningDriver`]: installs a service once its devices
//!   are configured, or tears it down on failure and on delete
//!
//! Every driver deduplicates first and records the event as processed only
//! after a successful dispatch, so a failed dispatch can be retried by the
//! next redelivery.
//!
//! Path computation and interface provisioning themselves are external
//! collaborators behind the [`PathComputer`] and [`InterfaceProvisioner`]
//! traits.

pub mod path;
pub mod provisioning;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use lumen_core::observability::lifecycle_span;
use lumen_core::{ConnectionId, EdgePointId, NodeId, ServiceId};

use crate::dedup::Deduplicator;
use crate::error::Result;
use crate::events::LifecycleEvent;
use crate::lock::ServiceLocks;
use crate::metrics::EngineMetrics;
use crate::model::{Connection, ConnectivityService};
use crate::notifier::Notifier;
use crate::propagator::{LayerPropagator, ServiceChange};
use crate::store::{GraphStore, WriteBatch};
use crate::support::SupportGraph;

use self::path::{PathDescription, ServiceRequest};

/// Computes a path for a service request.
#[async_trait]
pub trait PathComputer: Send + Sync {
    /// Returns the computed path, or an error if none exists.
    async fn compute_path(&self, request: &ServiceRequest) -> Result<PathDescription>;
}

/// What a node must configure for one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    /// Service being provisioned.
    pub service_id: ServiceId,
    /// Service name.
    pub service_name: String,
    /// Edge points on the node touched by the service.
    pub edge_points: Vec<EdgePointId>,
}

/// Configures device interfaces on one node.
#[async_trait]
pub trait InterfaceProvisioner: Send + Sync {
    /// Returns the names of the interfaces created on `node`.
    async fn provision_interfaces(
        &self,
        node: &NodeId,
        request: &ProvisionRequest,
    ) -> Result<Vec<String>>;
}

/// Outcome of handing one event to a driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The event repeated the last one on its stream and was dropped.
    Duplicate,
    /// The event was applied; these services changed state as a result.
    Handled(Vec<ServiceChange>),
}

impl Dispatch {
    /// Returns the service changes, empty for a duplicate.
    #[must_use]
    pub fn changes(&self) -> &[ServiceChange] {
        match self {
            Self::Duplicate => &[],
            Self::Handled(changes) => changes,
        }
    }
}

/// A consumer of one inbound lifecycle event stream.
#[async_trait]
pub trait LifecycleDriver: Send + Sync {
    /// Handles one event: deduplicate, apply, record, notify.
    async fn handle(&self, event: LifecycleEvent) -> Result<Dispatch>;
}

/// Collaborators shared by every driver.
pub struct DriverContext<S: GraphStore + ?Sized> {
    /// Propagator (and, through it, the store and service locks).
    pub propagator: LayerPropagator<S>,
    /// Per-stream redelivery filter.
    pub dedup: Arc<Deduplicator>,
    /// Outbound notifier.
    pub notifier: Notifier,
    metrics: EngineMetrics,
}

impl<S: GraphStore + ?Sized> Clone for DriverContext<S> {
    fn clone(&self) -> Self {
        Self {
            propagator: self.propagator.clone(),
            dedup: Arc::clone(&self.dedup),
            notifier: self.notifier.clone(),
            metrics: self.metrics,
        }
    }
}

impl<S: GraphStore + ?Sized> DriverContext<S> {
    /// Creates a driver context.
    #[must_use]
    pub fn new(propagator: LayerPropagator<S>, dedup: Arc<Deduplicator>, notifier: Notifier) -> Self {
        Self {
            propagator,
            dedup,
            notifier,
            metrics: EngineMetrics::new(),
        }
    }

    /// Returns the graph store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        self.propagator.store()
    }

    /// Returns the service lock registry.
    #[must_use]
    pub fn locks(&self) -> &Arc<ServiceLocks> {
        self.propagator.locks()
    }

    /// Runs the shared event envelope around a driver's `apply` step.
    ///
    /// # Errors
    ///
    /// Returns the `apply` error; the event is then not recorded, so a
    /// redelivery is processed again.
    pub(crate) async fn run<F, Fut>(&self, event: LifecycleEvent, apply: F) -> Result<Dispatch>
    where
        F: FnOnce(LifecycleEvent) -> Fut + Send,
        Fut: std::future::Future<Output = Result<Vec<ServiceChange>>> + Send,
    {
        let span = lifecycle_span(event.stream.as_str(), event.service_id.as_str());
        async move {
            let stream = event.stream.to_string();
            if self.dedup.is_duplicate(&event)? {
                tracing::warn!(
                    kind = %event.kind,
                    status = %event.status,
                    sequence_marker = %event.sequence_marker,
                    "duplicate lifecycle event dropped"
                );
                self.metrics.record_duplicate(&stream);
                self.metrics.record_event(&stream, "duplicate");
                return Ok(Dispatch::Duplicate);
            }

            let record = event.clone();
            let changes = match apply(event).await {
                Ok(changes) => changes,
                Err(err) => {
                    self.metrics.record_event(&stream, "failed");
                    return Err(err);
                }
            };
            self.dedup.record(&record)?;
            self.metrics.record_event(&stream, "processed");

            self.notifier.notify_all(&changes).await;
            Ok(Dispatch::Handled(changes))
        }
        .instrument(span)
        .await
    }
}

/// Result of removing a service and its exclusively owned connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Teardown {
    /// The removed service.
    pub service: ConnectivityService,
    /// Connections removed with it.
    pub deleted_connections: Vec<ConnectionId>,
    /// Connections kept because another live service still uses them.
    pub retained_connections: Vec<ConnectionId>,
    /// Services that were supported by the removed service.
    pub dependents: Vec<ServiceId>,
}

/// Returns every connection reachable from `roots` through lower references.
pub(crate) fn connection_closure<'a>(
    roots: impl IntoIterator<Item = &'a ConnectionId>,
    by_id: &HashMap<&ConnectionId, &Connection>,
) -> BTreeSet<ConnectionId> {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<&ConnectionId> = roots.into_iter().collect();
    while let Some(id) = stack.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }
        if let Some(connection) = by_id.get(id) {
            stack.extend(connection.lower_connections.iter());
        }
    }
    seen
}

/// Removes a service and the connections only it uses.
///
/// A connection reachable from any other service, directly or through lower
/// references, is kept. Returns `None` if the service does not exist.
///
/// # Errors
///
/// Returns an error if the store cannot be read or the commit fails; nothing
/// is removed in that case.
#[tracing::instrument(skip(store, locks))]
pub async fn teardown_service<S: GraphStore + ?Sized>(
    store: &S,
    locks: &ServiceLocks,
    service_id: &ServiceId,
) -> Result<Option<Teardown>> {
    let _guard = locks.acquire(service_id).await?;
    let context = store.context().await?;
    let Some(service) = context.services.iter().find(|s| &s.id == service_id).cloned() else {
        tracing::info!("service not found; nothing to tear down");
        return Ok(None);
    };

    let by_id: HashMap<&ConnectionId, &Connection> =
        context.connections.iter().map(|c| (&c.id, c)).collect();
    let owned = connection_closure(&service.connections, &by_id);
    let shared = connection_closure(
        context
            .services
            .iter()
            .filter(|s| &s.id != service_id)
            .flat_map(|s| s.connections.iter()),
        &by_id,
    );
    let (retained, deleted): (Vec<ConnectionId>, Vec<ConnectionId>) =
        owned.into_iter().partition(|id| shared.contains(id));
    let dependents = SupportGraph::build(&context.services).supported_by(service_id);

    let mut batch = WriteBatch::new();
    for id in &deleted {
        batch.delete_connection(id.clone());
    }
    batch.delete_service(service_id.clone());
    store.commit(batch).await?;

    tracing::info!(
        deleted = deleted.len(),
        retained = retained.len(),
        dependents = dependents.len(),
        "service torn down"
    );
    if !dependents.is_empty() {
        tracing::warn!(dependents = ?dependents, "removed service still supported other services");
    }
    Ok(Some(Teardown {
        service,
        deleted_connections: deleted,
        retained_connections: retained,
        dependents,
    }))
}

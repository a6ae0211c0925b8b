//! Layer-ordered state propagation.
//!
//! A [`LayerPropagator`] pass walks every installed connectivity service in
//! layer order (`PHOTONIC_MEDIA`, `ODU`, `DSR`, `ETH`, then by id) and settles
//! each one in its own transaction:
//!
//! 1. Take the service lock and re-read the service from the store.
//! 2. Resolve each top connection (and, post-order, everything beneath it).
//! 3. Derive the service state from its top connections together with the
//!    current state of its supporting services.
//! 4. Commit changed connections and the service in one batch.
//!
//! When a service changes, the services it supports are settled depth-first
//! right away. Because a supported service is always evaluated against both
//! its own connections and every supporter, a locked supporter keeps it
//! locked, and it only returns to service once all of its direct inputs are
//! healthy.
//!
//! Failures abort the affected service only; the pass continues with the
//! rest and reports what did settle.

use std::collections::{HashMap, HashSet};
use std::collections::hash_map::Entry;
use std::sync::Arc;

use lumen_core::{EdgePointId, ServiceId};

use crate::error::{Error, Result};
use crate::lock::ServiceLocks;
use crate::metrics::{EngineMetrics, time_propagation};
use crate::model::{ConnectivityService, OperationalState, ServiceState};
use crate::resolver::{ConnectionStateResolver, DEFAULT_MAX_LOWER_DEPTH, EdgePointOverrides};
use crate::store::{GraphStore, WriteBatch};
use crate::support::SupportGraph;

/// A service whose externally visible state changed during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceChange {
    /// The service as persisted at the end of the pass.
    pub service: ConnectivityService,
    /// The state the service had before the pass touched it.
    pub previous: ServiceState,
}

impl ServiceChange {
    /// Returns the settled state.
    #[must_use]
    pub const fn current(&self) -> ServiceState {
        self.service.state()
    }
}

/// Changes collected during one pass, first-seen order, one entry per service.
#[derive(Debug, Default)]
struct ChangeLog {
    order: Vec<ServiceId>,
    changes: HashMap<ServiceId, ServiceChange>,
}

impl ChangeLog {
    fn record(&mut self, change: ServiceChange) {
        match self.changes.entry(change.service.id.clone()) {
            Entry::Occupied(mut entry) => entry.get_mut().service = change.service,
            Entry::Vacant(entry) => {
                self.order.push(change.service.id.clone());
                entry.insert(change);
            }
        }
    }

    fn into_changes(mut self) -> Vec<ServiceChange> {
        self.order
            .iter()
            .filter_map(|id| self.changes.remove(id))
            .filter(|change| change.current() != change.previous)
            .collect()
    }
}

/// Combines input states: any `Disabled` wins, then any unknown, else `Enabled`.
/// Returns `None` for an empty input.
fn derive_service_state(inputs: &[Option<OperationalState>]) -> Option<OperationalState> {
    if inputs.is_empty() {
        return None;
    }
    if inputs.contains(&Some(OperationalState::Disabled)) {
        return Some(OperationalState::Disabled);
    }
    if inputs.iter().any(Option::is_none) {
        return None;
    }
    Some(OperationalState::Enabled)
}

/// Walks the service hierarchy applying the resolver and cascading changes.
pub struct LayerPropagator<S: GraphStore + ?Sized> {
    store: Arc<S>,
    locks: Arc<ServiceLocks>,
    metrics: EngineMetrics,
    max_depth: usize,
}

impl<S: GraphStore + ?Sized> Clone for LayerPropagator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            locks: Arc::clone(&self.locks),
            metrics: self.metrics,
            max_depth: self.max_depth,
        }
    }
}

impl<S: GraphStore + ?Sized> LayerPropagator<S> {
    /// Creates a propagator with its own lock registry.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self::with_locks(store, Arc::new(ServiceLocks::new()))
    }

    /// Creates a propagator sharing a lock registry with other writers.
    #[must_use]
    pub fn with_locks(store: Arc<S>, locks: Arc<ServiceLocks>) -> Self {
        Self {
            store,
            locks,
            metrics: EngineMetrics::new(),
            max_depth: DEFAULT_MAX_LOWER_DEPTH,
        }
    }

    /// Sets the maximum lower-connection depth.
    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Returns the store the propagator writes to.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the lock registry.
    #[must_use]
    pub fn locks(&self) -> &Arc<ServiceLocks> {
        &self.locks
    }

    /// Runs a full pass for a set of edge point state changes.
    ///
    /// Returns each service whose externally visible state changed, once,
    /// with its state before the pass and its settled state after it.
    ///
    /// # Errors
    ///
    /// Returns an error only if the connectivity context cannot be read.
    /// Per-service failures are logged and skipped.
    #[tracing::instrument(skip_all, fields(edge_points = changed.len()))]
    pub async fn propagate(
        &self,
        changed: &[(EdgePointId, OperationalState)],
    ) -> Result<Vec<ServiceChange>> {
        let _timer = time_propagation();
        let overrides: EdgePointOverrides = changed.iter().cloned().collect();

        let context = self.store.context().await?;
        let graph = SupportGraph::build(&context.services);
        if let Err(err) = graph.check_acyclic() {
            tracing::error!(error = %err, "service support graph is cyclic; cascade bounded by visited set");
        }

        let mut ordered: Vec<&ConnectivityService> = context.services.iter().collect();
        ordered.sort_by(|a, b| {
            a.layer
                .rank()
                .cmp(&b.layer.rank())
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut log = ChangeLog::default();
        for service in ordered {
            self.settle_and_cascade(&service.id, &overrides, &graph, &mut log)
                .await;
        }

        let changes = log.into_changes();
        tracing::info!(changed_services = changes.len(), "propagation pass complete");
        Ok(changes)
    }

    /// Re-settles specific services and cascades to what they support.
    ///
    /// Used by lifecycle drivers after a service's connections were created or
    /// installed. No edge point overrides apply.
    ///
    /// # Errors
    ///
    /// Returns an error only if the connectivity context cannot be read.
    #[tracing::instrument(skip_all, fields(roots = roots.len()))]
    pub async fn reevaluate(&self, roots: &[ServiceId]) -> Result<Vec<ServiceChange>> {
        let context = self.store.context().await?;
        let graph = SupportGraph::build(&context.services);
        let overrides = EdgePointOverrides::new();
        let mut log = ChangeLog::default();
        for root in roots {
            self.settle_and_cascade(root, &overrides, &graph, &mut log)
                .await;
        }
        Ok(log.into_changes())
    }

    async fn settle_and_cascade(
        &self,
        root: &ServiceId,
        overrides: &EdgePointOverrides,
        graph: &SupportGraph,
        log: &mut ChangeLog,
    ) {
        if !self.settle_logged(root, overrides, log).await {
            return;
        }
        let mut visited = HashSet::from([root.clone()]);
        let mut stack: Vec<ServiceId> = graph.supported_by(root).into_iter().rev().collect();
        while let Some(id) = stack.pop() {
            if !visited.insert(id.clone()) {
                continue;
            }
            if self.settle_logged(&id, overrides, log).await {
                stack.extend(graph.supported_by(&id).into_iter().rev());
            }
        }
    }

    /// Settles one service, isolating failures. Returns true if its state changed.
    async fn settle_logged(
        &self,
        service_id: &ServiceId,
        overrides: &EdgePointOverrides,
        log: &mut ChangeLog,
    ) -> bool {
        match self.settle(service_id, overrides).await {
            Ok(Some(change)) => {
                log.record(change);
                true
            }
            Ok(None) => false,
            Err(err) => {
                match &err {
                    Error::CycleDetected { .. } | Error::DepthExceeded { .. } => {
                        tracing::error!(service_id = %service_id, error = %err, "malformed connection graph; service left unchanged");
                    }
                    _ => {
                        tracing::warn!(service_id = %service_id, error = %err, "service update aborted");
                    }
                }
                self.metrics.record_entity_failure(err.kind_label());
                false
            }
        }
    }

    /// Read→compute→write round trip for one service under its lock.
    ///
    /// Returns `Some` when the service's own state changed in this step.
    async fn settle(
        &self,
        service_id: &ServiceId,
        overrides: &EdgePointOverrides,
    ) -> Result<Option<ServiceChange>> {
        let _guard = self.locks.acquire(service_id).await?;

        let Some(service) = self.store.service(service_id).await? else {
            tracing::warn!(service_id = %service_id, "service not found; skipped");
            return Ok(None);
        };
        if !service.is_installed() {
            tracing::debug!(service_id = %service_id, lifecycle = ?service.lifecycle_state, "service not installed; skipped");
            return Ok(None);
        }

        let resolver =
            ConnectionStateResolver::new(&*self.store, overrides).with_max_depth(self.max_depth);
        let mut batch = WriteBatch::new();
        let mut merged = HashSet::new();
        let mut inputs = Vec::with_capacity(service.connections.len() + service.supporting_services.len());

        for connection_id in &service.connections {
            let Some(connection) = self.store.connection(connection_id).await? else {
                tracing::warn!(
                    service_id = %service_id,
                    connection_id = %connection_id,
                    "top connection not found"
                );
                inputs.push(None);
                continue;
            };
            let resolution = match resolver.resolve(&connection).await {
                Ok(resolution) => resolution,
                Err(err @ (Error::CycleDetected { .. } | Error::DepthExceeded { .. })) => {
                    tracing::error!(
                        service_id = %service_id,
                        connection_id = %connection_id,
                        error = %err,
                        "malformed lower-connection graph; connection left unchanged"
                    );
                    self.metrics.record_entity_failure(err.kind_label());
                    inputs.push(None);
                    continue;
                }
                Err(err) => return Err(err),
            };
            for outcome in resolution.changed() {
                if let Some(next) = outcome.transitioned() {
                    if merged.insert(next.id.clone()) {
                        self.metrics
                            .record_connection_transition(next.layer, next.operational_state);
                        tracing::info!(
                            connection_id = %next.id,
                            layer = %next.layer,
                            from = %outcome.connection.operational_state,
                            to = %next.operational_state,
                            "connection state changed"
                        );
                        batch.merge_connection(next);
                    }
                }
            }
            inputs.push(Some(
                resolution.state.unwrap_or(connection.operational_state),
            ));
        }

        for supporter_id in &service.supporting_services {
            match self.store.service(supporter_id).await? {
                Some(supporter) => inputs.push(Some(supporter.operational_state)),
                None => tracing::warn!(
                    service_id = %service_id,
                    supporting_service_id = %supporter_id,
                    "supporting service not found; ignored"
                ),
            }
        }

        let previous = service.state();
        let next = derive_service_state(&inputs)
            .map_or(previous, ServiceState::from_operational);
        let updated = service.with_state(next);
        let changed = next != previous;
        if changed {
            batch.merge_service(updated.clone());
        }

        if !batch.is_empty() {
            self.store.commit(batch).await?;
        }

        if !changed {
            return Ok(None);
        }
        self.metrics
            .record_service_transition(updated.layer, updated.operational_state);
        tracing::info!(
            service_id = %service_id,
            layer = %updated.layer,
            from = %previous,
            to = %next,
            "service state changed"
        );
        Ok(Some(ServiceChange {
            service: updated,
            previous,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Connection, ConnectionEndPoint, EdgePoint, EndpointRole, LayerProtocolName,
    };
    use crate::store::memory::InMemoryGraphStore;
    use lumen_core::{ConnectionId, NodeId};

    fn ep(id: &str) -> EdgePoint {
        let node = id.split(':').next().unwrap_or(id);
        EdgePoint::new(EdgePointId::new(id), NodeId::new(node), LayerProtocolName::Odu)
    }

    fn leaf(id: &str, a: &str, z: &str) -> Connection {
        let cep = |e: &str, role| {
            let node = e.split(':').next().unwrap_or(e);
            ConnectionEndPoint::derive(NodeId::new(node), EdgePointId::new(e), LayerProtocolName::Odu, role)
        };
        Connection::new(ConnectionId::new(id), id, LayerProtocolName::Odu)
            .with_end_point(cep(a, EndpointRole::AEnd))
            .with_end_point(cep(z, EndpointRole::ZEnd))
    }

    fn store_with(batch: WriteBatch) -> Arc<InMemoryGraphStore> {
        let store = Arc::new(InMemoryGraphStore::new());
        store.apply(batch).unwrap();
        store
    }

    #[test]
    fn service_state_derivation() {
        use OperationalState::{Disabled, Enabled};
        assert_eq!(derive_service_state(&[]), None);
        assert_eq!(derive_service_state(&[Some(Enabled)]), Some(Enabled));
        assert_eq!(derive_service_state(&[None, Some(Disabled)]), Some(Disabled));
        assert_eq!(derive_service_state(&[Some(Enabled), None]), None);
    }

    #[test]
    fn change_log_keeps_first_previous_and_drops_round_trips() {
        let svc = ConnectivityService::new(ServiceId::new("S"), "s", LayerProtocolName::Odu);
        let mut log = ChangeLog::default();
        log.record(ServiceChange {
            service: svc.clone().with_state(ServiceState::OUT_OF_SERVICE),
            previous: ServiceState::IN_SERVICE,
        });
        log.record(ServiceChange {
            service: svc.with_state(ServiceState::IN_SERVICE),
            previous: ServiceState::OUT_OF_SERVICE,
        });
        assert!(log.into_changes().is_empty());
    }

    #[tokio::test]
    async fn disabled_edge_point_locks_service() -> Result<()> {
        let mut batch = WriteBatch::new();
        batch
            .merge_edge_point(ep("A:1"))
            .merge_edge_point(ep("B:1"))
            .merge_connection(leaf("XC", "A:1", "B:1"))
            .merge_service(
                ConnectivityService::new(ServiceId::new("S"), "s", LayerProtocolName::Odu)
                    .with_connection(ConnectionId::new("XC")),
            );
        let store = store_with(batch);
        let propagator = LayerPropagator::new(Arc::clone(&store));

        let changes = propagator
            .propagate(&[(EdgePointId::new("A:1"), OperationalState::Disabled)])
            .await?;
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].previous, ServiceState::IN_SERVICE);
        assert_eq!(changes[0].current(), ServiceState::OUT_OF_SERVICE);

        let xc = store.connection(&ConnectionId::new("XC")).await?.unwrap();
        assert_eq!(xc.operational_state, OperationalState::Disabled);
        Ok(())
    }

    #[tokio::test]
    async fn pending_service_is_not_touched() -> Result<()> {
        let mut pending =
            ConnectivityService::new(ServiceId::new("P"), "p", LayerProtocolName::Odu)
                .with_connection(ConnectionId::new("XC"))
                .with_state(ServiceState::OUT_OF_SERVICE);
        pending.lifecycle_state = crate::model::LifecycleState::Pending;
        let mut batch = WriteBatch::new();
        batch
            .merge_edge_point(ep("A:1"))
            .merge_edge_point(ep("B:1"))
            .merge_connection(leaf("XC", "A:1", "B:1"))
            .merge_service(pending);
        let store = store_with(batch);

        let changes = LayerPropagator::new(Arc::clone(&store)).propagate(&[]).await?;
        assert!(changes.is_empty());
        let stored = store.service(&ServiceId::new("P")).await?.unwrap();
        assert_eq!(stored.state(), ServiceState::OUT_OF_SERVICE);
        Ok(())
    }

    #[tokio::test]
    async fn service_without_inputs_keeps_state() -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.merge_service(
            ConnectivityService::new(ServiceId::new("BARE"), "bare", LayerProtocolName::Dsr)
                .with_state(ServiceState::OUT_OF_SERVICE),
        );
        let store = store_with(batch);
        let changes = LayerPropagator::new(store).propagate(&[]).await?;
        assert!(changes.is_empty());
        Ok(())
    }
}

//! Topology change intake.
//!
//! Topology discovery reports edge point state changes in batches. The
//! [`TopologyListener`] persists the new edge point states, runs one
//! propagation pass over them and publishes a notification per service whose
//! state actually changed.

use tracing::Instrument;

use lumen_core::EdgePointId;
use lumen_core::observability::propagation_span;

use crate::error::Result;
use crate::model::OperationalState;
use crate::notifier::Notifier;
use crate::propagator::{LayerPropagator, ServiceChange};
use crate::store::{GraphStore, WriteBatch};

/// Applies topology change batches.
pub struct TopologyListener<S: GraphStore + ?Sized> {
    propagator: LayerPropagator<S>,
    notifier: Notifier,
}

impl<S: GraphStore + ?Sized> TopologyListener<S> {
    /// Creates a listener.
    #[must_use]
    pub fn new(propagator: LayerPropagator<S>, notifier: Notifier) -> Self {
        Self {
            propagator,
            notifier,
        }
    }

    /// Handles a batch of `(edge point, new state)` pairs.
    ///
    /// Unknown edge points still take part in the pass through the override
    /// map; they are not created.
    ///
    /// # Errors
    ///
    /// Returns an error if the edge point updates cannot be committed or the
    /// connectivity context cannot be read. Per-service failures and publish
    /// failures are logged only.
    pub async fn on_edge_point_changes(
        &self,
        changes: &[(EdgePointId, OperationalState)],
    ) -> Result<Vec<ServiceChange>> {
        let span = propagation_span("topology_change", changes.len());
        async move {
            self.record_edge_points(changes).await?;
            let settled = self.propagator.propagate(changes).await?;
            let published = self.notifier.notify_all(&settled).await;
            tracing::info!(changed = settled.len(), published, "topology change applied");
            Ok(settled)
        }
        .instrument(span)
        .await
    }

    async fn record_edge_points(&self, changes: &[(EdgePointId, OperationalState)]) -> Result<()> {
        let store = self.propagator.store();
        let mut batch = WriteBatch::new();
        for (id, state) in changes {
            match store.edge_point(id).await? {
                Some(edge_point) if edge_point.operational_state != *state => {
                    batch.merge_edge_point(edge_point.with_state(*state));
                }
                Some(_) => {}
                None => tracing::warn!(edge_point_id = %id, "edge point not found; applied as override only"),
            }
        }
        if batch.is_empty() {
            return Ok(());
        }
        store.commit(batch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::model::{
        Connection, ConnectionEndPoint, ConnectivityService, EdgePoint, EndpointRole,
        LayerProtocolName, ServiceState,
    };
    use crate::notifier::InMemoryNotificationSink;
    use crate::store::memory::InMemoryGraphStore;
    use lumen_core::{ConnectionId, NodeId, ServiceId};

    const ODU: LayerProtocolName = LayerProtocolName::Odu;

    fn fixture() -> Arc<InMemoryGraphStore> {
        let cep = |node: &str, ep: &str, role| {
            ConnectionEndPoint::derive(NodeId::new(node), EdgePointId::new(ep), ODU, role)
        };
        let mut batch = WriteBatch::new();
        batch
            .merge_edge_point(EdgePoint::new(EdgePointId::new("A:1"), NodeId::new("A"), ODU))
            .merge_edge_point(EdgePoint::new(EdgePointId::new("B:1"), NodeId::new("B"), ODU))
            .merge_connection(
                Connection::new(ConnectionId::new("XC"), "xc", ODU)
                    .with_end_point(cep("A", "A:1", EndpointRole::AEnd))
                    .with_end_point(cep("B", "B:1", EndpointRole::ZEnd)),
            )
            .merge_service(
                ConnectivityService::new(ServiceId::new("S"), "s", ODU)
                    .with_connection(ConnectionId::new("XC")),
            );
        let store = Arc::new(InMemoryGraphStore::new());
        store.apply(batch).unwrap();
        store
    }

    #[tokio::test]
    async fn down_then_up_notifies_twice_and_persists_edge_point() -> Result<()> {
        let store = fixture();
        let sink = Arc::new(InMemoryNotificationSink::new());
        let listener = TopologyListener::new(
            LayerPropagator::new(Arc::clone(&store)),
            Notifier::new(sink.clone()),
        );

        let down = listener
            .on_edge_point_changes(&[(EdgePointId::new("A:1"), OperationalState::Disabled)])
            .await?;
        assert_eq!(down.len(), 1);
        let ep = store.edge_point(&EdgePointId::new("A:1")).await?.unwrap();
        assert_eq!(ep.operational_state, OperationalState::Disabled);

        let up = listener
            .on_edge_point_changes(&[(EdgePointId::new("A:1"), OperationalState::Enabled)])
            .await?;
        assert_eq!(up.len(), 1);
        assert_eq!(up[0].current(), ServiceState::IN_SERVICE);

        assert_eq!(sink.published()?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn repeated_state_produces_no_notification() -> Result<()> {
        let store = fixture();
        let sink = Arc::new(InMemoryNotificationSink::new());
        let listener = TopologyListener::new(LayerPropagator::new(store), Notifier::new(sink.clone()));
        let changes = [(EdgePointId::new("A:1"), OperationalState::Enabled)];
        assert!(listener.on_edge_point_changes(&changes).await?.is_empty());
        assert!(sink.published()?.is_empty());
        Ok(())
    }
}

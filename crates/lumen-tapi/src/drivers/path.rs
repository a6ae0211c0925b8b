//! Path-computation result driver.
//!
//! A successful computation turns the computed [`PathDescription`] into
//! graph entities: one cross-connection per segment, one top connection per
//! layer (lower connections: that layer's cross-connections plus the top
//! connection of the layer beneath), and a pending service on the highest
//! top connection. All identifiers are content-derived, so building the same
//! path twice produces the same entities.
//!
//! A failed computation or a cancelled reservation removes the service and
//! its exclusively owned connections.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use lumen_core::{ConnectionId, EdgePointId, NodeId, ServiceId, StreamId};

use super::{DriverContext, Dispatch, LifecycleDriver, PathComputer, teardown_service};
use crate::error::{Error, Result};
use crate::events::{EventKind, EventStatus, LifecycleEvent};
use crate::metrics::EngineMetrics;
use crate::model::{
    Connection, ConnectionEndPoint, ConnectionKind, ConnectivityService, EndpointRole,
    LayerProtocolName, LifecycleState, ServiceState,
};
use crate::propagator::ServiceChange;
use crate::store::{GraphStore, WriteBatch};

/// One end of a path segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Termination {
    /// Node hosting the edge point.
    pub node: NodeId,
    /// The terminating edge point.
    pub edge_point: EdgePointId,
}

impl Termination {
    /// Creates a termination.
    #[must_use]
    pub fn new(node: impl Into<String>, edge_point: impl Into<String>) -> Self {
        Self {
            node: NodeId::new(node),
            edge_point: EdgePointId::new(edge_point),
        }
    }
}

/// A hop of a computed path at one layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathSegment {
    /// Layer of the hop.
    pub layer: LayerProtocolName,
    /// A end.
    pub a_end: Termination,
    /// Z end.
    pub z_end: Termination,
}

/// Ordered per-layer segments returned by path computation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathDescription {
    /// Segments, A to Z within each layer.
    pub segments: Vec<PathSegment>,
}

impl PathDescription {
    /// Returns the layers the path touches, in propagation order.
    #[must_use]
    pub fn layers(&self) -> Vec<LayerProtocolName> {
        let layers: BTreeSet<LayerProtocolName> = self.segments.iter().map(|s| s.layer).collect();
        layers.into_iter().collect()
    }

    fn segments_at(&self, layer: LayerProtocolName) -> impl Iterator<Item = &PathSegment> {
        self.segments.iter().filter(move |s| s.layer == layer)
    }
}

/// A request to compute a path for a new service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    /// Identifier the service will have.
    pub service_id: ServiceId,
    /// Customer-facing service name.
    pub service_name: String,
    /// Layer of the requested service.
    pub layer: LayerProtocolName,
    /// Service A end.
    pub a_end: Termination,
    /// Service Z end.
    pub z_end: Termination,
    /// Services at adjacent layers this service is built on.
    #[serde(default)]
    pub supporting_services: Vec<ServiceId>,
}

impl ServiceRequest {
    /// Creates a request whose service id is derived from its name.
    #[must_use]
    pub fn new(
        service_name: impl Into<String>,
        layer: LayerProtocolName,
        a_end: Termination,
        z_end: Termination,
    ) -> Self {
        let service_name = service_name.into();
        Self {
            service_id: ServiceId::derive(&service_name),
            service_name,
            layer,
            a_end,
            z_end,
            supporting_services: Vec::new(),
        }
    }

    /// Declares a supporting service.
    #[must_use]
    pub fn supported_by(mut self, service: ServiceId) -> Self {
        self.supporting_services.push(service);
        self
    }
}

fn end_points(
    layer: LayerProtocolName,
    a: &Termination,
    z: &Termination,
) -> [ConnectionEndPoint; 2] {
    [
        ConnectionEndPoint::derive(a.node.clone(), a.edge_point.clone(), layer, EndpointRole::AEnd),
        ConnectionEndPoint::derive(z.node.clone(), z.edge_point.clone(), layer, EndpointRole::ZEnd),
    ]
}

fn connection_id(layer: LayerProtocolName, kind: ConnectionKind, a: &Termination, z: &Termination) -> ConnectionId {
    ConnectionId::derive(&[
        layer.as_label(),
        kind.as_label(),
        a.node.as_str(),
        a.edge_point.as_str(),
        z.node.as_str(),
        z.edge_point.as_str(),
    ])
}

fn connection(
    layer: LayerProtocolName,
    kind: ConnectionKind,
    a: &Termination,
    z: &Termination,
) -> Connection {
    let name = format!("{layer}-{}-{}-{}", kind.as_label(), a.edge_point, z.edge_point);
    let [a_cep, z_cep] = end_points(layer, a, z);
    Connection::new(connection_id(layer, kind, a, z), name, layer)
        .with_end_point(a_cep)
        .with_end_point(z_cep)
}

/// Builds the connections and pending service for a computed path.
///
/// Connections are returned lowest layer first.
///
/// # Errors
///
/// Returns [`Error::PathComputation`] if the path has no segments.
pub fn build_entities(
    request: &ServiceRequest,
    path: &PathDescription,
) -> Result<(Vec<Connection>, ConnectivityService)> {
    let layers = path.layers();
    if layers.is_empty() {
        return Err(Error::PathComputation {
            message: format!("empty path for service {}", request.service_id),
        });
    }

    let mut connections = Vec::new();
    let mut below: Option<ConnectionId> = None;
    for layer in layers {
        let segments: Vec<&PathSegment> = path.segments_at(layer).collect();
        let (Some(first), Some(last)) = (segments.first(), segments.last()) else {
            continue;
        };

        let mut top = connection(layer, ConnectionKind::Top, &first.a_end, &last.z_end);
        for segment in &segments {
            let xc = connection(layer, ConnectionKind::Cross, &segment.a_end, &segment.z_end);
            top = top.with_lower(xc.id.clone());
            connections.push(xc);
        }
        if let Some(lower_top) = below.take() {
            top = top.with_lower(lower_top);
        }
        below = Some(top.id.clone());
        connections.push(top);
    }

    let mut service = ConnectivityService::new(
        request.service_id.clone(),
        request.service_name.clone(),
        request.layer,
    )
    .with_state(ServiceState::OUT_OF_SERVICE);
    service.lifecycle_state = LifecycleState::Pending;
    if let Some(top) = below {
        service = service.with_connection(top);
    }
    for supporter in &request.supporting_services {
        service = service.supported_by(supporter.clone());
    }
    Ok((connections, service))
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("pending path lock poisoned")
}

/// Handles path computation results.
pub struct PathComputationDriver<S: GraphStore + ?Sized> {
    ctx: DriverContext<S>,
    computer: Arc<dyn PathComputer>,
    stream: StreamId,
    pending: RwLock<HashMap<ServiceId, (ServiceRequest, PathDescription)>>,
}

impl<S: GraphStore + ?Sized> PathComputationDriver<S> {
    /// Creates a driver consuming events from `stream`.
    #[must_use]
    pub fn new(ctx: DriverContext<S>, computer: Arc<dyn PathComputer>, stream: StreamId) -> Self {
        Self {
            ctx,
            computer,
            stream,
            pending: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the stream this driver consumes.
    #[must_use]
    pub fn stream(&self) -> &StreamId {
        &self.stream
    }

    /// Asks the path computer for a path and returns the resulting event.
    ///
    /// A computed path is held until its `Successful` event is handled.
    ///
    /// # Errors
    ///
    /// Returns an error only if the pending-path registry is poisoned; a
    /// failed computation is reported as a `Failed` event.
    #[tracing::instrument(skip(self, request), fields(service_id = %request.service_id))]
    pub async fn request_path(&self, request: ServiceRequest) -> Result<LifecycleEvent> {
        let service_id = request.service_id.clone();
        match self.computer.compute_path(&request).await {
            Ok(path) => {
                tracing::info!(segments = path.segments.len(), "path computed");
                let held = {
                    let mut pending = self.pending.write().map_err(poison_err)?;
                    pending.insert(service_id.clone(), (request, path));
                    pending.len()
                };
                EngineMetrics::new().set_pending_paths(held);
                Ok(LifecycleEvent::successful(
                    self.stream.clone(),
                    EventKind::PathComputationRequest,
                    service_id,
                    "Path is calculated",
                ))
            }
            Err(err) => {
                tracing::warn!(error = %err, "path computation failed");
                Ok(LifecycleEvent::failed(
                    self.stream.clone(),
                    EventKind::PathComputationRequest,
                    service_id,
                    err.to_string(),
                ))
            }
        }
    }

    fn pending_path(&self, service_id: &ServiceId) -> Result<Option<(ServiceRequest, PathDescription)>> {
        Ok(self.pending.read().map_err(poison_err)?.get(service_id).cloned())
    }

    fn forget_path(&self, service_id: &ServiceId) -> Result<()> {
        let held = {
            let mut pending = self.pending.write().map_err(poison_err)?;
            pending.remove(service_id);
            pending.len()
        };
        EngineMetrics::new().set_pending_paths(held);
        Ok(())
    }

    async fn install_path(&self, service_id: &ServiceId) -> Result<Vec<ServiceChange>> {
        let Some((request, path)) = self.pending_path(service_id)? else {
            return Err(Error::PathComputation {
                message: format!("no computed path held for service {service_id}"),
            });
        };
        let (connections, service) = build_entities(&request, &path)?;

        let (created, reused) = {
            let _guard = self.ctx.locks().acquire(service_id).await?;
            let store = self.ctx.store();
            let mut batch = WriteBatch::new();
            let mut reused = 0;
            // Stored connections carry live derived state and lifecycle; only
            // missing ones are written.
            for connection in connections {
                if store.connection(&connection.id).await?.is_some() {
                    reused += 1;
                } else {
                    batch.merge_connection(connection);
                }
            }
            if store.service(service_id).await?.is_some() {
                tracing::warn!("service already exists; kept as stored");
            } else {
                batch.merge_service(service);
            }
            let created = batch.len();
            if !batch.is_empty() {
                store.commit(batch).await?;
            }
            (created, reused)
        };
        self.forget_path(service_id)?;
        tracing::info!(created, reused, "path entities created");
        Ok(Vec::new())
    }

    async fn remove_path(&self, service_id: &ServiceId) -> Result<Vec<ServiceChange>> {
        self.forget_path(service_id)?;
        let Some(teardown) =
            teardown_service(&**self.ctx.store(), self.ctx.locks(), service_id).await?
        else {
            return Ok(Vec::new());
        };
        self.ctx.propagator.reevaluate(&teardown.dependents).await
    }

    async fn apply(&self, event: LifecycleEvent) -> Result<Vec<ServiceChange>> {
        match (event.kind, event.status) {
            (EventKind::PathComputationRequest, EventStatus::Pending) => {
                tracing::info!(message = %event.status_message, "path computation in progress");
                Ok(Vec::new())
            }
            (EventKind::PathComputationRequest, EventStatus::Successful) => {
                self.install_path(&event.service_id).await
            }
            (EventKind::PathComputationRequest, EventStatus::Failed)
            | (EventKind::CancelResourceReserve, EventStatus::Successful) => {
                tracing::info!(kind = %event.kind, status = %event.status, "removing path entities");
                self.remove_path(&event.service_id).await
            }
            (EventKind::CancelResourceReserve, status) => {
                tracing::warn!(%status, message = %event.status_message, "resource release not confirmed");
                Ok(Vec::new())
            }
            (kind, _) => {
                tracing::warn!(%kind, "event kind not handled by path computation driver");
                Ok(Vec::new())
            }
        }
    }
}

#[async_trait]
impl<S: GraphStore + ?Sized + 'static> LifecycleDriver for PathComputationDriver<S> {
    async fn handle(&self, event: LifecycleEvent) -> Result<Dispatch> {
        self.ctx.run(event, |event| self.apply(event)).await
    }
}

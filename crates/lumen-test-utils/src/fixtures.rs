//! Test fixtures for topology graphs and engine collaborators.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use lumen_core::{ConnectionId, EdgePointId, NodeId, ServiceId};
use lumen_tapi::drivers::path::{PathDescription, PathSegment, ServiceRequest, Termination};
use lumen_tapi::drivers::{InterfaceProvisioner, PathComputer, ProvisionRequest};
use lumen_tapi::error::{Error, Result};
use lumen_tapi::model::{
    Connection, ConnectionEndPoint, ConnectivityService, EdgePoint, EndpointRole,
    LayerProtocolName, OperationalState,
};
use lumen_tapi::notifier::{Notification, NotificationSink};
use lumen_tapi::store::WriteBatch;

use crate::storage::RecordingGraphStore;

/// Node part of an edge point id (`ROADM-A:DEG1-TTP` -> `ROADM-A`).
fn node_of(edge_point: &str) -> NodeId {
    NodeId::new(edge_point.split(':').next().unwrap_or(edge_point))
}

fn cep(edge_point: &str, layer: LayerProtocolName, role: EndpointRole) -> ConnectionEndPoint {
    ConnectionEndPoint::derive(node_of(edge_point), EdgePointId::new(edge_point), layer, role)
}

/// Fluent builder for seeded topology graphs.
///
/// Edge points, connections and services are created enabled and installed.
#[derive(Debug, Default)]
pub struct TopologyBuilder {
    batch: WriteBatch,
}

impl TopologyBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an enabled edge point; the node is the part before `:`.
    #[must_use]
    pub fn edge_point(mut self, id: &str, layer: LayerProtocolName) -> Self {
        self.batch
            .merge_edge_point(EdgePoint::new(EdgePointId::new(id), node_of(id), layer));
        self
    }

    /// Adds an edge point in the given state.
    #[must_use]
    pub fn edge_point_with_state(
        mut self,
        id: &str,
        layer: LayerProtocolName,
        state: OperationalState,
    ) -> Self {
        self.batch.merge_edge_point(
            EdgePoint::new(EdgePointId::new(id), node_of(id), layer).with_state(state),
        );
        self
    }

    /// Adds a cross-connection between two edge points.
    #[must_use]
    pub fn cross_connection(
        mut self,
        id: &str,
        layer: LayerProtocolName,
        a_end: &str,
        z_end: &str,
    ) -> Self {
        self.batch.merge_connection(
            Connection::new(ConnectionId::new(id), id, layer)
                .with_end_point(cep(a_end, layer, EndpointRole::AEnd))
                .with_end_point(cep(z_end, layer, EndpointRole::ZEnd)),
        );
        self
    }

    /// Adds a top connection over the given lower connections.
    #[must_use]
    pub fn top_connection(mut self, id: &str, layer: LayerProtocolName, lowers: &[&str]) -> Self {
        let connection = lowers
            .iter()
            .fold(Connection::new(ConnectionId::new(id), id, layer), |c, lower| {
                c.with_lower(ConnectionId::new(*lower))
            });
        self.batch.merge_connection(connection);
        self
    }

    /// Adds an in-service, installed service.
    #[must_use]
    pub fn service(
        mut self,
        id: &str,
        layer: LayerProtocolName,
        connections: &[&str],
        supporters: &[&str],
    ) -> Self {
        let mut service = ConnectivityService::new(ServiceId::new(id), id, layer);
        for connection in connections {
            service = service.with_connection(ConnectionId::new(*connection));
        }
        for supporter in supporters {
            service = service.supported_by(ServiceId::new(*supporter));
        }
        self.batch.merge_service(service);
        self
    }

    /// Adds a prebuilt connection.
    #[must_use]
    pub fn raw_connection(mut self, connection: Connection) -> Self {
        self.batch.merge_connection(connection);
        self
    }

    /// Adds a prebuilt service.
    #[must_use]
    pub fn raw_service(mut self, service: ConnectivityService) -> Self {
        self.batch.merge_service(service);
        self
    }

    /// Adds chain `index`: one media cross-connection, an ODU top connection
    /// over it and an ODU, DSR, ETH service stack.
    ///
    /// See [`chain_edge_point`] and [`chain_services`] for the ids.
    #[must_use]
    pub fn chain(self, index: usize) -> Self {
        let a = chain_edge_point(index);
        let z = format!("N{index}Z:P1");
        let mc = format!("MC-{index}");
        let odu = format!("ODU-{index}");
        let [svc_odu, svc_dsr, svc_eth] = chain_services(index);
        self.edge_point(&a, LayerProtocolName::PhotonicMedia)
            .edge_point(&z, LayerProtocolName::PhotonicMedia)
            .cross_connection(&mc, LayerProtocolName::PhotonicMedia, &a, &z)
            .top_connection(&odu, LayerProtocolName::Odu, &[&mc])
            .service(&svc_odu, LayerProtocolName::Odu, &[&odu], &[])
            .service(&svc_dsr, LayerProtocolName::Dsr, &[], &[&svc_odu])
            .service(&svc_eth, LayerProtocolName::Eth, &[], &[&svc_dsr])
    }

    /// Returns the accumulated batch.
    #[must_use]
    pub fn build(self) -> WriteBatch {
        self.batch
    }

    /// Seeds a fresh recording store with the accumulated batch.
    #[must_use]
    pub fn seed(self) -> RecordingGraphStore {
        let store = RecordingGraphStore::new();
        store.seed(self.batch);
        store
    }
}

/// A-end edge point of chain `index`.
#[must_use]
pub fn chain_edge_point(index: usize) -> String {
    format!("N{index}A:P1")
}

/// ODU, DSR and ETH service ids of chain `index`, bottom up.
#[must_use]
pub fn chain_services(index: usize) -> [String; 3] {
    [
        format!("SVC-ODU-{index}"),
        format!("SVC-DSR-{index}"),
        format!("SVC-ETH-{index}"),
    ]
}

/// Ids used by [`end_to_end_topology`].
pub mod e2e {
    /// Edge point whose failure takes down the affected services.
    pub const FAILING_EDGE_POINT: &str = "ROADM-A:DEG1-TTP";
    /// Media connection over the failing edge point.
    pub const MEDIA_CONNECTION: &str = "TOP-A-B-MC";
    /// ODU top connection over the media connection.
    pub const ODU_CONNECTION: &str = "TOP-ODU-1";
    /// ODU service over the ODU top connection.
    pub const ODU_SERVICE: &str = "SVC-ODU-1";
    /// DSR service supported by the ODU service.
    pub const DSR_SERVICE: &str = "SVC-1";
    /// Unaffected ODU service.
    pub const UNRELATED_ODU_SERVICE: &str = "SVC-ODU-2";
    /// Unaffected DSR service.
    pub const UNRELATED_DSR_SERVICE: &str = "SVC-2";
}

/// Two independent ODU/DSR service stacks over media links A-B and C-D.
///
/// Failing [`e2e::FAILING_EDGE_POINT`] affects exactly
/// [`e2e::ODU_SERVICE`] and [`e2e::DSR_SERVICE`].
#[must_use]
pub fn end_to_end_topology() -> TopologyBuilder {
    use LayerProtocolName::{Dsr, Odu, PhotonicMedia};
    TopologyBuilder::new()
        .edge_point(e2e::FAILING_EDGE_POINT, PhotonicMedia)
        .edge_point("ROADM-B:DEG1-TTP", PhotonicMedia)
        .cross_connection(
            e2e::MEDIA_CONNECTION,
            PhotonicMedia,
            e2e::FAILING_EDGE_POINT,
            "ROADM-B:DEG1-TTP",
        )
        .top_connection(e2e::ODU_CONNECTION, Odu, &[e2e::MEDIA_CONNECTION])
        .service(e2e::ODU_SERVICE, Odu, &[e2e::ODU_CONNECTION], &[])
        .service(e2e::DSR_SERVICE, Dsr, &[], &[e2e::ODU_SERVICE])
        .edge_point("ROADM-C:DEG1-TTP", PhotonicMedia)
        .edge_point("ROADM-D:DEG1-TTP", PhotonicMedia)
        .cross_connection("TOP-C-D-MC", PhotonicMedia, "ROADM-C:DEG1-TTP", "ROADM-D:DEG1-TTP")
        .top_connection("TOP-ODU-2", Odu, &["TOP-C-D-MC"])
        .service(e2e::UNRELATED_ODU_SERVICE, Odu, &["TOP-ODU-2"], &[])
        .service(e2e::UNRELATED_DSR_SERVICE, Dsr, &[], &[e2e::UNRELATED_ODU_SERVICE])
}

/// Two-layer path over `ROADM-A` .. `ROADM-C` for a DSR service request:
/// two media segments and one ODU segment.
#[must_use]
pub fn two_layer_path() -> PathDescription {
    let segment = |layer, a: (&str, &str), z: (&str, &str)| PathSegment {
        layer,
        a_end: Termination::new(a.0, a.1),
        z_end: Termination::new(z.0, z.1),
    };
    PathDescription {
        segments: vec![
            segment(
                LayerProtocolName::PhotonicMedia,
                ("ROADM-A", "ROADM-A:DEG1-TTP"),
                ("ROADM-B", "ROADM-B:DEG1-TTP"),
            ),
            segment(
                LayerProtocolName::PhotonicMedia,
                ("ROADM-B", "ROADM-B:DEG2-TTP"),
                ("ROADM-C", "ROADM-C:DEG1-TTP"),
            ),
            segment(
                LayerProtocolName::Odu,
                ("XPDR-A", "XPDR-A:NETWORK1"),
                ("XPDR-C", "XPDR-C:NETWORK1"),
            ),
        ],
    }
}

/// Seeds the edge points of [`two_layer_path`], all enabled.
#[must_use]
pub fn two_layer_path_topology() -> TopologyBuilder {
    let path = two_layer_path();
    path.segments
        .iter()
        .flat_map(|s| [(&s.a_end, s.layer), (&s.z_end, s.layer)])
        .fold(TopologyBuilder::new(), |builder, (end, layer)| {
            builder.edge_point(end.edge_point.as_str(), layer)
        })
}

/// A DSR service request matching [`two_layer_path`].
#[must_use]
pub fn dsr_request(name: &str) -> ServiceRequest {
    ServiceRequest::new(
        name,
        LayerProtocolName::Dsr,
        Termination::new("XPDR-A", "XPDR-A:CLIENT1"),
        Termination::new("XPDR-C", "XPDR-C:CLIENT1"),
    )
}

/// Path computer returning a fixed answer.
#[derive(Debug, Default)]
pub struct StaticPathComputer {
    path: Option<PathDescription>,
    requests: Mutex<Vec<ServiceId>>,
}

impl StaticPathComputer {
    /// Always returns `path`.
    #[must_use]
    pub fn new(path: PathDescription) -> Self {
        Self {
            path: Some(path),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Never finds a path.
    #[must_use]
    pub fn unreachable() -> Self {
        Self::default()
    }

    /// Returns the services paths were requested for.
    #[must_use]
    pub fn requests(&self) -> Vec<ServiceId> {
        self.requests.lock().expect("lock").clone()
    }
}

#[async_trait]
impl PathComputer for StaticPathComputer {
    async fn compute_path(&self, request: &ServiceRequest) -> Result<PathDescription> {
        self.requests
            .lock()
            .expect("lock")
            .push(request.service_id.clone());
        self.path.clone().ok_or_else(|| Error::PathComputation {
            message: "No path available".into(),
        })
    }
}

/// Interface provisioner that records calls and fails on chosen nodes.
#[derive(Debug, Default)]
pub struct RecordingProvisioner {
    failing_nodes: Vec<NodeId>,
    calls: Mutex<Vec<(NodeId, ProvisionRequest)>>,
}

impl RecordingProvisioner {
    /// Succeeds on every node.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails on `node`.
    #[must_use]
    pub fn failing_on(node: &str) -> Self {
        Self {
            failing_nodes: vec![NodeId::new(node)],
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Returns every `(node, request)` seen, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<(NodeId, ProvisionRequest)> {
        self.calls.lock().expect("lock").clone()
    }
}

#[async_trait]
impl InterfaceProvisioner for RecordingProvisioner {
    async fn provision_interfaces(
        &self,
        node: &NodeId,
        request: &ProvisionRequest,
    ) -> Result<Vec<String>> {
        self.calls
            .lock()
            .expect("lock")
            .push((node.clone(), request.clone()));
        if self.failing_nodes.contains(node) {
            return Err(Error::Provisioning {
                node: node.to_string(),
                message: "device rejected configuration".into(),
            });
        }
        Ok(request
            .edge_points
            .iter()
            .map(|ep| format!("{ep}-{}", request.service_name))
            .collect())
    }
}

/// Notification sink that always fails.
#[derive(Debug, Default)]
pub struct FailingSink {
    attempts: Mutex<usize>,
}

impl FailingSink {
    /// Creates a shared failing sink.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the number of publish attempts.
    #[must_use]
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().expect("lock")
    }
}

#[async_trait]
impl NotificationSink for FailingSink {
    async fn publish(&self, _notification: Notification) -> Result<()> {
        *self.attempts.lock().expect("lock") += 1;
        Err(Error::Publish {
            message: "bus unavailable".into(),
        })
    }
}

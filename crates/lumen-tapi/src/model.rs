//! Flat entity model for the layered connectivity topology.
//!
//! This module provides:
//! - `LayerProtocolName`: The fixed layer order used for propagation
//! - `OperationalState` / `AdministrativeState` / `LifecycleState`: Entity states
//! - `EdgePoint`: Ground truth for operational health, owned by topology discovery
//! - `ConnectionEndPoint`: A per-connection, per-layer reference to an edge point
//! - `Connection`: Top connection or cross-connection, with weak lower references
//! - `ConnectivityService`: Customer-facing service built on top connections
//!
//! Entities never own each other. A [`Connection`] refers to its lower
//! connections by [`ConnectionId`] and a [`ConnectivityService`] refers to its
//! connections and supporting services by id; all resolution goes through the
//! graph store.

use serde::{Deserialize, Serialize};

use lumen_core::{CepId, ConnectionId, EdgePointId, NodeId, ServiceId};

/// Layer protocol of an edge point, connection or service.
///
/// The declaration order is the propagation order: a service at a higher
/// layer may only be evaluated after every service beneath it has settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LayerProtocolName {
    /// Physical media and media channels.
    PhotonicMedia,
    /// Optical data unit.
    Odu,
    /// Digital signal rate (client signal).
    Dsr,
    /// Ethernet.
    Eth,
}

impl LayerProtocolName {
    /// All layers in propagation order.
    pub const ORDER: [Self; 4] = [Self::PhotonicMedia, Self::Odu, Self::Dsr, Self::Eth];

    /// Returns the position of this layer in the propagation order.
    #[must_use]
    pub const fn rank(self) -> usize {
        match self {
            Self::PhotonicMedia => 0,
            Self::Odu => 1,
            Self::Dsr => 2,
            Self::Eth => 3,
        }
    }

    /// Returns a label suitable for metrics, logs and identifier hashing.
    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::PhotonicMedia => "PHOTONIC_MEDIA",
            Self::Odu => "ODU",
            Self::Dsr => "DSR",
            Self::Eth => "ETH",
        }
    }
}

impl std::fmt::Display for LayerProtocolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Operational state of an edge point, connection or service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationalState {
    /// Carrying traffic.
    Enabled,
    /// Not carrying traffic.
    Disabled,
}

impl OperationalState {
    /// Returns the worse of two states (`Disabled` dominates).
    #[must_use]
    pub const fn worst(self, other: Self) -> Self {
        match (self, other) {
            (Self::Enabled, Self::Enabled) => Self::Enabled,
            _ => Self::Disabled,
        }
    }

    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for OperationalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Administrative state of a connectivity service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdministrativeState {
    /// Service is locked (not usable).
    Locked,
    /// Service is unlocked (usable).
    Unlocked,
}

impl AdministrativeState {
    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::Unlocked => "unlocked",
        }
    }
}

impl std::fmt::Display for AdministrativeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Lifecycle state of a connection, CEP or service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// Path computed, devices not yet configured.
    #[default]
    Pending,
    /// Devices configured.
    Installed,
}

/// Direction of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Traffic flows in both directions.
    #[default]
    Bidirectional,
    /// Traffic flows from A to Z only.
    Unidirectional,
}

/// Role of a CEP inside its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointRole {
    /// The A end.
    AEnd,
    /// The Z end.
    ZEnd,
}

impl EndpointRole {
    /// Returns the label used in identifier hashing.
    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::AEnd => "a-end",
            Self::ZEnd => "z-end",
        }
    }
}

/// A termination point on a node, the ground truth for operational health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgePoint {
    /// Edge point identifier.
    pub id: EdgePointId,
    /// Node the edge point belongs to.
    pub node: NodeId,
    /// Layer the edge point terminates.
    pub layer: LayerProtocolName,
    /// Current operational state.
    pub operational_state: OperationalState,
}

impl EdgePoint {
    /// Creates an enabled edge point.
    #[must_use]
    pub fn new(id: EdgePointId, node: NodeId, layer: LayerProtocolName) -> Self {
        Self {
            id,
            node,
            layer,
            operational_state: OperationalState::Enabled,
        }
    }

    /// Sets the operational state.
    #[must_use]
    pub const fn with_state(mut self, state: OperationalState) -> Self {
        self.operational_state = state;
        self
    }
}

/// A layer-specific instance of an edge point inside one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEndPoint {
    /// CEP identifier.
    pub id: CepId,
    /// Node hosting the CEP.
    pub node: NodeId,
    /// The edge point this CEP instantiates.
    pub edge_point: EdgePointId,
    /// Layer of the CEP.
    pub layer: LayerProtocolName,
    /// A or Z end.
    pub role: EndpointRole,
    /// Lifecycle state.
    pub lifecycle_state: LifecycleState,
    /// Operational state as last derived.
    pub operational_state: OperationalState,
}

impl ConnectionEndPoint {
    /// Builds a CEP with a content-derived identifier.
    ///
    /// The identifier depends only on node, edge point, layer and role, so the
    /// same inputs always produce the same CEP.
    #[must_use]
    pub fn derive(
        node: NodeId,
        edge_point: EdgePointId,
        layer: LayerProtocolName,
        role: EndpointRole,
    ) -> Self {
        let id = CepId::derive(&[
            node.as_str(),
            edge_point.as_str(),
            layer.as_label(),
            role.as_label(),
        ]);
        Self {
            id,
            node,
            edge_point,
            layer,
            role,
            lifecycle_state: LifecycleState::Pending,
            operational_state: OperationalState::Enabled,
        }
    }
}

/// Whether a connection derives its state from lower connections or from CEPs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// Has lower connections.
    Top,
    /// Leaf joining two CEPs.
    Cross,
}

impl ConnectionKind {
    /// Returns the label used in identifier hashing.
    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Cross => "xc",
        }
    }
}

/// A connection at one layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Human-readable name.
    pub name: String,
    /// Layer of the connection.
    pub layer: LayerProtocolName,
    /// Direction.
    pub direction: Direction,
    /// Operational state as last derived.
    pub operational_state: OperationalState,
    /// Lifecycle state.
    pub lifecycle_state: LifecycleState,
    /// End points (normally exactly two).
    pub end_points: Vec<ConnectionEndPoint>,
    /// Lower connections realizing this one, by id.
    pub lower_connections: Vec<ConnectionId>,
}

impl Connection {
    /// Creates an enabled, pending connection with no end points.
    #[must_use]
    pub fn new(id: ConnectionId, name: impl Into<String>, layer: LayerProtocolName) -> Self {
        Self {
            id,
            name: name.into(),
            layer,
            direction: Direction::Bidirectional,
            operational_state: OperationalState::Enabled,
            lifecycle_state: LifecycleState::Pending,
            end_points: Vec::new(),
            lower_connections: Vec::new(),
        }
    }

    /// Adds an end point.
    #[must_use]
    pub fn with_end_point(mut self, cep: ConnectionEndPoint) -> Self {
        self.end_points.push(cep);
        self
    }

    /// Appends a lower connection reference.
    #[must_use]
    pub fn with_lower(mut self, lower: ConnectionId) -> Self {
        self.lower_connections.push(lower);
        self
    }

    /// Sets the operational state.
    #[must_use]
    pub const fn with_state(mut self, state: OperationalState) -> Self {
        self.operational_state = state;
        self
    }

    /// Returns whether this is a top connection or a cross-connection.
    #[must_use]
    pub fn kind(&self) -> ConnectionKind {
        if self.lower_connections.is_empty() {
            ConnectionKind::Cross
        } else {
            ConnectionKind::Top
        }
    }

    /// Returns the edge points referenced by this connection's CEPs.
    pub fn edge_points(&self) -> impl Iterator<Item = &EdgePointId> {
        self.end_points.iter().map(|cep| &cep.edge_point)
    }

    /// Returns a copy with the operational state of the connection and its
    /// CEPs set to `state`.
    #[must_use]
    pub fn transitioned(&self, state: OperationalState) -> Self {
        let mut next = self.clone();
        next.operational_state = state;
        for cep in &mut next.end_points {
            cep.operational_state = state;
        }
        next
    }
}

/// The externally visible state pair of a connectivity service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceState {
    /// Administrative state.
    pub administrative: AdministrativeState,
    /// Operational state.
    pub operational: OperationalState,
}

impl ServiceState {
    /// `UNLOCKED` / `ENABLED`.
    pub const IN_SERVICE: Self = Self {
        administrative: AdministrativeState::Unlocked,
        operational: OperationalState::Enabled,
    };

    /// `LOCKED` / `DISABLED`.
    pub const OUT_OF_SERVICE: Self = Self {
        administrative: AdministrativeState::Locked,
        operational: OperationalState::Disabled,
    };

    /// Maps a derived operational state onto the service state pair.
    #[must_use]
    pub const fn from_operational(state: OperationalState) -> Self {
        match state {
            OperationalState::Enabled => Self::IN_SERVICE,
            OperationalState::Disabled => Self::OUT_OF_SERVICE,
        }
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.administrative, self.operational)
    }
}

/// A customer-facing connectivity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityService {
    /// Service identifier.
    pub id: ServiceId,
    /// Human-readable names (service name, customer alias, ...).
    pub names: Vec<String>,
    /// Layer of the service.
    pub layer: LayerProtocolName,
    /// Administrative state.
    pub administrative_state: AdministrativeState,
    /// Operational state.
    pub operational_state: OperationalState,
    /// Lifecycle state.
    pub lifecycle_state: LifecycleState,
    /// Top-level connections, ordered.
    pub connections: Vec<ConnectionId>,
    /// Services at adjacent layers this service is built on.
    pub supporting_services: Vec<ServiceId>,
}

impl ConnectivityService {
    /// Creates an installed, in-service service with no connections.
    #[must_use]
    pub fn new(id: ServiceId, name: impl Into<String>, layer: LayerProtocolName) -> Self {
        Self {
            id,
            names: vec![name.into()],
            layer,
            administrative_state: AdministrativeState::Unlocked,
            operational_state: OperationalState::Enabled,
            lifecycle_state: LifecycleState::Installed,
            connections: Vec::new(),
            supporting_services: Vec::new(),
        }
    }

    /// Appends a top connection.
    #[must_use]
    pub fn with_connection(mut self, connection: ConnectionId) -> Self {
        self.connections.push(connection);
        self
    }

    /// Declares a supporting service.
    #[must_use]
    pub fn supported_by(mut self, service: ServiceId) -> Self {
        self.supporting_services.push(service);
        self
    }

    /// Sets the externally visible state.
    #[must_use]
    pub const fn with_state(mut self, state: ServiceState) -> Self {
        self.administrative_state = state.administrative;
        self.operational_state = state.operational;
        self
    }

    /// Returns the externally visible state pair.
    #[must_use]
    pub const fn state(&self) -> ServiceState {
        ServiceState {
            administrative: self.administrative_state,
            operational: self.operational_state,
        }
    }

    /// Returns true if the service is past provisioning.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.lifecycle_state == LifecycleState::Installed
    }

    /// Returns the primary human-readable name, falling back to the id.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.names
            .first()
            .map_or_else(|| self.id.as_str(), String::as_str)
    }
}

//! Pluggable storage for the topology/service graph.
//!
//! The [`GraphStore`] trait is the persistence boundary of the engine. It is a
//! typed key-value interface over edge points, connections and services with
//! whole-entity upserts (last write wins) and all-or-nothing batch commits.
//!
//! ## Design Principles
//!
//! - **Per-entity transactions**: Callers commit one entity's read→compute→write
//!   round trip at a time instead of holding a lock across a whole propagation
//! - **Read-your-writes**: A read after a successful commit observes the commit
//! - **Testability**: In-memory implementation for tests and embedding

pub mod memory;

use async_trait::async_trait;

use lumen_core::{ConnectionId, EdgePointId, ServiceId};

use crate::error::Result;
use crate::model::{Connection, ConnectivityService, EdgePoint};

/// A single write inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Upsert an edge point.
    MergeEdgePoint(EdgePoint),
    /// Upsert a connection (CEPs included).
    MergeConnection(Connection),
    /// Upsert a connectivity service.
    MergeService(ConnectivityService),
    /// Remove a connection.
    DeleteConnection(ConnectionId),
    /// Remove a connectivity service.
    DeleteService(ServiceId),
}

impl Mutation {
    /// Returns the key of the entity this mutation touches, for logging.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::MergeEdgePoint(ep) => format!("edge-point/{}", ep.id),
            Self::MergeConnection(c) => format!("connection/{}", c.id),
            Self::DeleteConnection(id) => format!("connection/{id}"),
            Self::MergeService(s) => format!("service/{}", s.id),
            Self::DeleteService(id) => format!("service/{id}"),
        }
    }
}

/// An ordered set of mutations committed atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    mutations: Vec<Mutation>,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an edge point upsert.
    pub fn merge_edge_point(&mut self, edge_point: EdgePoint) -> &mut Self {
        self.mutations.push(Mutation::MergeEdgePoint(edge_point));
        self
    }

    /// Adds a connection upsert.
    pub fn merge_connection(&mut self, connection: Connection) -> &mut Self {
        self.mutations.push(Mutation::MergeConnection(connection));
        self
    }

    /// Adds a service upsert.
    pub fn merge_service(&mut self, service: ConnectivityService) -> &mut Self {
        self.mutations.push(Mutation::MergeService(service));
        self
    }

    /// Adds a connection removal.
    pub fn delete_connection(&mut self, id: ConnectionId) -> &mut Self {
        self.mutations.push(Mutation::DeleteConnection(id));
        self
    }

    /// Adds a service removal.
    pub fn delete_service(&mut self, id: ServiceId) -> &mut Self {
        self.mutations.push(Mutation::DeleteService(id));
        self
    }

    /// Returns true if the batch has no mutations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Returns the number of mutations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// Returns the mutations in insertion order.
    #[must_use]
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    /// Consumes the batch, returning its mutations.
    #[must_use]
    pub fn into_mutations(self) -> Vec<Mutation> {
        self.mutations
    }
}

/// All connections and services, read under one consistent view.
#[derive(Debug, Clone, Default)]
pub struct ConnectivityContext {
    /// Every persisted connectivity service.
    pub services: Vec<ConnectivityService>,
    /// Every persisted connection.
    pub connections: Vec<Connection>,
}

/// Storage abstraction for the topology/service graph.
///
/// Implementations must provide:
/// - Whole-entity upsert semantics for merges
/// - All-or-nothing application of each [`WriteBatch`]
/// - A consistent view for [`GraphStore::context`]
///
/// ## Thread Safety
///
/// All methods are `Send + Sync` to support concurrent propagation passes
/// on unrelated parts of the topology.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Reads an edge point. Returns `None` if absent.
    async fn edge_point(&self, id: &EdgePointId) -> Result<Option<EdgePoint>>;

    /// Reads a connection. Returns `None` if absent.
    async fn connection(&self, id: &ConnectionId) -> Result<Option<Connection>>;

    /// Reads a connectivity service. Returns `None` if absent.
    async fn service(&self, id: &ServiceId) -> Result<Option<ConnectivityService>>;

    /// Reads every connection and service under one consistent view.
    async fn context(&self) -> Result<ConnectivityContext>;

    /// Applies a batch atomically.
    ///
    /// Either every mutation is applied or none is. Deleting an absent
    /// entity is not an error.
    async fn commit(&self, batch: WriteBatch) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LayerProtocolName;

    #[test]
    fn write_batch_preserves_order() {
        let mut batch = WriteBatch::new();
        batch
            .merge_connection(Connection::new(
                ConnectionId::new("C1"),
                "c1",
                LayerProtocolName::Odu,
            ))
            .delete_service(ServiceId::new("S1"));
        assert_eq!(batch.len(), 2);
        let keys: Vec<String> = batch.mutations().iter().map(Mutation::key).collect();
        assert_eq!(keys, vec!["connection/C1", "service/S1"]);
    }

    #[test]
    fn empty_batch() {
        assert!(WriteBatch::new().is_empty());
    }
}

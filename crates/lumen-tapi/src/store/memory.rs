//! In-memory graph store implementation.
//!
//! This module provides [`InMemoryGraphStore`], a simple in-memory
//! implementation of the [`GraphStore`] trait suitable for testing and for
//! embedding the engine in a single process.
//!
//! ## Limitations
//!
//! - **No durability**: All state is lost when the process exits
//! - **Single-process only**: State is not shared across process boundaries

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use lumen_core::{ConnectionId, EdgePointId, ServiceId};

use super::{ConnectivityContext, GraphStore, Mutation, WriteBatch};
use crate::error::{Error, Result};
use crate::model::{Connection, ConnectivityService, EdgePoint};

#[derive(Debug, Default)]
struct Graph {
    edge_points: HashMap<EdgePointId, EdgePoint>,
    connections: HashMap<ConnectionId, Connection>,
    services: HashMap<ServiceId, ConnectivityService>,
}

impl Graph {
    fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::MergeEdgePoint(ep) => {
                self.edge_points.insert(ep.id.clone(), ep);
            }
            Mutation::MergeConnection(conn) => {
                self.connections.insert(conn.id.clone(), conn);
            }
            Mutation::MergeService(svc) => {
                self.services.insert(svc.id.clone(), svc);
            }
            Mutation::DeleteConnection(id) => {
                self.connections.remove(&id);
            }
            Mutation::DeleteService(id) => {
                self.services.remove(&id);
            }
        }
    }
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

/// In-memory graph store.
///
/// Provides a simple, thread-safe implementation of the [`GraphStore`] trait
/// using `RwLock` for synchronization. Each commit holds the write lock for
/// the whole batch, which makes batches atomic with respect to readers.
///
/// ## Example
///
/// ```rust
/// use lumen_tapi::store::memory::InMemoryGraphStore;
///
/// let store = InMemoryGraphStore::new();
/// assert_eq!(store.connection_count().unwrap(), 0);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    graph: RwLock<Graph>,
}

impl InMemoryGraphStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a batch synchronously (fixture seeding).
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn apply(&self, batch: WriteBatch) -> Result<()> {
        let mut graph = self.graph.write().map_err(poison_err)?;
        for mutation in batch.into_mutations() {
            graph.apply(mutation);
        }
        drop(graph);
        Ok(())
    }

    /// Returns the number of connections currently stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn connection_count(&self) -> Result<usize> {
        let count = {
            let graph = self.graph.read().map_err(poison_err)?;
            graph.connections.len()
        };
        Ok(count)
    }

    /// Returns the number of services currently stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn service_count(&self) -> Result<usize> {
        let count = {
            let graph = self.graph.read().map_err(poison_err)?;
            graph.services.len()
        };
        Ok(count)
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn edge_point(&self, id: &EdgePointId) -> Result<Option<EdgePoint>> {
        let result = {
            let graph = self.graph.read().map_err(poison_err)?;
            graph.edge_points.get(id).cloned()
        };
        Ok(result)
    }

    async fn connection(&self, id: &ConnectionId) -> Result<Option<Connection>> {
        let result = {
            let graph = self.graph.read().map_err(poison_err)?;
            graph.connections.get(id).cloned()
        };
        Ok(result)
    }

    async fn service(&self, id: &ServiceId) -> Result<Option<ConnectivityService>> {
        let result = {
            let graph = self.graph.read().map_err(poison_err)?;
            graph.services.get(id).cloned()
        };
        Ok(result)
    }

    async fn context(&self) -> Result<ConnectivityContext> {
        let graph = self.graph.read().map_err(poison_err)?;
        let mut services: Vec<ConnectivityService> = graph.services.values().cloned().collect();
        let mut connections: Vec<Connection> = graph.connections.values().cloned().collect();
        drop(graph);

        // HashMap iteration order is arbitrary; callers get a stable order.
        services.sort_by(|a, b| a.id.cmp(&b.id));
        connections.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(ConnectivityContext {
            services,
            connections,
        })
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.apply(batch)
    }
}

//! Graph store with operation recording and failure injection.
//!
//! Wraps the in-memory store and records every read, context load and
//! commit so tests can assert on call order (for example that a supporting
//! service was committed before a dependent service read it).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use lumen_core::{ConnectionId, EdgePointId, ServiceId};
use lumen_tapi::error::{Error, Result};
use lumen_tapi::model::{Connection, ConnectivityService, EdgePoint};
use lumen_tapi::store::memory::InMemoryGraphStore;
use lumen_tapi::store::{ConnectivityContext, GraphStore, Mutation, WriteBatch};

/// Record of a graph store operation for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphOp {
    /// Edge point read.
    ReadEdgePoint {
        /// Edge point id.
        id: String,
    },
    /// Connection read.
    ReadConnection {
        /// Connection id.
        id: String,
    },
    /// Service read.
    ReadService {
        /// Service id.
        id: String,
    },
    /// Full context read.
    Context,
    /// Batch commit.
    Commit {
        /// Entity keys touched, in batch order (`service/<id>`, ...).
        keys: Vec<String>,
    },
}

impl GraphOp {
    /// Returns true if this is a commit touching `key`.
    #[must_use]
    pub fn commits(&self, key: &str) -> bool {
        matches!(self, Self::Commit { keys } if keys.iter().any(|k| k == key))
    }

    /// Returns true if this is a read of service `id`.
    #[must_use]
    pub fn reads_service(&self, id: &str) -> bool {
        matches!(self, Self::ReadService { id: read } if read == id)
    }
}

/// In-memory graph store with operation tracing.
#[derive(Debug, Clone, Default)]
pub struct RecordingGraphStore {
    inner: Arc<InMemoryGraphStore>,
    operations: Arc<Mutex<Vec<GraphOp>>>,
    fail_keys: Arc<Mutex<Vec<String>>>,
    latency: Option<Duration>,
}

impl RecordingGraphStore {
    /// Creates an empty recording store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that sleeps before every operation.
    #[must_use]
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Applies a batch without recording it (fixture seeding).
    pub fn seed(&self, batch: WriteBatch) {
        self.inner.apply(batch).expect("seed batch");
    }

    /// Returns all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<GraphOp> {
        self.operations.lock().expect("lock").clone()
    }

    /// Returns only the commit operations.
    #[must_use]
    pub fn commits(&self) -> Vec<Vec<String>> {
        self.operations()
            .into_iter()
            .filter_map(|op| match op {
                GraphOp::Commit { keys } => Some(keys),
                _ => None,
            })
            .collect()
    }

    /// Clears recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().expect("lock").clear();
    }

    /// Makes every operation touching a key with this prefix fail
    /// (`service/SVC-1`, `connection/`, `context`, ...).
    pub fn inject_failure(&self, key_prefix: impl Into<String>) {
        self.fail_keys.lock().expect("lock").push(key_prefix.into());
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        self.fail_keys.lock().expect("lock").clear();
    }

    fn record(&self, op: GraphOp) {
        self.operations.lock().expect("lock").push(op);
    }

    fn check_failure(&self, key: &str) -> Result<()> {
        let fail_keys = self.fail_keys.lock().expect("lock");
        if fail_keys.iter().any(|prefix| key.starts_with(prefix.as_str())) {
            return Err(Error::storage(format!("injected failure for {key}")));
        }
        Ok(())
    }

    async fn maybe_delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl GraphStore for RecordingGraphStore {
    async fn edge_point(&self, id: &EdgePointId) -> Result<Option<EdgePoint>> {
        self.maybe_delay().await;
        self.check_failure(&format!("edge-point/{id}"))?;
        self.record(GraphOp::ReadEdgePoint { id: id.to_string() });
        self.inner.edge_point(id).await
    }

    async fn connection(&self, id: &ConnectionId) -> Result<Option<Connection>> {
        self.maybe_delay().await;
        self.check_failure(&format!("connection/{id}"))?;
        self.record(GraphOp::ReadConnection { id: id.to_string() });
        self.inner.connection(id).await
    }

    async fn service(&self, id: &ServiceId) -> Result<Option<ConnectivityService>> {
        self.maybe_delay().await;
        self.check_failure(&format!("service/{id}"))?;
        self.record(GraphOp::ReadService { id: id.to_string() });
        self.inner.service(id).await
    }

    async fn context(&self) -> Result<ConnectivityContext> {
        self.maybe_delay().await;
        self.check_failure("context")?;
        self.record(GraphOp::Context);
        self.inner.context().await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.maybe_delay().await;
        let keys: Vec<String> = batch.mutations().iter().map(Mutation::key).collect();
        for key in &keys {
            self.check_failure(key)?;
        }
        self.record(GraphOp::Commit { keys });
        self.inner.commit(batch).await
    }
}

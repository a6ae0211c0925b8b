//! Provisioning result driver.
//!
//! `ServiceImplementationRequest` success marks the service, its connections
//! and their CEPs installed, then derives the service state through the
//! resolver (a service is never put in service while one of its top
//! connections is down). Failure, like a successful `ServiceDelete`, tears
//! the service down.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use lumen_core::{ConnectionId, EdgePointId, NodeId, ServiceId, StreamId};

use super::{
    DriverContext, Dispatch, InterfaceProvisioner, LifecycleDriver, ProvisionRequest,
    connection_closure, teardown_service,
};
use crate::error::{Error, Result};
use crate::events::{EventKind, EventStatus, LifecycleEvent};
use crate::model::{Connection, LifecycleState};
use crate::propagator::ServiceChange;
use crate::store::{GraphStore, WriteBatch};

/// Handles device provisioning results.
pub struct ProvisioningDriver<S: GraphStore + ?Sized> {
    ctx: DriverContext<S>,
    provisioner: Arc<dyn InterfaceProvisioner>,
    stream: StreamId,
}

impl<S: GraphStore + ?Sized> ProvisioningDriver<S> {
    /// Creates a driver consuming events from `stream`.
    #[must_use]
    pub fn new(
        ctx: DriverContext<S>,
        provisioner: Arc<dyn InterfaceProvisioner>,
        stream: StreamId,
    ) -> Self {
        Self {
            ctx,
            provisioner,
            stream,
        }
    }

    /// Returns the stream this driver consumes.
    #[must_use]
    pub fn stream(&self) -> &StreamId {
        &self.stream
    }

    /// Configures every node the service touches and returns the resulting
    /// event.
    ///
    /// Nodes are provisioned in id order; the first failure stops the run and
    /// is reported as a `Failed` event.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not exist or the store cannot be
    /// read.
    #[tracing::instrument(skip(self))]
    pub async fn provision(&self, service_id: &ServiceId) -> Result<LifecycleEvent> {
        let context = self.ctx.store().context().await?;
        let service = context
            .services
            .iter()
            .find(|s| &s.id == service_id)
            .ok_or_else(|| Error::ServiceNotFound {
                service_id: service_id.clone(),
            })?;
        let by_id: HashMap<&ConnectionId, &Connection> =
            context.connections.iter().map(|c| (&c.id, c)).collect();

        let mut per_node: BTreeMap<NodeId, BTreeSet<EdgePointId>> = BTreeMap::new();
        for id in connection_closure(&service.connections, &by_id) {
            let Some(connection) = by_id.get(&id) else {
                continue;
            };
            for cep in &connection.end_points {
                per_node
                    .entry(cep.node.clone())
                    .or_default()
                    .insert(cep.edge_point.clone());
            }
        }

        let mut interfaces = 0;
        for (node, edge_points) in per_node {
            let request = ProvisionRequest {
                service_id: service_id.clone(),
                service_name: service.display_name().to_string(),
                edge_points: edge_points.into_iter().collect(),
            };
            match self.provisioner.provision_interfaces(&node, &request).await {
                Ok(names) => {
                    tracing::debug!(node = %node, interfaces = ?names, "node provisioned");
                    interfaces += names.len();
                }
                Err(err) => {
                    tracing::warn!(node = %node, error = %err, "interface provisioning failed");
                    return Ok(LifecycleEvent::failed(
                        self.stream.clone(),
                        EventKind::ServiceImplementationRequest,
                        service_id.clone(),
                        format!("{node}: {err}"),
                    ));
                }
            }
        }

        tracing::info!(interfaces, "service provisioned");
        Ok(LifecycleEvent::successful(
            self.stream.clone(),
            EventKind::ServiceImplementationRequest,
            service_id.clone(),
            "Service implemented",
        ))
    }

    /// Marks the service and everything beneath it installed.
    async fn install(&self, service_id: &ServiceId) -> Result<()> {
        let _guard = self.ctx.locks().acquire(service_id).await?;
        let context = self.ctx.store().context().await?;
        let Some(mut service) = context.services.iter().find(|s| &s.id == service_id).cloned()
        else {
            return Err(Error::ServiceNotFound {
                service_id: service_id.clone(),
            });
        };
        let by_id: HashMap<&ConnectionId, &Connection> =
            context.connections.iter().map(|c| (&c.id, c)).collect();

        let mut batch = WriteBatch::new();
        for id in connection_closure(&service.connections, &by_id) {
            let Some(connection) = by_id.get(&id) else {
                tracing::warn!(connection_id = %id, "connection not found; not installed");
                continue;
            };
            if connection.lifecycle_state == LifecycleState::Installed {
                continue;
            }
            let mut installed = (*connection).clone();
            installed.lifecycle_state = LifecycleState::Installed;
            for cep in &mut installed.end_points {
                cep.lifecycle_state = LifecycleState::Installed;
            }
            batch.merge_connection(installed);
        }
        service.lifecycle_state = LifecycleState::Installed;
        batch.merge_service(service);
        self.ctx.store().commit(batch).await
    }

    async fn remove(&self, service_id: &ServiceId) -> Result<Vec<ServiceChange>> {
        let Some(teardown) =
            teardown_service(&**self.ctx.store(), self.ctx.locks(), service_id).await?
        else {
            return Ok(Vec::new());
        };
        self.ctx.propagator.reevaluate(&teardown.dependents).await
    }

    async fn apply(&self, event: LifecycleEvent) -> Result<Vec<ServiceChange>> {
        match (event.kind, event.status) {
            (EventKind::ServiceImplementationRequest, EventStatus::Pending) => {
                tracing::info!(message = %event.status_message, "provisioning in progress");
                Ok(Vec::new())
            }
            (EventKind::ServiceImplementationRequest, EventStatus::Successful) => {
                self.install(&event.service_id).await?;
                self.ctx
                    .propagator
                    .reevaluate(std::slice::from_ref(&event.service_id))
                    .await
            }
            (EventKind::ServiceImplementationRequest, EventStatus::Failed)
            | (EventKind::ServiceDelete, EventStatus::Successful) => {
                tracing::info!(kind = %event.kind, status = %event.status, message = %event.status_message, "tearing down service");
                self.remove(&event.service_id).await
            }
            (EventKind::ServiceDelete, status) => {
                tracing::warn!(%status, message = %event.status_message, "service removal not confirmed");
                Ok(Vec::new())
            }
            (kind, _) => {
                tracing::warn!(%kind, "event kind not handled by provisioning driver");
                Ok(Vec::new())
            }
        }
    }
}

#[async_trait]
impl<S: GraphStore + ?Sized + 'static> LifecycleDriver for ProvisioningDriver<S> {
    async fn handle(&self, event: LifecycleEvent) -> Result<Dispatch> {
        self.ctx.run(event, |event| self.apply(event)).await
    }
}

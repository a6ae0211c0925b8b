//! Outbound change notifications.
//!
//! Once a service's externally visible state has actually changed, the
//! [`Notifier`] builds a [`Notification`] carrying the old and new state pair
//! and hands it to a [`NotificationSink`]. Publishing is at-most-once and
//! never blocks on the consumer: failures are logged, counted and dropped.

use std::sync::{PoisonError, RwLock};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use ulid::Ulid;

use lumen_core::ServiceId;

use crate::error::{Error, Result};
use crate::metrics::EngineMetrics;
use crate::model::{ConnectivityService, LayerProtocolName, ServiceState};
use crate::propagator::ServiceChange;

/// A service state change record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Notification identifier (ULID).
    pub id: String,
    /// The service that changed.
    pub service_id: ServiceId,
    /// Service names at the time of the change.
    pub names: Vec<String>,
    /// Service layer.
    pub layer: LayerProtocolName,
    /// State before the change.
    pub previous: ServiceState,
    /// State after the change.
    pub current: ServiceState,
    /// When the change was observed.
    pub changed_at: DateTime<Utc>,
}

impl Notification {
    /// Builds a notification for `service` moving away from `previous`.
    #[must_use]
    pub fn for_service(service: &ConnectivityService, previous: ServiceState) -> Self {
        Self {
            id: Ulid::new().to_string(),
            service_id: service.id.clone(),
            names: service.names.clone(),
            layer: service.layer,
            previous,
            current: service.state(),
            changed_at: Utc::now(),
        }
    }
}

/// Destination for outbound notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Publishes one notification. Must not wait on the consumer.
    async fn publish(&self, notification: Notification) -> Result<()>;
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("notification sink lock poisoned")
}

/// Sink collecting notifications in memory.
#[derive(Debug, Default)]
pub struct InMemoryNotificationSink {
    published: RwLock<Vec<Notification>>,
}

impl InMemoryNotificationSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all published notifications in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn published(&self) -> Result<Vec<Notification>> {
        Ok(self.published.read().map_err(poison_err)?.clone())
    }

    /// Drains the sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn drain(&self) -> Result<Vec<Notification>> {
        let mut published = self.published.write().map_err(poison_err)?;
        Ok(std::mem::take(&mut *published))
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn publish(&self, notification: Notification) -> Result<()> {
        self.published
            .write()
            .map_err(poison_err)?
            .push(notification);
        Ok(())
    }
}

/// Sink forwarding notifications to a bounded channel.
///
/// A full or closed channel fails the publish immediately.
#[derive(Debug, Clone)]
pub struct ChannelNotificationSink {
    tx: mpsc::Sender<Notification>,
}

impl ChannelNotificationSink {
    /// Creates a sink and the receiving half of its channel.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationSink for ChannelNotificationSink {
    async fn publish(&self, notification: Notification) -> Result<()> {
        self.tx.try_send(notification).map_err(|e| match e {
            TrySendError::Full(n) => Error::Publish {
                message: format!("notification channel full; dropped {}", n.id),
            },
            TrySendError::Closed(n) => Error::Publish {
                message: format!("notification channel closed; dropped {}", n.id),
            },
        })
    }
}

/// Builds and publishes change notifications.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    metrics: EngineMetrics,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").finish_non_exhaustive()
    }
}

impl Notifier {
    /// Creates a notifier publishing to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            sink,
            metrics: EngineMetrics::new(),
        }
    }

    /// Publishes a change record for `service` if its state differs from
    /// `previous`.
    ///
    /// # Errors
    ///
    /// Returns the sink's error if publishing fails.
    #[tracing::instrument(skip(self, service), fields(service_id = %service.id))]
    pub async fn notify(&self, service: &ConnectivityService, previous: ServiceState) -> Result<()> {
        if service.state() == previous {
            tracing::debug!("state unchanged; no notification");
            return Ok(());
        }
        let notification = Notification::for_service(service, previous);
        let id = notification.id.clone();
        match self.sink.publish(notification).await {
            Ok(()) => {
                self.metrics.record_notification("published");
                tracing::info!(notification_id = %id, from = %previous, to = %service.state(), "notification published");
                Ok(())
            }
            Err(err) => {
                self.metrics.record_notification("failed");
                Err(err)
            }
        }
    }

    /// Publishes one notification per change, logging and swallowing
    /// failures. Returns the number published.
    pub async fn notify_all(&self, changes: &[ServiceChange]) -> usize {
        let mut published = 0;
        for change in changes {
            match self.notify(&change.service, change.previous).await {
                Ok(()) => published += 1,
                Err(err) => tracing::warn!(
                    service_id = %change.service.id,
                    error = %err,
                    "notification dropped"
                ),
            }
        }
        published
    }
}

//! Per-stream event loops.
//!
//! Each inbound stream gets one bounded queue and one worker task that hands
//! events to its driver strictly in arrival order. Streams run concurrently
//! with each other. A driver error is logged and counted; the worker moves on
//! to the next event and the failed event stays unrecorded, so its next
//! redelivery is processed again.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendError;
use tokio::task::JoinHandle;

use lumen_core::StreamId;

use crate::drivers::{Dispatch, LifecycleDriver};
use crate::error::{Error, Result};
use crate::events::LifecycleEvent;
use crate::metrics::EngineMetrics;

/// Sending half and worker of one stream.
#[derive(Debug)]
struct StreamWorker {
    tx: mpsc::Sender<LifecycleEvent>,
    task: JoinHandle<()>,
}

/// Owns one worker per registered stream.
#[derive(Debug)]
pub struct StreamRuntime {
    buffer: usize,
    workers: HashMap<StreamId, StreamWorker>,
}

impl StreamRuntime {
    /// Creates a runtime whose stream queues hold `buffer` events.
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            workers: HashMap::new(),
        }
    }

    /// Starts a worker feeding `stream` to `driver`.
    ///
    /// Must be called within a tokio runtime. Registering a stream twice
    /// replaces the earlier worker once its queue drains.
    pub fn register(&mut self, stream: StreamId, driver: Arc<dyn LifecycleDriver>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let task = tokio::spawn(run_stream(stream.clone(), driver, rx));
        if self.workers.insert(stream.clone(), StreamWorker { tx, task }).is_some() {
            tracing::warn!(stream = %stream, "stream worker replaced");
        }
    }

    /// Returns the registered streams.
    pub fn streams(&self) -> impl Iterator<Item = &StreamId> {
        self.workers.keys()
    }

    /// Queues an event on its stream, waiting for space if the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownStream`] if no worker is registered for the
    /// event's stream, or [`Error::StreamClosed`] if the worker has stopped.
    pub async fn submit(&self, event: LifecycleEvent) -> Result<()> {
        let worker = self
            .workers
            .get(&event.stream)
            .ok_or_else(|| Error::UnknownStream {
                stream: event.stream.clone(),
            })?;
        worker
            .tx
            .send(event)
            .await
            .map_err(|SendError(event)| Error::StreamClosed {
                stream: event.stream,
            })
    }

    /// Closes every queue and waits for the workers to drain them.
    pub async fn shutdown(self) {
        for (stream, worker) in self.workers {
            drop(worker.tx);
            if let Err(err) = worker.task.await {
                tracing::error!(stream = %stream, error = %err, "stream worker panicked");
            }
        }
    }
}

async fn run_stream(
    stream: StreamId,
    driver: Arc<dyn LifecycleDriver>,
    mut rx: mpsc::Receiver<LifecycleEvent>,
) {
    let metrics = EngineMetrics::new();
    tracing::debug!(stream = %stream, "stream worker started");
    while let Some(event) = rx.recv().await {
        let service_id = event.service_id.clone();
        match driver.handle(event).await {
            Ok(Dispatch::Handled(changes)) => {
                tracing::debug!(stream = %stream, service_id = %service_id, changed = changes.len(), "event handled");
            }
            Ok(Dispatch::Duplicate) => {}
            Err(err) => {
                metrics.record_entity_failure(err.kind_label());
                tracing::warn!(stream = %stream, service_id = %service_id, error = %err, "event dispatch failed");
            }
        }
    }
    tracing::debug!(stream = %stream, "stream worker stopped");
}

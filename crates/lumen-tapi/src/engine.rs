//! Engine assembly.
//!
//! [`Engine::start`] wires the store, propagator, notifier, drivers and stream
//! workers together from an [`EngineConfig`]. Path computation results are
//! consumed from the [`PCE_STREAM`] stream and provisioning results from the
//! [`RENDERER_STREAM`] stream; notifications are delivered on a bounded
//! channel.

use std::sync::Arc;

use tokio::sync::mpsc;

use lumen_core::StreamId;

use crate::config::EngineConfig;
use crate::dedup::Deduplicator;
use crate::drivers::path::PathComputationDriver;
use crate::drivers::provisioning::ProvisioningDriver;
use crate::drivers::{DriverContext, InterfaceProvisioner, PathComputer};
use crate::error::Result;
use crate::events::LifecycleEvent;
use crate::notifier::{ChannelNotificationSink, Notification, Notifier};
use crate::propagator::LayerPropagator;
use crate::runtime::StreamRuntime;
use crate::store::GraphStore;
use crate::topology::TopologyListener;

/// Stream carrying path computation results.
pub const PCE_STREAM: &str = "pce";

/// Stream carrying provisioning results.
pub const RENDERER_STREAM: &str = "renderer";

/// A running engine.
pub struct Engine<S: GraphStore + ?Sized + 'static> {
    topology: TopologyListener<S>,
    path_driver: Arc<PathComputationDriver<S>>,
    provisioning_driver: Arc<ProvisioningDriver<S>>,
    runtime: StreamRuntime,
}

impl<S: GraphStore + ?Sized + 'static> Engine<S> {
    /// Builds and starts the engine. Must be called within a tokio runtime.
    ///
    /// Returns the engine and the receiving end of the notification channel.
    #[must_use]
    pub fn start(
        config: &EngineConfig,
        store: Arc<S>,
        computer: Arc<dyn PathComputer>,
        provisioner: Arc<dyn InterfaceProvisioner>,
    ) -> (Self, mpsc::Receiver<Notification>) {
        lumen_core::init_logging(config.log_format);

        let (sink, notifications) = ChannelNotificationSink::channel(config.notification_buffer);
        let notifier = Notifier::new(Arc::new(sink));
        let propagator = LayerPropagator::new(store).with_max_depth(config.max_lower_depth);
        let ctx = DriverContext::new(
            propagator.clone(),
            Arc::new(Deduplicator::new()),
            notifier.clone(),
        );

        let pce = StreamId::new(PCE_STREAM);
        let renderer = StreamId::new(RENDERER_STREAM);
        let path_driver = Arc::new(PathComputationDriver::new(ctx.clone(), computer, pce.clone()));
        let provisioning_driver =
            Arc::new(ProvisioningDriver::new(ctx, provisioner, renderer.clone()));

        let mut runtime = StreamRuntime::new(config.stream_buffer);
        runtime.register(pce, path_driver.clone());
        runtime.register(renderer, provisioning_driver.clone());
        tracing::info!(
            max_lower_depth = config.max_lower_depth,
            stream_buffer = config.stream_buffer,
            notification_buffer = config.notification_buffer,
            "engine started"
        );

        let engine = Self {
            topology: TopologyListener::new(propagator, notifier),
            path_driver,
            provisioning_driver,
            runtime,
        };
        (engine, notifications)
    }

    /// Returns the topology change intake.
    #[must_use]
    pub fn topology(&self) -> &TopologyListener<S> {
        &self.topology
    }

    /// Returns the path computation driver.
    #[must_use]
    pub fn path_driver(&self) -> &PathComputationDriver<S> {
        &self.path_driver
    }

    /// Returns the provisioning driver.
    #[must_use]
    pub fn provisioning_driver(&self) -> &ProvisioningDriver<S> {
        &self.provisioning_driver
    }

    /// Queues an inbound lifecycle event on its stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is unknown or its worker stopped.
    pub async fn submit(&self, event: LifecycleEvent) -> Result<()> {
        self.runtime.submit(event).await
    }

    /// Stops accepting events and waits for queued ones to be handled.
    pub async fn shutdown(self) {
        self.runtime.shutdown().await;
    }
}

//! Engine assembly tests: stream workers, topology intake and the
//! notification channel together.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::Receiver;

use lumen_core::{EdgePointId, ServiceId, StreamId};
use lumen_tapi::config::EngineConfig;
use lumen_tapi::drivers::LifecycleDriver;
use lumen_tapi::engine::{Engine, PCE_STREAM, RENDERER_STREAM};
use lumen_tapi::error::{Error, Result};
use lumen_tapi::events::{EventKind, LifecycleEvent};
use lumen_tapi::model::{OperationalState, ServiceState};
use lumen_tapi::notifier::Notification;
use lumen_test_utils::{
    RecordingGraphStore, RecordingProvisioner, StaticPathComputer, dsr_request, e2e,
    end_to_end_topology, two_layer_path, two_layer_path_topology,
};

fn start(store: RecordingGraphStore) -> (Engine<RecordingGraphStore>, Receiver<Notification>) {
    Engine::start(
        &EngineConfig::default(),
        Arc::new(store),
        Arc::new(StaticPathComputer::new(two_layer_path())),
        Arc::new(RecordingProvisioner::new()),
    )
}

#[tokio::test]
async fn provisioning_result_submitted_on_its_stream_notifies() -> Result<()> {
    let (engine, mut notifications) = start(two_layer_path_topology().seed());

    let computed = engine.path_driver().request_path(dsr_request("customer-1")).await?;
    assert_eq!(computed.stream, StreamId::new(PCE_STREAM));
    let service_id = computed.service_id.clone();
    engine.path_driver().handle(computed).await?;

    let implemented = engine.provisioning_driver().provision(&service_id).await?;
    assert_eq!(implemented.stream, StreamId::new(RENDERER_STREAM));
    engine.submit(implemented).await?;
    engine.shutdown().await;

    let notification = tokio::time::timeout(Duration::from_secs(5), notifications.recv())
        .await
        .expect("notification in time")
        .expect("channel open");
    assert_eq!(notification.service_id, service_id);
    assert_eq!(notification.current, ServiceState::IN_SERVICE);
    assert!(notifications.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn topology_changes_reach_the_notification_channel() -> Result<()> {
    let (engine, mut notifications) = start(end_to_end_topology().seed());

    engine
        .topology()
        .on_edge_point_changes(&[(
            EdgePointId::new(e2e::FAILING_EDGE_POINT),
            OperationalState::Disabled,
        )])
        .await?;

    let mut notified = vec![
        notifications.recv().await.expect("first").service_id,
        notifications.recv().await.expect("second").service_id,
    ];
    notified.sort();
    assert_eq!(
        notified,
        vec![ServiceId::new(e2e::DSR_SERVICE), ServiceId::new(e2e::ODU_SERVICE)]
    );
    assert!(notifications.try_recv().is_err());
    engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn event_on_unregistered_stream_is_rejected() {
    let (engine, _notifications) = start(RecordingGraphStore::new());
    let event = LifecycleEvent::successful(
        StreamId::new("olm"),
        EventKind::ServiceImplementationRequest,
        ServiceId::new("S1"),
        "Service implemented",
    );

    let err = engine.submit(event).await.unwrap_err();
    assert!(matches!(err, Error::UnknownStream { .. }));
    engine.shutdown().await;
}

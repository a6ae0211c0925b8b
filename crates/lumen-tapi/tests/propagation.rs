//! Topology change propagation tests.
//!
//! Drive the topology listener against seeded graphs and check persisted
//! state, notifications and the order of store operations.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use lumen_core::{ConnectionId, EdgePointId, ServiceId};
use lumen_tapi::error::Result;
use lumen_tapi::model::{
    Connection, ConnectivityService, LayerProtocolName, LifecycleState, OperationalState,
    ServiceState,
};
use lumen_tapi::notifier::{InMemoryNotificationSink, NotificationSink, Notifier};
use lumen_tapi::propagator::LayerPropagator;
use lumen_tapi::store::GraphStore;
use lumen_tapi::topology::TopologyListener;
use lumen_test_utils::{
    FailingSink, GraphOp, RecordingGraphStore, TopologyBuilder, assert_committed_before,
    assert_connection_state, assert_never_committed, assert_notified, assert_service_state,
    chain_edge_point, chain_services, e2e, end_to_end_topology, init_test_logging,
};

use LayerProtocolName::{Dsr, Odu, PhotonicMedia};
use OperationalState::{Disabled, Enabled};

fn listener_with_sink(
    store: &Arc<RecordingGraphStore>,
    sink: Arc<dyn NotificationSink>,
) -> TopologyListener<RecordingGraphStore> {
    TopologyListener::new(LayerPropagator::new(Arc::clone(store)), Notifier::new(sink))
}

fn listener(
    store: &Arc<RecordingGraphStore>,
) -> (TopologyListener<RecordingGraphStore>, Arc<InMemoryNotificationSink>) {
    let sink = Arc::new(InMemoryNotificationSink::new());
    (listener_with_sink(store, sink.clone()), sink)
}

fn change(edge_point: &str, state: OperationalState) -> [(EdgePointId, OperationalState); 1] {
    [(EdgePointId::new(edge_point), state)]
}

async fn snapshot(store: &RecordingGraphStore) -> (Vec<ConnectivityService>, Vec<Connection>) {
    let mut ctx = store.context().await.expect("context");
    ctx.services.sort_by(|a, b| a.id.cmp(&b.id));
    ctx.connections.sort_by(|a, b| a.id.cmp(&b.id));
    (ctx.services, ctx.connections)
}

#[tokio::test]
async fn edge_point_failure_locks_exactly_the_affected_services() -> Result<()> {
    init_test_logging();
    let store = Arc::new(end_to_end_topology().seed());
    let (listener, sink) = listener(&store);

    let changes = listener
        .on_edge_point_changes(&change(e2e::FAILING_EDGE_POINT, Disabled))
        .await?;
    assert_eq!(changes.len(), 2);

    let published = sink.published()?;
    assert_notified(&published, &[e2e::ODU_SERVICE, e2e::DSR_SERVICE]);
    for notification in &published {
        assert_eq!(notification.previous, ServiceState::IN_SERVICE);
        assert_eq!(notification.current, ServiceState::OUT_OF_SERVICE);
    }

    assert_connection_state(&*store, e2e::MEDIA_CONNECTION, Disabled).await;
    assert_connection_state(&*store, e2e::ODU_CONNECTION, Disabled).await;
    assert_service_state(&*store, e2e::ODU_SERVICE, ServiceState::OUT_OF_SERVICE).await;
    assert_service_state(&*store, e2e::DSR_SERVICE, ServiceState::OUT_OF_SERVICE).await;

    assert_connection_state(&*store, "TOP-C-D-MC", Enabled).await;
    assert_service_state(&*store, e2e::UNRELATED_ODU_SERVICE, ServiceState::IN_SERVICE).await;
    assert_service_state(&*store, e2e::UNRELATED_DSR_SERVICE, ServiceState::IN_SERVICE).await;
    Ok(())
}

#[tokio::test]
async fn repeated_topology_change_is_idempotent() -> Result<()> {
    let store = Arc::new(end_to_end_topology().seed());
    let (listener, sink) = listener(&store);
    let down = change(e2e::FAILING_EDGE_POINT, Disabled);

    listener.on_edge_point_changes(&down).await?;
    let after_first = snapshot(&store).await;

    let second = listener.on_edge_point_changes(&down).await?;
    assert!(second.is_empty());
    assert_eq!(snapshot(&store).await, after_first);
    assert_eq!(sink.published()?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn supporting_service_settles_before_the_service_it_supports() -> Result<()> {
    let store = Arc::new(end_to_end_topology().seed());
    let (listener, _sink) = listener(&store);

    listener
        .on_edge_point_changes(&change(e2e::FAILING_EDGE_POINT, Disabled))
        .await?;

    let ops = store.operations();
    let odu_key = format!("service/{}", e2e::ODU_SERVICE);
    let dsr_key = format!("service/{}", e2e::DSR_SERVICE);
    assert_committed_before(&ops, &odu_key, &dsr_key);

    let odu_commit = ops.iter().position(|op| op.commits(&odu_key)).unwrap();
    let dsr_commit = ops.iter().position(|op| op.commits(&dsr_key)).unwrap();
    assert!(
        ops[odu_commit..dsr_commit]
            .iter()
            .any(|op| op.reads_service(e2e::ODU_SERVICE)),
        "DSR evaluation must read the committed ODU service: {ops:?}"
    );
    Ok(())
}

#[tokio::test]
async fn simultaneous_odu_and_dsr_failures_settle_in_layer_order() -> Result<()> {
    let store = Arc::new(
        TopologyBuilder::new()
            .edge_point("XPDR-A:NETWORK1", Odu)
            .edge_point("XPDR-C:NETWORK1", Odu)
            .edge_point("XPDR-A:CLIENT1", Dsr)
            .edge_point("XPDR-C:CLIENT1", Dsr)
            .cross_connection("ODU-XC", Odu, "XPDR-A:NETWORK1", "XPDR-C:NETWORK1")
            .cross_connection("DSR-XC", Dsr, "XPDR-A:CLIENT1", "XPDR-C:CLIENT1")
            .service("SVC-ODU", Odu, &["ODU-XC"], &[])
            .service("SVC-DSR", Dsr, &["DSR-XC"], &["SVC-ODU"])
            .seed(),
    );
    let (listener, sink) = listener(&store);

    // DSR first in the batch; settling order must not follow input order.
    let batch = [
        (EdgePointId::new("XPDR-A:CLIENT1"), Disabled),
        (EdgePointId::new("XPDR-A:NETWORK1"), Disabled),
    ];
    let changes = listener.on_edge_point_changes(&batch).await?;

    assert_eq!(changes.len(), 2);
    assert_notified(&sink.published()?, &["SVC-DSR", "SVC-ODU"]);

    let ops = store.operations();
    assert_committed_before(&ops, "service/SVC-ODU", "service/SVC-DSR");
    let odu_commit = ops.iter().position(|op| op.commits("service/SVC-ODU")).unwrap();
    let dsr_commit = ops.iter().position(|op| op.commits("service/SVC-DSR")).unwrap();
    assert!(
        ops[odu_commit..dsr_commit]
            .iter()
            .any(|op| op.reads_service("SVC-ODU")),
        "DSR evaluation must read the committed ODU service: {ops:?}"
    );
    assert_connection_state(&*store, "ODU-XC", Disabled).await;
    assert_connection_state(&*store, "DSR-XC", Disabled).await;
    assert_service_state(&*store, "SVC-DSR", ServiceState::OUT_OF_SERVICE).await;
    Ok(())
}

#[tokio::test]
async fn connection_updates_commit_with_their_service() -> Result<()> {
    let store = Arc::new(end_to_end_topology().seed());
    let (listener, _sink) = listener(&store);

    listener
        .on_edge_point_changes(&change(e2e::FAILING_EDGE_POINT, Disabled))
        .await?;

    let commits = store.commits();
    let odu_batch = commits
        .iter()
        .find(|keys| keys.contains(&format!("service/{}", e2e::ODU_SERVICE)))
        .expect("ODU service commit");
    assert!(odu_batch.contains(&format!("connection/{}", e2e::MEDIA_CONNECTION)));
    assert!(odu_batch.contains(&format!("connection/{}", e2e::ODU_CONNECTION)));
    Ok(())
}

#[tokio::test]
async fn failure_cascades_upward_through_every_layer() -> Result<()> {
    let store = Arc::new((0..3).fold(TopologyBuilder::new(), TopologyBuilder::chain).seed());
    let (listener, sink) = listener(&store);

    let changes = listener
        .on_edge_point_changes(&change(&chain_edge_point(1), Disabled))
        .await?;

    let [odu, dsr, eth] = chain_services(1);
    assert_notified(&sink.published()?, &[odu.as_str(), dsr.as_str(), eth.as_str()]);
    assert!(changes.iter().all(|c| c.current() == ServiceState::OUT_OF_SERVICE));
    assert!(
        changes
            .windows(2)
            .all(|pair| pair[0].service.layer <= pair[1].service.layer)
    );

    let ops = store.operations();
    assert_committed_before(&ops, &format!("service/{odu}"), &format!("service/{dsr}"));
    assert_committed_before(&ops, &format!("service/{dsr}"), &format!("service/{eth}"));
    for untouched in [0, 2] {
        assert_never_committed(&ops, &format!("connection/MC-{untouched}"));
        for service in chain_services(untouched) {
            assert_service_state(&*store, &service, ServiceState::IN_SERVICE).await;
        }
    }
    Ok(())
}

#[tokio::test]
async fn recovery_restores_service_and_connections() -> Result<()> {
    let store = Arc::new(end_to_end_topology().seed());
    let (listener, sink) = listener(&store);

    listener
        .on_edge_point_changes(&change(e2e::FAILING_EDGE_POINT, Disabled))
        .await?;
    let recovered = listener
        .on_edge_point_changes(&change(e2e::FAILING_EDGE_POINT, Enabled))
        .await?;

    assert_eq!(recovered.len(), 2);
    assert!(recovered.iter().all(|c| c.previous == ServiceState::OUT_OF_SERVICE));
    assert_connection_state(&*store, e2e::MEDIA_CONNECTION, Enabled).await;
    assert_connection_state(&*store, e2e::ODU_CONNECTION, Enabled).await;
    assert_service_state(&*store, e2e::DSR_SERVICE, ServiceState::IN_SERVICE).await;
    assert_eq!(sink.published()?.len(), 4);
    Ok(())
}

fn dual_homed_topology() -> TopologyBuilder {
    TopologyBuilder::new()
        .edge_point("A1:P", PhotonicMedia)
        .edge_point("B1:P", PhotonicMedia)
        .edge_point("A2:P", PhotonicMedia)
        .edge_point("B2:P", PhotonicMedia)
        .cross_connection("L1", PhotonicMedia, "A1:P", "B1:P")
        .cross_connection("L2", PhotonicMedia, "A2:P", "B2:P")
        .top_connection("T1", Odu, &["L1"])
        .top_connection("T2", Odu, &["L2"])
        .service("SO1", Odu, &["T1"], &[])
        .service("SO2", Odu, &["T2"], &[])
        .service("D", Dsr, &[], &["SO1", "SO2"])
}

#[tokio::test]
async fn service_stays_locked_until_every_supporter_recovers() -> Result<()> {
    let store = Arc::new(dual_homed_topology().seed());
    let (listener, _sink) = listener(&store);

    listener
        .on_edge_point_changes(&[
            (EdgePointId::new("A1:P"), Disabled),
            (EdgePointId::new("A2:P"), Disabled),
        ])
        .await?;
    assert_service_state(&*store, "D", ServiceState::OUT_OF_SERVICE).await;

    let partial = listener.on_edge_point_changes(&change("A1:P", Enabled)).await?;
    let changed: Vec<&str> = partial.iter().map(|c| c.service.id.as_str()).collect();
    assert_eq!(changed, vec!["SO1"]);
    assert_service_state(&*store, "D", ServiceState::OUT_OF_SERVICE).await;

    let full = listener.on_edge_point_changes(&change("A2:P", Enabled)).await?;
    let mut changed: Vec<&str> = full.iter().map(|c| c.service.id.as_str()).collect();
    changed.sort_unstable();
    assert_eq!(changed, vec!["D", "SO2"]);
    assert_service_state(&*store, "D", ServiceState::IN_SERVICE).await;
    Ok(())
}

#[tokio::test]
async fn service_with_one_failed_connection_stays_locked() -> Result<()> {
    let store = Arc::new(
        dual_homed_topology()
            .service("MULTI", Odu, &["T1", "T2"], &[])
            .seed(),
    );
    let (listener, _sink) = listener(&store);

    listener.on_edge_point_changes(&change("B2:P", Disabled)).await?;
    assert_service_state(&*store, "MULTI", ServiceState::OUT_OF_SERVICE).await;
    assert_service_state(&*store, "SO1", ServiceState::IN_SERVICE).await;
    Ok(())
}

#[tokio::test]
async fn mutually_supporting_services_terminate() -> Result<()> {
    let store = Arc::new(
        TopologyBuilder::new()
            .edge_point("CA:1", Odu)
            .edge_point("CB:1", Odu)
            .cross_connection("XA", Odu, "CA:1", "CB:1")
            .service("SA", Odu, &["XA"], &["SB"])
            .service("SB", Dsr, &[], &["SA"])
            .seed(),
    );
    let (listener, sink) = listener(&store);

    let changes = listener.on_edge_point_changes(&change("CA:1", Disabled)).await?;
    assert_eq!(changes.len(), 2);
    assert_notified(&sink.published()?, &["SA", "SB"]);
    Ok(())
}

#[tokio::test]
async fn lower_connection_cycle_is_isolated_to_its_service() -> Result<()> {
    let store = Arc::new(
        TopologyBuilder::new()
            .chain(0)
            .top_connection("C1", Odu, &["C2"])
            .top_connection("C2", Odu, &["C1"])
            .service("LOOPED", Odu, &["C1"], &[])
            .seed(),
    );
    let (listener, sink) = listener(&store);

    let changes = listener
        .on_edge_point_changes(&change(&chain_edge_point(0), Disabled))
        .await?;

    assert_eq!(changes.len(), 3);
    assert_eq!(sink.published()?.len(), 3);
    assert_service_state(&*store, "LOOPED", ServiceState::IN_SERVICE).await;
    assert_never_committed(&store.operations(), "service/LOOPED");
    Ok(())
}

#[tokio::test]
async fn cyclic_top_connection_does_not_hide_a_sibling_failure() -> Result<()> {
    let store = Arc::new(
        TopologyBuilder::new()
            .edge_point("A:1", Odu)
            .edge_point("A:2", Odu)
            .cross_connection("XC", Odu, "A:1", "A:2")
            .top_connection("C1", Odu, &["C2"])
            .top_connection("C2", Odu, &["C1"])
            .service("S", Odu, &["C1", "XC"], &[])
            .seed(),
    );
    let (listener, sink) = listener(&store);

    let changes = listener.on_edge_point_changes(&change("A:1", Disabled)).await?;

    assert_eq!(changes.len(), 1);
    assert_notified(&sink.published()?, &["S"]);
    assert_connection_state(&*store, "XC", Disabled).await;
    assert_connection_state(&*store, "C1", Enabled).await;
    assert_service_state(&*store, "S", ServiceState::OUT_OF_SERVICE).await;
    Ok(())
}

fn deep_stack(depth: usize) -> TopologyBuilder {
    let builder = TopologyBuilder::new()
        .edge_point("D:1", PhotonicMedia)
        .edge_point("D:2", PhotonicMedia)
        .cross_connection("DEEP-XC", PhotonicMedia, "D:1", "D:2");
    let builder = (0..depth).fold(builder, |builder, level| {
        let lower = if level + 1 == depth {
            "DEEP-XC".to_string()
        } else {
            format!("DEEP-{}", level + 1)
        };
        builder.top_connection(&format!("DEEP-{level}"), Odu, &[&lower])
    });
    builder.service("DEEP", Odu, &["DEEP-0"], &[])
}

#[tokio::test]
async fn lower_connection_chain_deeper_than_the_bound_is_skipped() -> Result<()> {
    let store = Arc::new(deep_stack(7).seed());
    let sink = Arc::new(InMemoryNotificationSink::new());
    let listener = TopologyListener::new(
        LayerPropagator::new(Arc::clone(&store)).with_max_depth(4),
        Notifier::new(sink.clone()),
    );

    let changes = listener.on_edge_point_changes(&change("D:1", Disabled)).await?;
    assert!(changes.is_empty());
    assert_service_state(&*store, "DEEP", ServiceState::IN_SERVICE).await;

    let relaxed = TopologyListener::new(
        LayerPropagator::new(Arc::clone(&store)).with_max_depth(8),
        Notifier::new(sink.clone()),
    );
    let changes = relaxed.on_edge_point_changes(&change("D:1", Disabled)).await?;
    assert_eq!(changes.len(), 1);
    assert_service_state(&*store, "DEEP", ServiceState::OUT_OF_SERVICE).await;
    Ok(())
}

#[tokio::test]
async fn storage_failure_is_isolated_to_one_service_stack() -> Result<()> {
    let store = Arc::new((0..2).fold(TopologyBuilder::new(), TopologyBuilder::chain).seed());
    let (listener, sink) = listener(&store);
    let [odu0, ..] = chain_services(0);
    store.inject_failure(format!("service/{odu0}"));

    let both_down = [
        (EdgePointId::new(chain_edge_point(0)), Disabled),
        (EdgePointId::new(chain_edge_point(1)), Disabled),
    ];
    let changes = listener.on_edge_point_changes(&both_down).await?;

    let [odu1, dsr1, eth1] = chain_services(1);
    assert_eq!(changes.len(), 3);
    assert_notified(&sink.drain()?, &[odu1.as_str(), dsr1.as_str(), eth1.as_str()]);
    assert_connection_state(&*store, "MC-0", Enabled).await;

    store.clear_failures();
    let retried = listener.on_edge_point_changes(&both_down).await?;
    let [_, dsr0, eth0] = chain_services(0);
    assert_eq!(retried.len(), 3);
    assert_notified(&sink.drain()?, &[odu0.as_str(), dsr0.as_str(), eth0.as_str()]);
    assert_connection_state(&*store, "MC-0", Disabled).await;
    Ok(())
}

#[tokio::test]
async fn publish_failure_does_not_roll_back_state() -> Result<()> {
    let store = Arc::new(end_to_end_topology().seed());
    let sink = FailingSink::new();
    let listener = listener_with_sink(&store, sink.clone());

    let changes = listener
        .on_edge_point_changes(&change(e2e::FAILING_EDGE_POINT, Disabled))
        .await?;

    assert_eq!(changes.len(), 2);
    assert_eq!(sink.attempts(), 2);
    assert_service_state(&*store, e2e::DSR_SERVICE, ServiceState::OUT_OF_SERVICE).await;
    Ok(())
}

#[tokio::test]
async fn unknown_edge_point_changes_nothing() -> Result<()> {
    let store = Arc::new(end_to_end_topology().seed());
    let (listener, sink) = listener(&store);

    let changes = listener.on_edge_point_changes(&change("NOWHERE:1", Disabled)).await?;

    assert!(changes.is_empty());
    assert!(sink.published()?.is_empty());
    assert!(
        !store
            .operations()
            .iter()
            .any(|op| matches!(op, GraphOp::Commit { .. }))
    );
    Ok(())
}

#[tokio::test]
async fn pending_service_is_not_evaluated() -> Result<()> {
    let mut pending = ConnectivityService::new(ServiceId::new("PENDING"), "pending", Odu)
        .with_connection(ConnectionId::new(e2e::ODU_CONNECTION));
    pending.lifecycle_state = LifecycleState::Pending;
    let store = Arc::new(end_to_end_topology().raw_service(pending).seed());
    let (listener, sink) = listener(&store);

    listener
        .on_edge_point_changes(&change(e2e::FAILING_EDGE_POINT, Disabled))
        .await?;

    assert_service_state(&*store, "PENDING", ServiceState::IN_SERVICE).await;
    assert_notified(&sink.published()?, &[e2e::ODU_SERVICE, e2e::DSR_SERVICE]);
    Ok(())
}

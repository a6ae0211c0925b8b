//! Graph store contract tests.
//!
//! Every `GraphStore` implementation must give read-your-writes, whole-entity
//! upserts and all-or-nothing batches. These run against the in-memory store
//! and the recording wrapper the integration tests rely on.

use std::sync::Arc;

use lumen_core::{ConnectionId, EdgePointId, ServiceId};
use lumen_tapi::model::{LayerProtocolName, OperationalState, ServiceState};
use lumen_tapi::store::memory::InMemoryGraphStore;
use lumen_tapi::store::{GraphStore, WriteBatch};
use lumen_test_utils::{GraphOp, RecordingGraphStore, TopologyBuilder, end_to_end_topology, e2e};

async fn contract_read_your_writes(store: Arc<dyn GraphStore>) {
    let batch = TopologyBuilder::new()
        .edge_point("N:1", LayerProtocolName::Odu)
        .service("S", LayerProtocolName::Odu, &[], &[])
        .build();
    store.commit(batch).await.expect("commit");

    assert!(store.edge_point(&EdgePointId::new("N:1")).await.expect("read").is_some());
    let service = store.service(&ServiceId::new("S")).await.expect("read").expect("present");
    assert_eq!(service.state(), ServiceState::IN_SERVICE);

    let mut update = WriteBatch::new();
    update.merge_service(service.with_state(ServiceState::OUT_OF_SERVICE));
    store.commit(update).await.expect("commit");
    let service = store.service(&ServiceId::new("S")).await.expect("read").expect("present");
    assert_eq!(service.state(), ServiceState::OUT_OF_SERVICE);
}

async fn contract_delete_absent_is_ok(store: Arc<dyn GraphStore>) {
    let mut batch = WriteBatch::new();
    batch
        .delete_connection(ConnectionId::new("missing"))
        .delete_service(ServiceId::new("missing"));
    store.commit(batch).await.expect("deleting absent entities succeeds");
}

#[tokio::test]
async fn in_memory_store_honors_contract() {
    contract_read_your_writes(Arc::new(InMemoryGraphStore::new())).await;
    contract_delete_absent_is_ok(Arc::new(InMemoryGraphStore::new())).await;
}

#[tokio::test]
async fn recording_store_honors_contract() {
    contract_read_your_writes(Arc::new(RecordingGraphStore::new())).await;
    contract_delete_absent_is_ok(Arc::new(RecordingGraphStore::new())).await;
}

#[tokio::test]
async fn failed_batch_leaves_store_untouched() {
    let store = end_to_end_topology().seed();
    store.inject_failure(format!("service/{}", e2e::DSR_SERVICE));

    let odu = store
        .connection(&ConnectionId::new(e2e::ODU_CONNECTION))
        .await
        .expect("read")
        .expect("present");
    let mut batch = WriteBatch::new();
    batch
        .merge_connection(odu.transitioned(OperationalState::Disabled))
        .delete_service(ServiceId::new(e2e::DSR_SERVICE));
    assert!(store.commit(batch).await.is_err());

    store.clear_failures();
    let odu = store
        .connection(&ConnectionId::new(e2e::ODU_CONNECTION))
        .await
        .expect("read")
        .expect("present");
    assert_eq!(odu.operational_state, OperationalState::Enabled);
    assert!(
        store
            .service(&ServiceId::new(e2e::DSR_SERVICE))
            .await
            .expect("read")
            .is_some()
    );
}

#[tokio::test]
async fn context_reads_are_recorded() {
    let store = end_to_end_topology().seed();
    let ctx = store.context().await.expect("context");
    assert_eq!(ctx.services.len(), 4);
    assert_eq!(store.operations(), vec![GraphOp::Context]);
    store.clear_operations();
    assert!(store.operations().is_empty());
}

//! Custom assertion helpers for integration tests.

use lumen_core::{ConnectionId, ServiceId};
use lumen_tapi::model::{OperationalState, ServiceState};
use lumen_tapi::notifier::Notification;
use lumen_tapi::store::GraphStore;

use crate::storage::GraphOp;

/// Asserts the persisted state of a service.
///
/// # Panics
///
/// Panics if the service is missing or its state differs.
pub async fn assert_service_state<S: GraphStore + ?Sized>(
    store: &S,
    id: &str,
    expected: ServiceState,
) {
    let service = store
        .service(&ServiceId::new(id))
        .await
        .expect("read service")
        .unwrap_or_else(|| panic!("service {id} not found"));
    assert_eq!(
        service.state(),
        expected,
        "Expected service {id} to be {expected}, but it was {}",
        service.state()
    );
}

/// Asserts the persisted operational state of a connection and its CEPs.
///
/// # Panics
///
/// Panics if the connection is missing or any state differs.
pub async fn assert_connection_state<S: GraphStore + ?Sized>(
    store: &S,
    id: &str,
    expected: OperationalState,
) {
    let connection = store
        .connection(&ConnectionId::new(id))
        .await
        .expect("read connection")
        .unwrap_or_else(|| panic!("connection {id} not found"));
    assert_eq!(
        connection.operational_state, expected,
        "Expected connection {id} to be {expected}"
    );
    for cep in &connection.end_points {
        assert_eq!(
            cep.operational_state, expected,
            "Expected CEP {} of connection {id} to be {expected}",
            cep.id
        );
    }
}

/// Asserts that notifications were published for exactly these services,
/// in any order.
///
/// # Panics
///
/// Panics if the notified service set differs.
pub fn assert_notified(notifications: &[Notification], expected: &[&str]) {
    let mut actual: Vec<&str> = notifications.iter().map(|n| n.service_id.as_str()).collect();
    actual.sort_unstable();
    let mut expected = expected.to_vec();
    expected.sort_unstable();
    assert_eq!(actual, expected, "Unexpected notification set");
}

/// Asserts that the commit touching `first` happened before the commit
/// touching `second`.
///
/// # Panics
///
/// Panics if either commit is missing or they are out of order.
pub fn assert_committed_before(ops: &[GraphOp], first: &str, second: &str) {
    let position = |key: &str| {
        ops.iter()
            .position(|op| op.commits(key))
            .unwrap_or_else(|| panic!("no commit touching {key} in {ops:?}"))
    };
    let (a, b) = (position(first), position(second));
    assert!(a < b, "Commit of {first} (#{a}) did not precede commit of {second} (#{b})");
}

/// Asserts that no commit touched a key starting with `prefix`.
///
/// # Panics
///
/// Panics if any commit touched the prefix.
pub fn assert_never_committed(ops: &[GraphOp], prefix: &str) {
    for op in ops {
        if let GraphOp::Commit { keys } = op {
            assert!(
                !keys.iter().any(|k| k.starts_with(prefix)),
                "Unexpected commit touching {prefix}: {keys:?}"
            );
        }
    }
}

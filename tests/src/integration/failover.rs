//! # Failover Flows
//!
//! Supervisor behaviour across disconnects, driven through the in-memory
//! transport:
//!
//! 1. **Mutual exclusion**: concurrent triggers never start a second cycle
//! 2. **Rotation**: after N losses the endpoint is slot `N mod width`
//! 3. **Waiting callers**: `get_connection` only returns the fresh handle
//! 4. **Fatal start**: an unreachable pool fails `create` with no retries

use std::sync::Arc;
use std::time::Duration;

use rpc_failover::adapters::InMemoryTransport;
use rpc_failover::{
    ConnectionState, ConnectionSupervisor, ReconnectOutcome, SupervisorError, TransportHandle,
};
use tokio::time::timeout;

use super::{fast_config, node_urls, pool, wait_for_generation, wait_until_busy, WAIT};

// =============================================================================
// MUTUAL EXCLUSION
// =============================================================================

#[tokio::test]
async fn test_concurrent_triggers_run_one_cycle() {
    let transport = InMemoryTransport::new();
    let sup = ConnectionSupervisor::create(transport.clone(), pool(5, 5), fast_config())
        .await
        .unwrap();
    transport.hold_connects();

    // Loss signal starts the cycle; it parks on the held connect.
    transport
        .handle_for("ws://node-0:9944")
        .unwrap()
        .drop_connection();
    wait_until_busy(&sup).await;

    let mut racers = Vec::new();
    for _ in 0..8 {
        let sup = sup.clone();
        racers.push(tokio::spawn(async move { sup.request_reconnect().await }));
    }
    for racer in racers {
        assert_eq!(
            timeout(WAIT, racer).await.unwrap().unwrap(),
            ReconnectOutcome::AlreadyInProgress
        );
    }

    transport.release_connects();
    wait_for_generation(&sup, 2).await;

    assert_eq!(sup.reconnect_attempts(), 1);
    // Initial connect plus exactly one reconnect.
    assert_eq!(transport.connect_attempts().len(), 2);
    assert_eq!(sup.state(), ConnectionState::Ready);
}

#[tokio::test]
async fn test_loss_of_replaced_connection_is_ignored() {
    let transport = InMemoryTransport::new();
    let sup = ConnectionSupervisor::create(transport.clone(), pool(5, 5), fast_config())
        .await
        .unwrap();
    let first = transport.handle_for("ws://node-0:9944").unwrap();

    sup.request_reconnect().await;
    // The old handle was already torn down; signalling it again changes nothing.
    first.drop_connection();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(sup.generation(), 2);
    assert_eq!(sup.reconnect_attempts(), 1);
}

// =============================================================================
// ROTATION ARITHMETIC
// =============================================================================

#[tokio::test]
async fn test_n_disconnects_select_slot_n_mod_width() {
    let transport = InMemoryTransport::new();
    let sup = ConnectionSupervisor::create(transport.clone(), pool(8, 5), fast_config())
        .await
        .unwrap();
    let urls = node_urls(8);

    for n in 1..=12u64 {
        let current = sup.get_connection().await;
        current.drop_connection();
        wait_for_generation(&sup, n + 1).await;

        let slot = (n % 5) as usize;
        assert_eq!(sup.reconnect_attempts(), n);
        assert_eq!(sup.rotation_slot(), slot);
        assert_eq!(sup.current_endpoint().unwrap().as_str(), urls[slot]);
    }
    // Slots 5..7 are never used with a width of 5.
    assert!(transport.handle_for("ws://node-5:9944").is_none());
}

#[tokio::test]
async fn test_width_wider_than_pool_wraps_over_pool() {
    let transport = InMemoryTransport::new();
    let sup = ConnectionSupervisor::create(transport.clone(), pool(2, 5), fast_config())
        .await
        .unwrap();

    let mut seen = Vec::new();
    for n in 1..=5u64 {
        sup.get_connection().await.drop_connection();
        wait_for_generation(&sup, n + 1).await;
        seen.push(sup.current_endpoint().unwrap().to_string());
    }

    // Slots 1, 2, 3, 4, 0 over a pool of two.
    assert_eq!(
        seen,
        vec![
            "ws://node-1:9944",
            "ws://node-0:9944",
            "ws://node-1:9944",
            "ws://node-0:9944",
            "ws://node-0:9944",
        ]
    );
}

#[tokio::test]
async fn test_unreachable_slot_is_skipped_within_cycle() {
    let transport = InMemoryTransport::new();
    let sup = ConnectionSupervisor::create(transport.clone(), pool(5, 5), fast_config())
        .await
        .unwrap();
    transport.set_reachable("ws://node-1:9944", false);
    transport.set_reachable("ws://node-2:9944", false);

    let outcome = timeout(WAIT, sup.request_reconnect()).await.unwrap();

    match outcome {
        ReconnectOutcome::Completed { attempts, endpoint } => {
            assert_eq!(attempts, 3);
            assert_eq!(endpoint.as_str(), "ws://node-3:9944");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    // One reconnect cycle, one published connection.
    assert_eq!(sup.generation(), 2);
}

// =============================================================================
// WAITING CALLERS
// =============================================================================

#[tokio::test]
async fn test_waiting_callers_all_get_post_reconnect_handle() {
    let transport = InMemoryTransport::new();
    let sup = ConnectionSupervisor::create(transport.clone(), pool(3, 5), fast_config())
        .await
        .unwrap();
    let old = sup.get_connection().await;
    transport.hold_connects();

    old.drop_connection();
    wait_until_busy(&sup).await;

    let mut waiters = Vec::new();
    for _ in 0..4 {
        let sup = sup.clone();
        waiters.push(tokio::spawn(async move { sup.get_connection().await }));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(waiters.iter().all(|w| !w.is_finished()));

    transport.release_connects();

    let mut handles = Vec::new();
    for waiter in waiters {
        handles.push(timeout(WAIT, waiter).await.unwrap().unwrap());
    }
    for handle in &handles {
        assert!(!Arc::ptr_eq(handle, &old));
        assert!(Arc::ptr_eq(handle, &handles[0]));
        assert!(handle.is_connected());
    }
    assert_eq!(handles[0].endpoint().as_str(), "ws://node-1:9944");
}

#[tokio::test]
async fn test_requests_go_through_current_handle() {
    let transport = InMemoryTransport::new();
    let sup = ConnectionSupervisor::create(transport.clone(), pool(3, 5), fast_config())
        .await
        .unwrap();

    sup.request_reconnect().await;
    let api = sup.get_connection().await;
    let reply = api
        .request("staking_validators", serde_json::json!([]))
        .await
        .unwrap();

    assert_eq!(reply["endpoint"], "ws://node-1:9944");
    assert_eq!(api.requests().len(), 1);
}

// =============================================================================
// FATAL START
// =============================================================================

#[tokio::test]
async fn test_unreachable_pool_is_fatal_without_reconnects() {
    let transport = InMemoryTransport::new();
    transport.set_all_reachable(false);

    let result = ConnectionSupervisor::create(transport.clone(), pool(4, 5), fast_config()).await;

    assert!(matches!(
        result,
        Err(SupervisorError::InitialConnection { attempted: 4, .. })
    ));
    tokio::time::sleep(Duration::from_millis(50)).await;
    // Exactly one try per endpoint, nothing afterwards.
    assert_eq!(transport.connect_attempts().len(), 4);
}

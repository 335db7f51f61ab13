//! # Notification Flows
//!
//! Raw event batches pushed through a supervised connection and observed
//! by listeners registered on the supervisor's normaliser.

use std::sync::Arc;

use parking_lot::Mutex;
use rpc_failover::adapters::InMemoryTransport;
use rpc_failover::{
    ChannelListener, ConnectionSupervisor, DomainNotification, EventNormalizer,
    NotificationFilter, NotificationKind, RawEvent,
};
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

use super::{fast_config, pool, wait_for_generation, WAIT};

async fn next(rx: &mut UnboundedReceiver<DomainNotification>) -> DomainNotification {
    timeout(WAIT, rx.recv())
        .await
        .expect("notification not delivered")
        .expect("listener channel closed")
}

#[tokio::test]
async fn test_new_session_reaches_every_listener_in_order() {
    let transport = InMemoryTransport::new();
    let sup = ConnectionSupervisor::create(transport.clone(), pool(2, 5), fast_config())
        .await
        .unwrap();

    let log: Arc<Mutex<Vec<(usize, DomainNotification)>>> = Arc::default();
    for listener in 0..3 {
        let log = log.clone();
        sup.normalizer()
            .subscribe(move |n: &DomainNotification| log.lock().push((listener, n.clone())));
    }
    let (tail, mut rx) = ChannelListener::channel();
    sup.normalizer().subscribe(tail);

    let api = sup.get_connection().await;
    assert!(api.emit(vec![RawEvent::new("session", "NewSession", vec![json!(7)])]));

    let expected = DomainNotification::SessionRotated {
        session_index: "7".into(),
    };
    // The channel listener is last, so the others have run once it fires.
    assert_eq!(next(&mut rx).await, expected);
    assert_eq!(
        *log.lock(),
        vec![
            (0, expected.clone()),
            (1, expected.clone()),
            (2, expected.clone()),
        ]
    );
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_block_order_is_preserved_and_unknown_events_dropped() {
    let transport = InMemoryTransport::new();
    let sup = ConnectionSupervisor::create(transport.clone(), pool(2, 5), fast_config())
        .await
        .unwrap();
    let (listener, mut rx) = ChannelListener::channel();
    sup.normalizer().subscribe(listener);

    let api = sup.get_connection().await;
    api.emit(vec![
        RawEvent::new("balances", "Transfer", vec![json!("a"), json!("b"), json!(1)]),
        RawEvent::new("staking", "Reward", vec![json!("stashA"), json!(500)]),
        RawEvent::new("system", "ExtrinsicSuccess", vec![]),
        RawEvent::new(
            "imOnline",
            "SomeOffline",
            vec![json!([["val-1", {"total": 1}], ["val-2", {"total": 2}]])],
        ),
        RawEvent::new("session", "NewSession", vec![json!(8)]),
    ]);

    assert_eq!(
        next(&mut rx).await,
        DomainNotification::RewardPaid {
            stash: "stashA".into(),
            amount: "500".into()
        }
    );
    assert_eq!(
        next(&mut rx).await,
        DomainNotification::ValidatorsOffline {
            offline_ids: vec!["val-1".into(), "val-2".into()]
        }
    );
    assert_eq!(
        next(&mut rx).await,
        DomainNotification::SessionRotated {
            session_index: "8".into()
        }
    );
    assert!(rx.try_recv().is_err());
    assert_eq!(sup.normalizer().notifications_emitted(), 3);
}

#[tokio::test]
async fn test_unrecognised_only_block_yields_nothing() {
    let transport = InMemoryTransport::new();
    let sup = ConnectionSupervisor::create(transport.clone(), pool(1, 5), fast_config())
        .await
        .unwrap();
    let (listener, mut rx) = ChannelListener::channel();
    sup.normalizer().subscribe(listener);
    let (marker, mut marker_rx) = ChannelListener::channel();
    sup.normalizer()
        .subscribe_filtered(NotificationFilter::kinds([NotificationKind::SessionRotated]), marker);

    let api = sup.get_connection().await;
    api.emit(vec![RawEvent::new("treasury", "Proposed", vec![json!(1)])]);
    // Second block flushes the first through the pump.
    api.emit(vec![RawEvent::new("session", "NewSession", vec![json!(1)])]);

    next(&mut marker_rx).await;
    assert!(matches!(
        rx.try_recv(),
        Ok(DomainNotification::SessionRotated { .. })
    ));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_listeners_registered_before_reconnect_keep_receiving() {
    let transport = InMemoryTransport::new();
    let sup = ConnectionSupervisor::create(transport.clone(), pool(3, 5), fast_config())
        .await
        .unwrap();
    let (early, mut early_rx) = ChannelListener::channel();
    let (filtered, mut filtered_rx) = ChannelListener::channel();
    sup.normalizer().subscribe(early);
    sup.normalizer().subscribe_filtered(
        NotificationFilter::kinds([NotificationKind::RewardPaid]),
        filtered,
    );

    for generation in 2..=4 {
        sup.get_connection().await.drop_connection();
        wait_for_generation(&sup, generation).await;
    }
    assert_eq!(sup.normalizer().listener_count(), 2);

    let api = sup.get_connection().await;
    assert!(api.emit(vec![
        RawEvent::new("session", "NewSession", vec![json!(12)]),
        RawEvent::new("staking", "Reward", vec![json!("stashZ"), json!("42")]),
    ]));

    assert_eq!(
        next(&mut early_rx).await,
        DomainNotification::SessionRotated {
            session_index: "12".into()
        }
    );
    assert_eq!(
        next(&mut early_rx).await,
        DomainNotification::RewardPaid {
            stash: "stashZ".into(),
            amount: "42".into()
        }
    );
    assert_eq!(
        next(&mut filtered_rx).await,
        DomainNotification::RewardPaid {
            stash: "stashZ".into(),
            amount: "42".into()
        }
    );
}

#[tokio::test]
async fn test_torn_down_connection_delivers_nothing() {
    let transport = InMemoryTransport::new();
    let sup = ConnectionSupervisor::create(transport.clone(), pool(3, 5), fast_config())
        .await
        .unwrap();
    let (listener, mut rx) = ChannelListener::channel();
    sup.normalizer().subscribe(listener);
    let old = sup.get_connection().await;

    sup.request_reconnect().await;

    assert!(!old.emit(vec![RawEvent::new("session", "NewSession", vec![json!(1)])]));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_shared_normaliser_listeners_see_first_block() {
    let normalizer = Arc::new(EventNormalizer::new());
    let (listener, mut rx) = ChannelListener::channel();
    normalizer.subscribe(listener);

    let transport = InMemoryTransport::new();
    let sup = ConnectionSupervisor::create_with_normalizer(
        transport.clone(),
        pool(1, 5),
        fast_config(),
        normalizer.clone(),
    )
    .await
    .unwrap();
    assert!(Arc::ptr_eq(sup.normalizer(), &normalizer));

    sup.get_connection()
        .await
        .emit(vec![RawEvent::new("session", "NewSession", vec![json!(0)])]);

    assert_eq!(
        next(&mut rx).await,
        DomainNotification::SessionRotated {
            session_index: "0".into()
        }
    );
}

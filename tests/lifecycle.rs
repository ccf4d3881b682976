//! 连接生命周期的端到端测试
//! End-to-end tests for the connection lifecycle

pub mod common;

use common::harness::{Behavior, TestHarness};
use futures::future::join_all;
use realtime_connection::{Config, ConnectionState::*, Error, ErrorFrame};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::info;

#[tokio::test(start_paused = true)]
async fn test_full_connection_lifecycle() {
    let harness = TestHarness::new(Behavior::default());
    let connection = &harness.connection;

    connection.connect().await.unwrap();
    assert_eq!(connection.state(), Connected);
    assert_eq!(connection.id().as_deref(), Some("connection-0"));
    assert_eq!(connection.key().as_deref(), Some("secret-0"));

    let rtt = connection.ping().await.unwrap();
    info!(rtt, "Ping answered");

    connection.close().await.unwrap();
    harness.flush().await;

    assert_eq!(connection.state(), Closed);
    assert!(connection.error_reason().is_none());
    assert!(harness.service.latest().is_disposed());
    assert_eq!(
        harness.transitions(),
        vec![
            (Initialized, Connecting),
            (Connecting, Connected),
            (Connected, Closing),
            (Closing, Closed),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_close_before_connect() {
    let harness = TestHarness::new(Behavior::default());

    harness.connection.close().await.unwrap();
    harness.flush().await;

    assert_eq!(harness.connection.state(), Closed);
    assert_eq!(harness.service.transport_count(), 0);
    assert_eq!(harness.transitions(), vec![(Initialized, Closed)]);
}

#[tokio::test(start_paused = true)]
async fn test_many_concurrent_connects_open_one_transport() {
    let harness = TestHarness::new(Behavior::default());

    let results = join_all((0..10).map(|_| harness.connection.connect())).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(harness.service.transport_count(), 1);
    assert_eq!(harness.connection.state(), Connected);
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_then_automatic_retry() {
    let harness = TestHarness::new(Behavior::unresponsive());
    let started = Instant::now();

    let err = harness.connection.connect().await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(err.code(), Some(50003));
    assert!(started.elapsed() >= TestHarness::config().realtime_request_timeout);
    assert_eq!(harness.connection.state(), Disconnected);
    assert_eq!(harness.connection.error_reason(), Some(err));

    harness.service.set_behavior(Behavior::default());
    let connected = harness.connection.once(Connected);
    connected.await.unwrap();

    assert_eq!(harness.service.transport_count(), 2);
    assert!(harness.service.transport(0).is_disposed());
    assert_eq!(
        harness.transitions(),
        vec![
            (Initialized, Connecting),
            (Connecting, Disconnected),
            (Disconnected, Connecting),
            (Connecting, Connected),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_server_rejection_is_terminal() {
    let harness = TestHarness::new(Behavior {
        reject_with: Some(ErrorFrame {
            message: "Invalid key".into(),
            status_code: 401,
            code: 40101,
            nonfatal: false,
        }),
        ..Behavior::default()
    });

    let err = harness.connection.connect().await.unwrap_err();
    assert!(matches!(err, Error::Fatal(_)));
    assert_eq!(err.status_code(), Some(401));
    assert_eq!(harness.connection.state(), Failed);

    sleep(Duration::from_secs(60)).await;
    assert_eq!(harness.service.transport_count(), 1);
    assert_eq!(harness.connection.state(), Failed);

    let ping = harness.connection.ping().await.unwrap_err();
    assert!(matches!(ping, Error::InvalidState(_)));

    // Closing a failed connection is allowed and lands in closed.
    harness.connection.close().await.unwrap();
    assert_eq!(harness.connection.state(), Closed);
}

#[tokio::test(start_paused = true)]
async fn test_close_timeout_still_ends_closed() {
    let harness = TestHarness::new(Behavior {
        answer_close: false,
        ..Behavior::default()
    });
    harness.connection.connect().await.unwrap();

    let err = harness.connection.close().await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(harness.connection.state(), Closed);
    assert!(harness.service.latest().is_disposed());
}

#[tokio::test(start_paused = true)]
async fn test_close_during_backoff_stops_reconnection() {
    let harness = TestHarness::new(Behavior::unresponsive());

    assert!(harness.connection.connect().await.is_err());
    harness.service.set_behavior(Behavior::default());
    harness.connection.close().await.unwrap();

    sleep(Duration::from_secs(30)).await;
    assert_eq!(harness.connection.state(), Closed);
    assert_eq!(harness.service.transport_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_auto_connect() {
    let config = Config {
        auto_connect: true,
        ..TestHarness::config()
    };
    let harness = TestHarness::with_config(Behavior::default(), config);
    assert_eq!(harness.connection.state(), Connecting);

    harness.connection.connect().await.unwrap();
    harness.flush().await;

    assert_eq!(harness.service.transport_count(), 1);
    assert_eq!(harness.transitions(), vec![(Connecting, Connected)]);
}

#[tokio::test(start_paused = true)]
async fn test_transition_chain_is_continuous() {
    let harness = TestHarness::new(Behavior::unresponsive());

    assert!(harness.connection.connect().await.is_err());
    sleep(Duration::from_secs(10)).await;
    assert_eq!(harness.connection.state(), Disconnected);
    harness.service.set_behavior(Behavior::default());
    harness.connection.connect().await.unwrap();
    harness.connection.close().await.unwrap();
    harness.flush().await;

    let changes = harness.changes();
    assert_eq!(changes.first().unwrap().previous(), Initialized);
    assert_eq!(changes.last().unwrap().current(), Closed);
    for pair in changes.windows(2) {
        assert_eq!(pair[0].current(), pair[1].previous());
    }
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_closing_reconnects_after_close() {
    let harness = TestHarness::new(Behavior {
        answer_close: false,
        ..Behavior::default()
    });
    harness.connection.connect().await.unwrap();

    let reconnect = async {
        sleep(Duration::from_millis(5)).await;
        assert_eq!(harness.connection.state(), Closing);
        harness.connection.connect().await
    };
    let (closed, reconnected) = tokio::join!(harness.connection.close(), reconnect);

    assert!(closed.unwrap_err().is_timeout());
    reconnected.unwrap();
    harness.flush().await;

    assert_eq!(harness.connection.state(), Connected);
    assert_eq!(harness.service.transport_count(), 2);
    assert!(harness.service.transport(0).is_disposed());
    assert_eq!(
        harness.transitions(),
        vec![
            (Initialized, Connecting),
            (Connecting, Connected),
            (Connected, Closing),
            (Closing, Closed),
            (Closed, Connecting),
            (Connecting, Connected),
        ]
    );
}

//! Timer-driven scenarios: ping/pong keepalive and the reconnect policy.
//!
//! All tests run on a paused clock so 30s ping intervals and 5s reconnect
//! delays elapse instantly.

mod common;

use std::time::Duration;

use common::*;
use hyperfeed_core::config::ConnectionConfig;
use hyperfeed_stream::{
    BoxedSink, BoxedSource, ConnectionEvent, ConnectionState, Connector, DeliveryTarget,
    StreamError, StreamManager, StreamResult, Subscription,
};
use serde_json::json;
use tokio::time::{sleep, Instant};

const URL: &str = "mock://feed";

fn keepalive_config() -> ConnectionConfig {
    ConnectionConfig {
        ping_interval_secs: 30,
        pong_timeout_secs: 10,
        reconnect_delay_secs: 5,
        max_reconnect_attempts: 10,
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_missing_pong_triggers_reconnect() {
    let (connector, mut server) = MockConnector::new();
    let manager =
        StreamManager::with_connector(URL, keepalive_config(), connector.clone()).unwrap();
    let mut events = manager.events();

    let start = Instant::now();
    manager.connect().await.unwrap();
    let mut first = accept(&mut server).await;
    manager
        .subscribe(Subscription::trades("BTC"), DeliveryTarget::callback(|_| Ok(())))
        .await
        .unwrap();
    first.next_frame().await;

    assert_eq!(first.next_frame().await, json!({"method": "ping"}));
    assert!(start.elapsed() >= Duration::from_secs(30));
    assert!(manager.stats().await.last_ping.is_some());

    // the server never answers
    let lost = expect_event(&mut events, |e| {
        matches!(e, ConnectionEvent::ConnectionLost { .. })
    })
    .await;
    assert_eq!(
        lost,
        ConnectionEvent::ConnectionLost {
            reason: "pong timeout".to_string()
        }
    );
    assert!(start.elapsed() >= Duration::from_secs(40));

    let mut second = accept(&mut server).await;
    assert!(start.elapsed() >= Duration::from_secs(45));

    let event = expect_event(&mut events, |e| {
        matches!(e, ConnectionEvent::Reconnected { .. })
    })
    .await;
    assert!(matches!(event, ConnectionEvent::Reconnected { replayed: 1, .. }));
    assert_eq!(
        second.next_frame().await,
        subscribe_frame(json!({"type": "trades", "coin": "BTC"}))
    );

    let stats = manager.stats().await;
    assert!(stats.connected);
    assert_eq!(stats.probe_timeouts, 1);
    assert_eq!(stats.total_reconnects, 1);
    assert_eq!(connector.dials(), 2);
    drop(first);
}

#[tokio::test(start_paused = true)]
async fn test_failed_ping_send_triggers_reconnect() {
    let (connector, mut server) = MockConnector::new();
    let manager =
        StreamManager::with_connector(URL, keepalive_config(), connector.clone()).unwrap();
    let mut events = manager.events();

    let start = Instant::now();
    manager.connect().await.unwrap();
    let _first = accept(&mut server).await;
    connector.fail_writes(true);

    let lost = expect_event(&mut events, |e| {
        matches!(e, ConnectionEvent::ConnectionLost { .. })
    })
    .await;
    match lost {
        ConnectionEvent::ConnectionLost { reason } => {
            assert!(reason.starts_with("ping send failed"), "reason: {}", reason)
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(start.elapsed() >= Duration::from_secs(30));
    // no pong window was opened
    assert!(start.elapsed() < Duration::from_secs(40));

    connector.fail_writes(false);
    let event = expect_event(&mut events, |e| {
        matches!(e, ConnectionEvent::Reconnecting { .. })
    })
    .await;
    assert_eq!(
        event,
        ConnectionEvent::Reconnecting {
            attempt: 1,
            max_attempts: 10
        }
    );

    expect_event(&mut events, |e| {
        matches!(e, ConnectionEvent::Reconnected { .. })
    })
    .await;
    let _second = accept(&mut server).await;

    let stats = manager.stats().await;
    assert!(stats.connected);
    assert_eq!(stats.probe_timeouts, 0);
    assert_eq!(connector.dials(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_answered_pings_keep_connection() {
    let (connector, mut server) = MockConnector::new();
    let manager =
        StreamManager::with_connector(URL, keepalive_config(), connector.clone()).unwrap();

    manager.connect().await.unwrap();
    let responder = accept(&mut server).await.respond_to_pings();

    sleep(Duration::from_secs(100)).await;

    let stats = manager.stats().await;
    assert!(stats.connected);
    assert_eq!(stats.probe_timeouts, 0);
    assert!(stats.messages_sent >= 3);
    assert!(stats.last_pong.is_some());
    assert!(stats.last_pong >= stats.last_ping);
    assert_eq!(connector.dials(), 1);

    manager.disconnect().await.unwrap();
    responder.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_gives_up_after_max_attempts() {
    let (connector, mut server) = MockConnector::new();
    let manager =
        StreamManager::with_connector(URL, keepalive_config(), connector.clone()).unwrap();
    let mut events = manager.events();

    manager.connect().await.unwrap();
    let conn = accept(&mut server).await;
    manager
        .subscribe_candles("ETH", "1h", DeliveryTarget::callback(|_| Ok(())))
        .await
        .unwrap();

    connector.refuse_dials(true);
    let start = Instant::now();
    drop(conn);

    let mut attempts = Vec::new();
    let failed = loop {
        let event = expect_event(&mut events, |e| {
            matches!(
                e,
                ConnectionEvent::Reconnecting { .. } | ConnectionEvent::ReconnectFailed { .. }
            )
        })
        .await;
        match event {
            ConnectionEvent::Reconnecting {
                attempt,
                max_attempts,
            } => {
                assert_eq!(max_attempts, 10);
                attempts.push(attempt);
            }
            other => break other,
        }
    };

    assert_eq!(attempts, (1..=10).collect::<Vec<u32>>());
    assert_eq!(failed, ConnectionEvent::ReconnectFailed { attempts: 10 });
    assert!(start.elapsed() >= Duration::from_secs(50));
    assert_eq!(connector.dials(), 11);

    let stats = manager.stats().await;
    assert_eq!(stats.state, ConnectionState::Disconnected);
    assert!(!stats.connected);
    // subscriptions survive so an explicit connect can resume them
    assert_eq!(stats.subscriptions, 1);

    // no eleventh attempt
    sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.dials(), 11);

    connector.refuse_dials(false);
    manager.connect().await.unwrap();
    let mut conn = accept(&mut server).await;
    assert_eq!(
        conn.next_frame().await,
        subscribe_frame(json!({"type": "candle", "coin": "ETH", "interval": "1h"}))
    );
    assert_eq!(manager.stats().await.reconnect_attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_stops_pending_reconnect() {
    let (connector, mut server) = MockConnector::new();
    let manager =
        StreamManager::with_connector(URL, keepalive_config(), connector.clone()).unwrap();
    let mut events = manager.events();

    manager.connect().await.unwrap();
    let conn = accept(&mut server).await;

    connector.refuse_dials(true);
    drop(conn);
    expect_event(&mut events, |e| {
        matches!(e, ConnectionEvent::Reconnecting { attempt: 1, .. })
    })
    .await;

    manager.disconnect().await.unwrap();
    assert_eq!(manager.state().await, ConnectionState::Closed);
    let dials = connector.dials();

    sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.dials(), dials);
    assert_eq!(manager.state().await, ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_dial_timeout_is_a_connection_error() {
    struct HangingConnector;

    #[async_trait::async_trait]
    impl Connector for HangingConnector {
        async fn connect(&self, _url: &str) -> StreamResult<(BoxedSink, BoxedSource)> {
            std::future::pending().await
        }
    }

    let config = ConnectionConfig {
        dial_timeout_ms: 2000,
        ..keepalive_config()
    };
    let manager =
        StreamManager::with_connector(URL, config, std::sync::Arc::new(HangingConnector))
            .unwrap();

    let start = Instant::now();
    let result = manager.connect().await;
    assert!(matches!(result, Err(StreamError::Connection(_))));
    assert!(start.elapsed() >= Duration::from_secs(2));
    assert_eq!(manager.state().await, ConnectionState::Disconnected);
}

//! In-memory transport for driving `StreamManager` without a network.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hyperfeed_core::config::ConnectionConfig;
use hyperfeed_stream::{
    BoxedSink, BoxedSource, ConnectionEvent, Connector, DeliveryTarget, FrameSink, FrameSource,
    StreamError, StreamResult,
};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Upper bound for waiting on the manager. Virtual time under `start_paused`.
pub const WAIT: Duration = Duration::from_secs(120);

/// Connector handing each accepted connection to the test as a [`ServerConn`].
pub struct MockConnector {
    dials: AtomicUsize,
    refuse: AtomicBool,
    fail_writes: Arc<AtomicBool>,
    closes: Arc<AtomicUsize>,
    accepted: mpsc::UnboundedSender<ServerConn>,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerConn>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            dials: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
            fail_writes: Arc::new(AtomicBool::new(false)),
            closes: Arc::new(AtomicUsize::new(0)),
            accepted,
        });
        (connector, rx)
    }

    /// Number of dial attempts, successful or not.
    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    /// Number of client sinks closed by the manager.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn refuse_dials(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Makes every client write fail while set.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> StreamResult<(BoxedSink, BoxedSource)> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(StreamError::Connection("connection refused".to_string()));
        }

        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let (server_tx, client_rx) = mpsc::unbounded_channel();
        let _ = self.accepted.send(ServerConn {
            frames: server_rx,
            inbound: server_tx,
        });

        Ok((
            Box::new(MockSink {
                tx: client_tx,
                fail: self.fail_writes.clone(),
                closes: self.closes.clone(),
            }),
            Box::new(MockSource { rx: client_rx }),
        ))
    }
}

struct MockSink {
    tx: mpsc::UnboundedSender<String>,
    fail: Arc<AtomicBool>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send_text(&mut self, text: String) -> StreamResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StreamError::Transport("injected write failure".to_string()));
        }
        self.tx
            .send(text)
            .map_err(|_| StreamError::Transport("peer closed".to_string()))
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockSource {
    rx: mpsc::UnboundedReceiver<StreamResult<String>>,
}

#[async_trait]
impl FrameSource for MockSource {
    async fn next_frame(&mut self) -> Option<StreamResult<String>> {
        self.rx.recv().await
    }
}

/// Server side of one mock connection. Dropping it closes the client's read side.
pub struct ServerConn {
    frames: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<StreamResult<String>>,
}

impl ServerConn {
    /// Sends `{"channel":..,"data":..}` to the client.
    pub fn push(&self, channel: &str, data: Value) {
        self.push_raw(json!({"channel": channel, "data": data}).to_string());
    }

    pub fn push_raw(&self, text: impl Into<String>) {
        let _ = self.inbound.send(Ok(text.into()));
    }

    pub fn pong(&self) {
        self.push_raw(r#"{"channel":"pong"}"#);
    }

    /// Waits for the next frame the client wrote.
    pub async fn next_frame(&mut self) -> Value {
        let text = timeout(WAIT, self.frames.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("client side closed");
        serde_json::from_str(&text).expect("client frame is not JSON")
    }

    /// Frames already written by the client, without waiting.
    pub fn drain(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(text) = self.frames.try_recv() {
            frames.push(serde_json::from_str(&text).expect("client frame is not JSON"));
        }
        frames
    }

    /// Answers every ping with a pong until the client goes away.
    pub fn respond_to_pings(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(text) = self.frames.recv().await {
                if text == r#"{"method":"ping"}"# {
                    self.pong();
                }
            }
        })
    }
}

/// Connection settings with keepalive pushed out of the way and immediate reconnects.
pub fn test_config() -> ConnectionConfig {
    ConnectionConfig {
        ping_interval_secs: 3600,
        pong_timeout_secs: 10,
        reconnect_delay_secs: 0,
        dial_timeout_ms: 1000,
        write_timeout_ms: 1000,
        ..Default::default()
    }
}

pub async fn accept(server: &mut mpsc::UnboundedReceiver<ServerConn>) -> ServerConn {
    timeout(WAIT, server.recv())
        .await
        .expect("timed out waiting for a dial")
        .expect("connector dropped")
}

/// Waits for the first event matching `pred`, skipping others.
pub async fn expect_event<F>(
    events: &mut broadcast::Receiver<ConnectionEvent>,
    pred: F,
) -> ConnectionEvent
where
    F: Fn(&ConnectionEvent) -> bool,
{
    timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for connection event")
}

/// Polls `check` until it returns true.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

/// Callback target that counts invocations.
pub fn counting_callback() -> (DeliveryTarget, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let target = DeliveryTarget::callback(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    (target, calls)
}

pub fn subscribe_frame(subscription: Value) -> Value {
    json!({"method": "subscribe", "subscription": subscription})
}

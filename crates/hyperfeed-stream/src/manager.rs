//! 스트리밍 연결 관리자.
//!
//! 하나의 영속 연결 위에 여러 논리 구독을 다중화하고, 연결이 끊기면
//! 자동으로 재연결한 뒤 레지스트리의 모든 구독을 재전송합니다.
//!
//! 생명주기 상태와 구독 레지스트리는 하나의 비동기 RW 락으로 함께 보호됩니다.
//! 구독/해제와 상태 전이는 쓰기 락, 재구독 재생과 라우팅 조회는 읽기 락을 사용합니다.

use std::sync::Arc;

use hyperfeed_core::config::{ConnectionConfig, FeedConfig};
use hyperfeed_core::error::CoreResult;
use hyperfeed_core::stream_span;
use tokio::sync::{broadcast, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, warn, Instrument};

use crate::error::{StreamError, StreamResult};
use crate::event::{ConnectionEvent, EVENT_CHANNEL_CAPACITY};
use crate::frame::{subscribe_frame, unsubscribe_frame, InboundFrame};
use crate::reconnect::{self, Supervisor};
use crate::registry::{DeliveryTarget, Registry, SubscriptionReceiver};
use crate::router::{self, Route};
use crate::session::{FrameWriter, Session};
use crate::state::{ConnectionState, InternalState};
use crate::stats::{Counters, StreamStats};
use crate::subscription::{Subscription, SubscriptionKey};
use crate::transport::{Connector, WsConnector};

/// 락으로 보호되는 상태.
pub(crate) struct Inner {
    pub state: InternalState,
    pub registry: Registry,
    pub session: Option<Session>,
    pub supervisor: Option<Supervisor>,
}

impl Inner {
    /// 연결 상태일 때만 송신 핸들을 반환합니다.
    fn writer(&self) -> Option<FrameWriter> {
        if !self.state.state.is_connected() {
            return None;
        }
        self.session.as_ref().map(|s| s.writer.clone())
    }
}

/// 관리자 핸들과 백그라운드 태스크가 공유하는 상태.
pub(crate) struct Shared {
    pub url: String,
    pub config: ConnectionConfig,
    pub inner: RwLock<Inner>,
    pub counters: Counters,
    connector: Arc<dyn Connector>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl Shared {
    pub fn emit(&self, event: ConnectionEvent) {
        debug!(event = ?event, "연결 이벤트");
        // 수신자가 없으면 버림
        let _ = self.events.send(event);
    }

    /// 새 소켓을 열고 세션을 시작한 뒤 레지스트리를 재생합니다.
    ///
    /// 다이얼 도중 상태가 `expected`에서 바뀌면 (예: `disconnect()`) 새 소켓을 닫고 실패합니다.
    pub async fn establish(self: &Arc<Self>, expected: ConnectionState) -> StreamResult<()> {
        let dial_timeout = self.config.dial_timeout();
        let dial = timeout(dial_timeout, self.connector.connect(&self.url));
        let (mut sink, source) = match dial.await {
            Ok(result) => result?,
            Err(_) => {
                return Err(StreamError::Connection(format!(
                    "dial timed out after {}ms",
                    dial_timeout.as_millis()
                )))
            }
        };

        let mut inner = self.inner.write().await;
        if inner.state.state != expected {
            let current = inner.state.state;
            drop(inner);
            sink.close().await;
            return Err(StreamError::Connection(format!(
                "connection attempt aborted (state: {})",
                current
            )));
        }

        let session_id = inner.state.mark_connected();
        let session = Session::start(self, session_id, sink, source);
        let writer = session.writer.clone();
        inner.session = Some(session);

        // 재생이 끝날 때까지 구독 변경을 막음
        let inner = inner.downgrade();
        let mut frames: Vec<_> = inner
            .registry
            .subscriptions()
            .map(|s| (s.key(), subscribe_frame(s)))
            .collect();
        frames.sort_by(|a, b| a.0.cmp(&b.0));

        let mut replayed = 0;
        for (key, frame) in frames {
            let result = match frame {
                Ok(text) => writer.send(text).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => replayed += 1,
                Err(e) => warn!(key = %key, error = %e, "재구독 전송 실패"),
            }
        }

        info!(url = %self.url, session_id, replayed, "연결 완료");
        self.emit(match expected {
            ConnectionState::Reconnecting => ConnectionEvent::Reconnected {
                session_id,
                replayed,
            },
            _ => ConnectionEvent::Connected {
                session_id,
                replayed,
            },
        });
        drop(inner);

        Ok(())
    }

    /// 세션이 연결 끊김을 보고합니다.
    ///
    /// 현재 세션의 첫 보고만 처리되므로 재연결 태스크는 연결당 최대 하나입니다.
    pub async fn connection_lost(self: &Arc<Self>, session_id: u64, reason: String) {
        let mut inner = self.inner.write().await;
        if !inner.state.state.is_connected() || inner.state.session_id != session_id {
            debug!(session_id, reason = %reason, "이전 세션의 끊김 보고 무시");
            return;
        }

        let session = inner.session.take();
        if let Some(session) = &session {
            session.cancel();
        }

        warn!(session_id, reason = %reason, "연결이 끊겼습니다");
        self.emit(ConnectionEvent::ConnectionLost { reason });

        if self.config.reconnect_enabled {
            inner.state.mark_reconnecting();
            inner.supervisor = Some(reconnect::spawn(self.clone(), session));
        } else {
            inner.state.mark_disconnected();
            // 다음 connect()/disconnect()가 태스크 종료를 기다림
            inner.session = session;
            info!("자동 재연결이 비활성화되어 있습니다");
        }
    }

    /// 수신 프레임 하나를 처리합니다.
    pub async fn dispatch(&self, text: &str) {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                Counters::incr(&self.counters.decode_errors);
                warn!(error = %e, "수신 프레임 디코딩 실패");
                return;
            }
        };

        let route = {
            let inner = self.inner.read().await;
            router::resolve(&frame, &inner.registry)
        };

        match route {
            Route::Pong => {
                self.inner.write().await.state.record_pong();
                debug!("pong 수신");
            }
            Route::Deliver { key, target } => {
                router::deliver(&key, &target, frame.data, &self.counters)
            }
            Route::Unrouted => router::record_unrouted(&frame, &self.counters),
        }
    }

    /// ping 전송을 기록합니다. 세션이 더 이상 현재 연결이 아니면 `false`.
    pub async fn record_ping(&self, session_id: u64) -> bool {
        let mut inner = self.inner.write().await;
        if !inner.state.state.is_connected() || inner.state.session_id != session_id {
            return false;
        }
        inner.state.record_ping();
        true
    }

    /// 현재 세션이 pong을 기다리는 중인지 확인.
    pub async fn pong_overdue(&self, session_id: u64) -> bool {
        let inner = self.inner.read().await;
        inner.state.state.is_connected()
            && inner.state.session_id == session_id
            && inner.state.awaiting_pong
    }
}

/// 다중화 스트리밍 연결 관리자.
///
/// 복제 비용이 낮은 핸들이며 모든 복제본이 같은 연결을 공유합니다.
///
/// # 예제
///
/// ```no_run
/// use hyperfeed_core::config::{ConnectionConfig, MAINNET_WS_URL};
/// use hyperfeed_stream::{DeliveryTarget, StreamManager, Subscription};
///
/// # async fn run() -> anyhow::Result<()> {
/// let manager = StreamManager::new(MAINNET_WS_URL, ConnectionConfig::default())?;
/// manager.connect().await?;
///
/// let (target, mut trades) = DeliveryTarget::queue(100);
/// manager.subscribe(Subscription::trades("BTC"), target).await?;
///
/// while let Some(payload) = trades.recv().await {
///     println!("{}", payload);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct StreamManager {
    shared: Arc<Shared>,
}

impl StreamManager {
    /// WebSocket 커넥터로 관리자를 생성합니다. 연결은 `connect()`에서 수립됩니다.
    ///
    /// 연결 설정이 유효하지 않으면 (예: ping 주기 0) `CoreError::InvalidConfig`.
    pub fn new(url: impl Into<String>, config: ConnectionConfig) -> CoreResult<Self> {
        Self::with_connector(url, config, Arc::new(WsConnector::new()))
    }

    /// 지정한 커넥터로 관리자를 생성합니다.
    pub fn with_connector(
        url: impl Into<String>,
        config: ConnectionConfig,
        connector: Arc<dyn Connector>,
    ) -> CoreResult<Self> {
        config.validate()?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let shared = Shared {
            url: url.into(),
            config,
            inner: RwLock::new(Inner {
                state: InternalState::default(),
                registry: Registry::default(),
                session: None,
                supervisor: None,
            }),
            counters: Counters::default(),
            connector,
            events,
        };
        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    /// 설정 파일 값으로 관리자를 생성합니다.
    pub fn from_config(config: &FeedConfig) -> CoreResult<Self> {
        config.validate()?;
        Self::new(config.ws_url(), config.connection.clone())
    }

    /// 접속 URL.
    pub fn url(&self) -> &str {
        &self.shared.url
    }

    /// 연결 설정.
    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    /// 연결을 수립합니다.
    ///
    /// 이미 연결되었거나 연결/재연결 중이면 `AlreadyConnected`.
    /// 성공하면 레지스트리에 남아 있는 구독을 모두 재전송합니다.
    pub async fn connect(&self) -> StreamResult<()> {
        let (stale_supervisor, stale_session) = {
            let mut inner = self.shared.inner.write().await;
            if !inner.state.state.is_inactive() {
                return Err(StreamError::AlreadyConnected);
            }
            inner.state.mark_connecting();
            (inner.supervisor.take(), inner.session.take())
        };
        // 재시도를 소진한 재연결 태스크, 재연결 없이 끊긴 세션
        if let Some(supervisor) = stale_supervisor {
            supervisor.shutdown().await;
        }
        if let Some(session) = stale_session {
            session.shutdown().await;
        }

        info!(url = %self.shared.url, "연결 중");

        match self.shared.establish(ConnectionState::Connecting).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let mut inner = self.shared.inner.write().await;
                if inner.state.state == ConnectionState::Connecting {
                    inner.state.mark_disconnected();
                }
                warn!(url = %self.shared.url, error = %e, "연결 실패");
                Err(e)
            }
        }
    }

    /// 연결을 종료합니다.
    ///
    /// 모든 백그라운드 태스크가 종료될 때까지 기다리며, 레지스트리를 비워
    /// 큐 구독의 수신 측을 닫습니다. 여러 번 호출해도 안전합니다.
    pub async fn disconnect(&self) -> StreamResult<()> {
        let (session, supervisor, cleared) = {
            let mut inner = self.shared.inner.write().await;
            if inner.state.state == ConnectionState::Closed {
                return Ok(());
            }
            inner.state.mark_closed();
            let cleared = inner.registry.len();
            inner.registry.clear();
            (inner.session.take(), inner.supervisor.take(), cleared)
        };

        if let Some(supervisor) = supervisor {
            supervisor.shutdown().await;
        }
        if let Some(session) = session {
            session.shutdown().await;
        }

        info!(url = %self.shared.url, cleared, "연결 종료");
        self.shared.emit(ConnectionEvent::Closed);
        Ok(())
    }

    /// 구독을 등록하고 구독 요청을 전송합니다.
    ///
    /// 같은 정규 키의 구독이 이미 있으면 경고와 함께 전달 대상만 교체하고
    /// 요청은 다시 보내지 않습니다. 새 구독의 전송이 실패하면 등록을 취소하고
    /// `Transport` 에러를 반환합니다.
    pub async fn subscribe(
        &self,
        subscription: Subscription,
        target: DeliveryTarget,
    ) -> StreamResult<SubscriptionKey> {
        subscription.validate()?;
        let key = subscription.key();
        let span = stream_span!("subscribe", key);

        async move {
            let frame = subscribe_frame(&subscription)?;

            let mut inner = self.shared.inner.write().await;
            let writer = inner.writer().ok_or(StreamError::NotConnected)?;
            if inner.registry.insert(subscription, target).is_some() {
                // 서버 쪽 구독은 그대로 유지됨
                drop(inner);
                info!("구독 전달 대상 교체");
                return Ok(key);
            }

            if let Err(e) = writer.send(frame).await {
                inner.registry.remove(key.as_str());
                warn!(error = %e, "구독 요청 전송 실패, 등록을 취소합니다");
                return Err(e);
            }
            drop(inner);

            info!("구독 등록");
            Ok(key)
        }
        .instrument(span)
        .await
    }

    /// 구독을 해제합니다.
    ///
    /// 해제 요청 전송은 최선 노력이며, 실패해도 항목은 제거됩니다.
    pub async fn unsubscribe(&self, key: &str) -> StreamResult<()> {
        let span = stream_span!("unsubscribe", key);

        async move {
            let mut inner = self.shared.inner.write().await;
            let entry = inner
                .registry
                .get(key)
                .ok_or_else(|| StreamError::NotFound(key.to_string()))?;
            let frame = unsubscribe_frame(&entry.subscription);

            if let Some(writer) = inner.writer() {
                let sent = match frame {
                    Ok(text) => writer.send(text).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = sent {
                    warn!(error = %e, "구독 해제 요청 전송 실패");
                }
            }

            inner.registry.remove(key);
            drop(inner);

            info!("구독 해제");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// 지정한 용량의 큐로 구독합니다.
    pub async fn subscribe_queue_with_capacity(
        &self,
        subscription: Subscription,
        capacity: usize,
    ) -> StreamResult<(SubscriptionKey, SubscriptionReceiver)> {
        let (target, rx) = DeliveryTarget::queue(capacity);
        let key = self.subscribe(subscription, target).await?;
        Ok((key, rx))
    }

    /// 기본 용량(`default_queue_capacity`)의 큐로 구독합니다.
    pub async fn subscribe_queue(
        &self,
        subscription: Subscription,
    ) -> StreamResult<(SubscriptionKey, SubscriptionReceiver)> {
        let capacity = self.shared.config.default_queue_capacity;
        self.subscribe_queue_with_capacity(subscription, capacity)
            .await
    }

    /// 콜백으로 구독합니다.
    pub async fn subscribe_callback<F>(
        &self,
        subscription: Subscription,
        handler: F,
    ) -> StreamResult<SubscriptionKey>
    where
        F: Fn(&serde_json::Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(subscription, DeliveryTarget::callback(handler))
            .await
    }

    /// 전체 코인 중간가 구독.
    pub async fn subscribe_all_mids(
        &self,
        target: DeliveryTarget,
    ) -> StreamResult<SubscriptionKey> {
        self.subscribe(Subscription::all_mids(), target).await
    }

    /// 체결 구독.
    pub async fn subscribe_trades(
        &self,
        coin: impl Into<String>,
        target: DeliveryTarget,
    ) -> StreamResult<SubscriptionKey> {
        self.subscribe(Subscription::trades(coin), target).await
    }

    /// L2 호가 구독.
    pub async fn subscribe_l2_book(
        &self,
        coin: impl Into<String>,
        target: DeliveryTarget,
    ) -> StreamResult<SubscriptionKey> {
        self.subscribe(Subscription::l2_book(coin), target).await
    }

    /// 캔들 구독.
    pub async fn subscribe_candles(
        &self,
        coin: impl Into<String>,
        interval: impl Into<String>,
        target: DeliveryTarget,
    ) -> StreamResult<SubscriptionKey> {
        self.subscribe(Subscription::candle(coin, interval), target)
            .await
    }

    /// 주문 상태 변경 구독.
    pub async fn subscribe_order_updates(
        &self,
        user: impl Into<String>,
        target: DeliveryTarget,
    ) -> StreamResult<SubscriptionKey> {
        self.subscribe(Subscription::order_updates(user), target)
            .await
    }

    /// 사용자 이벤트 구독.
    pub async fn subscribe_user_events(
        &self,
        user: impl Into<String>,
        target: DeliveryTarget,
    ) -> StreamResult<SubscriptionKey> {
        self.subscribe(Subscription::user_events(user), target).await
    }

    /// 사용자 체결 구독.
    pub async fn subscribe_user_fills(
        &self,
        user: impl Into<String>,
        target: DeliveryTarget,
    ) -> StreamResult<SubscriptionKey> {
        self.subscribe(Subscription::user_fills(user), target).await
    }

    /// 사용자 펀딩 구독.
    pub async fn subscribe_user_fundings(
        &self,
        user: impl Into<String>,
        target: DeliveryTarget,
    ) -> StreamResult<SubscriptionKey> {
        self.subscribe(Subscription::user_fundings(user), target)
            .await
    }

    /// 청산 구독. 사용자를 지정하지 않으면 전체 청산을 받습니다.
    pub async fn subscribe_liquidations(
        &self,
        user: Option<String>,
        target: DeliveryTarget,
    ) -> StreamResult<SubscriptionKey> {
        self.subscribe(Subscription::liquidations(user), target)
            .await
    }

    /// 연결 여부.
    pub async fn is_connected(&self) -> bool {
        self.shared.inner.read().await.state.state.is_connected()
    }

    /// 현재 연결 상태.
    pub async fn state(&self) -> ConnectionState {
        self.shared.inner.read().await.state.state
    }

    /// 통계 스냅샷.
    pub async fn stats(&self) -> StreamStats {
        let inner = self.shared.inner.read().await;
        let counters = &self.shared.counters;

        StreamStats {
            connected: inner.state.state.is_connected(),
            state: inner.state.state,
            reconnect_attempts: inner.state.reconnect_attempts,
            total_reconnects: inner.state.total_reconnects,
            subscriptions: inner.registry.len(),
            subscription_keys: inner.registry.keys(),
            messages_sent: Counters::get(&counters.messages_sent),
            messages_received: Counters::get(&counters.messages_received),
            dropped_messages: Counters::get(&counters.dropped_messages),
            decode_errors: Counters::get(&counters.decode_errors),
            handler_errors: Counters::get(&counters.handler_errors),
            unrouted_messages: Counters::get(&counters.unrouted_messages),
            probe_timeouts: Counters::get(&counters.probe_timeouts),
            connected_since: inner.state.connected_since,
            last_ping: inner.state.last_ping,
            last_pong: inner.state.last_pong,
        }
    }

    /// 생명주기 이벤트 수신자를 생성합니다.
    ///
    /// 생성 이후에 발행된 이벤트만 받습니다.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events.subscribe()
    }
}

impl std::fmt::Debug for StreamManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamManager")
            .field("url", &self.shared.url)
            .finish_non_exhaustive()
    }
}

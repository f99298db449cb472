//! 연결/라우팅 통계.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;

use crate::state::ConnectionState;
use crate::subscription::SubscriptionKey;

/// 백그라운드 태스크가 락 없이 갱신하는 카운터.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
    pub dropped_messages: AtomicU64,
    pub decode_errors: AtomicU64,
    pub handler_errors: AtomicU64,
    pub unrouted_messages: AtomicU64,
    pub probe_timeouts: AtomicU64,
}

impl Counters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// 특정 시점의 통계 스냅샷.
///
/// 값 복사본이므로 호출자가 갱신 중인 상태를 관찰할 수 없습니다.
#[derive(Debug, Clone)]
pub struct StreamStats {
    /// 연결 여부
    pub connected: bool,
    /// 현재 연결 상태
    pub state: ConnectionState,
    /// 현재 연속 재연결 시도 횟수
    pub reconnect_attempts: u32,
    /// 재연결 성공 누적 횟수
    pub total_reconnects: u64,
    /// 활성 구독 수
    pub subscriptions: usize,
    /// 활성 구독 키 목록 (정렬됨)
    pub subscription_keys: Vec<SubscriptionKey>,
    /// 송신 프레임 수
    pub messages_sent: u64,
    /// 수신 프레임 수
    pub messages_received: u64,
    /// 큐가 가득 차서 버려진 메시지 수
    pub dropped_messages: u64,
    /// 디코딩 실패 프레임 수
    pub decode_errors: u64,
    /// 콜백 에러 수
    pub handler_errors: u64,
    /// 구독자가 없어 버려진 프레임 수
    pub unrouted_messages: u64,
    /// pong 타임아웃 횟수
    pub probe_timeouts: u64,
    /// 현재 연결 수립 시각
    pub connected_since: Option<DateTime<Utc>>,
    /// 마지막 ping 전송 시각
    pub last_ping: Option<Instant>,
    /// 마지막 pong 수신 시각
    pub last_pong: Option<Instant>,
}

impl StreamStats {
    /// 통계 요약 로그 출력
    pub fn log_summary(&self) {
        tracing::info!(
            state = %self.state,
            subscriptions = self.subscriptions,
            reconnect_attempts = self.reconnect_attempts,
            total_reconnects = self.total_reconnects,
            sent = self.messages_sent,
            received = self.messages_received,
            dropped = self.dropped_messages,
            decode_errors = self.decode_errors,
            handler_errors = self.handler_errors,
            probe_timeouts = self.probe_timeouts,
            "스트림 통계"
        );
    }
}

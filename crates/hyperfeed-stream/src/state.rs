//! 연결 상태 머신.
//!
//! ```text
//! Disconnected ──connect──> Connecting ──성공──> Connected
//!      ↑                        │                 │
//!      └────────실패────────────┘           연결 끊김/pong 타임아웃
//!      ↑                                          ↓
//!      └──────재시도 소진────── Reconnecting <──────┘
//!                                  │   ↑
//!                                  └───┘ 재시도
//! 어느 상태에서든 disconnect ──> Closed
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// 연결 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// 연결되지 않음 (초기 상태 또는 재연결 소진)
    Disconnected,
    /// 연결 수립 중
    Connecting,
    /// 연결됨
    Connected,
    /// 재연결 시도 중
    Reconnecting,
    /// 호출자가 명시적으로 연결 종료
    Closed,
}

impl ConnectionState {
    /// 연결 활성 여부.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// 전이 중인 상태인지 확인.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }

    /// 새 `connect` 호출을 받을 수 있는 상태인지 확인.
    pub fn is_inactive(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Closed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Reconnecting => write!(f, "Reconnecting"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// 연결 관리자 내부 상태 추적.
#[derive(Debug)]
pub(crate) struct InternalState {
    /// 현재 연결 상태
    pub state: ConnectionState,
    /// 현재 연결 세션 번호 (연결 성공마다 증가)
    pub session_id: u64,
    /// 연속 재연결 시도 횟수 (연결 성공 시 0으로 초기화)
    pub reconnect_attempts: u32,
    /// 재연결 성공 누적 횟수
    pub total_reconnects: u64,
    /// 마지막 연결 성공 시각
    pub connected_since: Option<DateTime<Utc>>,
    /// 마지막 ping 전송 시각
    pub last_ping: Option<Instant>,
    /// 마지막 pong 수신 시각
    pub last_pong: Option<Instant>,
    /// pong 대기 중 여부
    pub awaiting_pong: bool,
}

impl Default for InternalState {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            session_id: 0,
            reconnect_attempts: 0,
            total_reconnects: 0,
            connected_since: None,
            last_ping: None,
            last_pong: None,
            awaiting_pong: false,
        }
    }
}

impl InternalState {
    /// 연결 시도 시작.
    pub fn mark_connecting(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// 연결 성공 처리. 새 세션 번호를 반환합니다.
    pub fn mark_connected(&mut self) -> u64 {
        if self.state == ConnectionState::Reconnecting {
            self.total_reconnects += 1;
        }
        self.state = ConnectionState::Connected;
        self.session_id += 1;
        self.reconnect_attempts = 0;
        self.connected_since = Some(Utc::now());
        self.awaiting_pong = false;
        self.session_id
    }

    /// 연결 해제 처리 (재연결하지 않음).
    pub fn mark_disconnected(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.connected_since = None;
        self.awaiting_pong = false;
    }

    /// 재연결 대기 상태로 전이.
    pub fn mark_reconnecting(&mut self) {
        self.state = ConnectionState::Reconnecting;
        self.connected_since = None;
        self.awaiting_pong = false;
    }

    /// 재연결 시도 횟수를 기록합니다.
    pub fn record_reconnect_attempt(&mut self) -> u32 {
        self.reconnect_attempts += 1;
        self.reconnect_attempts
    }

    /// 명시적 종료 처리.
    pub fn mark_closed(&mut self) {
        self.state = ConnectionState::Closed;
        self.connected_since = None;
        self.awaiting_pong = false;
    }

    /// ping 전송 기록.
    pub fn record_ping(&mut self) {
        self.last_ping = Some(Instant::now());
        self.awaiting_pong = true;
    }

    /// pong 수신 기록.
    pub fn record_pong(&mut self) {
        self.last_pong = Some(Instant::now());
        self.awaiting_pong = false;
    }
}

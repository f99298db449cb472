//! 연결 생명주기 이벤트.

use serde::Serialize;

/// 이벤트 채널 용량. 느린 수신자는 오래된 이벤트를 놓칩니다 (`RecvError::Lagged`).
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 64;

/// 연결 관리자가 발행하는 생명주기 이벤트.
///
/// [`StreamManager::events`](crate::StreamManager::events)로 구독합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ConnectionEvent {
    /// `connect()`로 연결됨
    Connected {
        session_id: u64,
        /// 재전송된 구독 수
        replayed: usize,
    },
    /// 연결이 끊김 (읽기 에러, 서버 종료, pong 타임아웃)
    ConnectionLost { reason: String },
    /// 재연결 시도 시작
    Reconnecting { attempt: u32, max_attempts: u32 },
    /// 재연결 성공
    Reconnected { session_id: u64, replayed: usize },
    /// 재연결 시도 소진. 더 이상 자동 복구하지 않습니다.
    ReconnectFailed { attempts: u32 },
    /// `disconnect()`로 종료됨
    Closed,
}

impl ConnectionEvent {
    /// 연결 수립 이벤트인지 확인.
    pub fn is_established(&self) -> bool {
        matches!(self, Self::Connected { .. } | Self::Reconnected { .. })
    }

    /// 더 이상 자동 복구가 없는 종료 이벤트인지 확인.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ReconnectFailed { .. } | Self::Closed)
    }
}

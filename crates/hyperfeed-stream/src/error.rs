//! 스트림 연결 관리자 에러 타입.

use thiserror::Error;

/// 연결/구독 관리 에러.
#[derive(Debug, Error)]
pub enum StreamError {
    /// 연결 수립(dial/handshake) 실패
    #[error("Connection error: {0}")]
    Connection(String),

    /// 수립된 연결에서 프레임 전송 실패
    #[error("Transport error: {0}")]
    Transport(String),

    /// 연결되지 않은 상태에서 요청
    #[error("Not connected")]
    NotConnected,

    /// 이미 연결된(또는 연결 중인) 상태에서 연결 요청
    #[error("Already connected")]
    AlreadyConnected,

    /// 등록되지 않은 구독 키
    #[error("Subscription not found: {0}")]
    NotFound(String),

    /// 수신 프레임/페이로드 디코딩 실패
    #[error("Decode error: {0}")]
    Decode(String),

    /// 필수 파라미터가 빠진 구독 요청
    #[error("Invalid subscription: {0}")]
    InvalidSubscription(String),
}

/// 스트림 작업을 위한 Result 타입.
pub type StreamResult<T> = Result<T, StreamError>;

impl StreamError {
    /// 재연결로 복구될 수 있는 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StreamError::Connection(_) | StreamError::Transport(_))
    }

    /// 호출 순서/상태 위반 에러인지 확인 (재시도 대상 아님).
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            StreamError::NotConnected
                | StreamError::AlreadyConnected
                | StreamError::NotFound(_)
                | StreamError::InvalidSubscription(_)
        )
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Decode(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for StreamError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        StreamError::Transport(err.to_string())
    }
}

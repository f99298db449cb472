//! 다중화 스트리밍 연결 관리자.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - StreamManager: 연결 생명주기, 구독 등록/해제, 통계
//! - 구독 레지스트리와 메시지 라우터 (콜백/유한 큐 전달)
//! - ping/pong 연결 유지와 pong 타임아웃 감지
//! - 고정 지연 재연결과 레지스트리 기반 재구독
//! - Connector trait: 교체 가능한 전송 계층 (기본: WebSocket)

pub mod error;
pub mod event;
pub mod frame;
pub mod manager;
pub mod registry;
pub mod state;
pub mod stats;
pub mod subscription;
pub mod transport;

mod keepalive;
mod reconnect;
mod router;
mod session;

pub use error::*;
pub use event::ConnectionEvent;
pub use frame::{decode_payload, InboundFrame};
pub use hyperfeed_core::config::{MAINNET_WS_URL, TESTNET_WS_URL};
pub use manager::StreamManager;
pub use registry::{DeliveryTarget, MessageHandler, SubscriptionReceiver};
pub use state::ConnectionState;
pub use stats::StreamStats;
pub use subscription::{kind, Subscription, SubscriptionKey, SubscriptionParams};
pub use transport::{BoxedSink, BoxedSource, Connector, FrameSink, FrameSource, WsConnector};

//! 전송 계층 추상화.
//!
//! 연결 관리자는 소켓을 직접 다루지 않고 [`Connector`]가 돌려주는
//! 송신/수신 반쪽만 사용합니다. 기본 구현은 tokio-tungstenite 기반 WebSocket입니다.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::error::{StreamError, StreamResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 연결의 송신 반쪽.
#[async_trait]
pub trait FrameSink: Send {
    /// 텍스트 프레임을 전송합니다.
    async fn send_text(&mut self, text: String) -> StreamResult<()>;

    /// 연결을 닫습니다.
    async fn close(&mut self);
}

/// 연결의 수신 반쪽.
#[async_trait]
pub trait FrameSource: Send {
    /// 다음 텍스트 프레임을 반환합니다.
    ///
    /// - `Some(Ok(text))`: 수신 프레임
    /// - `Some(Err(StreamError::Decode(_)))`: 해석할 수 없는 프레임 (연결은 유지)
    /// - `Some(Err(_))`: 전송 에러 (연결 종료로 간주)
    /// - `None`: 스트림 종료
    async fn next_frame(&mut self) -> Option<StreamResult<String>>;
}

/// 송신 반쪽 박스 타입.
pub type BoxedSink = Box<dyn FrameSink>;

/// 수신 반쪽 박스 타입.
pub type BoxedSource = Box<dyn FrameSource>;

/// 새 연결을 수립하는 팩토리.
#[async_trait]
pub trait Connector: Send + Sync {
    /// URL에 연결합니다. 실패는 `StreamError::Connection`으로 보고합니다.
    async fn connect(&self, url: &str) -> StreamResult<(BoxedSink, BoxedSource)>;
}

/// tokio-tungstenite 기반 WebSocket 커넥터.
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

impl WsConnector {
    /// 새 커넥터를 생성합니다.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> StreamResult<(BoxedSink, BoxedSource)> {
        debug!(url = url, "WebSocket 핸드셰이크 시작");

        let (ws_stream, response) = connect_async(url)
            .await
            .map_err(|e| StreamError::Connection(e.to_string()))?;

        info!(url = url, status = %response.status(), "WebSocket 연결 수립");

        let (sink, stream) = ws_stream.split();
        Ok((Box::new(WsSink { sink }), Box::new(WsSource { stream })))
    }
}

struct WsSink {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> StreamResult<()> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(StreamError::from)
    }

    async fn close(&mut self) {
        if let Err(e) = self.sink.close().await {
            debug!(error = %e, "WebSocket 종료 중 에러");
        }
    }
}

struct WsSource {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn next_frame(&mut self) -> Option<StreamResult<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => {
                    return Some(
                        String::from_utf8(bytes)
                            .map_err(|e| StreamError::Decode(format!("binary frame: {}", e))),
                    );
                }
                // 제어 프레임 응답은 tungstenite가 처리
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Ok(Message::Close(frame)) => {
                    debug!(frame = ?frame, "서버에서 연결 종료 요청");
                    return None;
                }
                Err(e) => return Some(Err(StreamError::from(e))),
            }
        }
    }
}

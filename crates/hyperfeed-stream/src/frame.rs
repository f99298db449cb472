//! 와이어 프레임 인코딩/디코딩.
//!
//! 모든 프레임은 JSON 텍스트 메시지입니다.
//!
//! - 송신 구독: `{"method":"subscribe","subscription":{"type":..,"coin"?:..}}`
//! - 송신 해제: `{"method":"unsubscribe","subscription":{..}}`
//! - 송신 ping: `{"method":"ping"}`
//! - 수신: `{"channel":<topic>,"data":<json>}`

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StreamError, StreamResult};
use crate::subscription::Subscription;

/// ping 응답 채널. 구독자에게 라우팅되지 않습니다.
pub const PONG_CHANNEL: &str = "pong";

/// 구독 요청 응답 채널.
pub const SUBSCRIPTION_RESPONSE_CHANNEL: &str = "subscriptionResponse";

/// 서버 에러 알림 채널.
pub const ERROR_CHANNEL: &str = "error";

/// 송신 메서드.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// 구독 등록
    Subscribe,
    /// 구독 해제
    Unsubscribe,
    /// 연결 확인
    Ping,
}

#[derive(Debug, Serialize)]
struct WsRequest<'a> {
    method: Method,
    #[serde(skip_serializing_if = "Option::is_none")]
    subscription: Option<&'a Subscription>,
}

/// 구독 프레임을 생성합니다.
pub fn subscribe_frame(subscription: &Subscription) -> StreamResult<String> {
    encode(Method::Subscribe, Some(subscription))
}

/// 구독 해제 프레임을 생성합니다.
pub fn unsubscribe_frame(subscription: &Subscription) -> StreamResult<String> {
    encode(Method::Unsubscribe, Some(subscription))
}

/// ping 프레임을 생성합니다.
pub fn ping_frame() -> StreamResult<String> {
    encode(Method::Ping, None)
}

fn encode(method: Method, subscription: Option<&Subscription>) -> StreamResult<String> {
    let request = WsRequest {
        method,
        subscription,
    };
    serde_json::to_string(&request).map_err(StreamError::from)
}

/// 수신 프레임.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    /// 라우팅에 사용되는 토픽
    pub channel: String,
    /// 불투명 페이로드
    #[serde(default)]
    pub data: Value,
}

impl InboundFrame {
    /// 텍스트 프레임을 파싱합니다.
    pub fn parse(text: &str) -> StreamResult<Self> {
        serde_json::from_str(text).map_err(StreamError::from)
    }

    /// ping 응답 여부.
    pub fn is_pong(&self) -> bool {
        self.channel == PONG_CHANNEL
    }
}

/// 불투명 페이로드를 호출자 타입으로 디코딩합니다.
///
/// ```
/// use hyperfeed_stream::decode_payload;
/// use std::collections::HashMap;
///
/// let payload = serde_json::json!({"mids": {"BTC": "97000.5"}});
/// #[derive(serde::Deserialize)]
/// struct AllMids { mids: HashMap<String, String> }
///
/// let mids: AllMids = decode_payload(&payload).unwrap();
/// assert_eq!(mids.mids["BTC"], "97000.5");
/// ```
pub fn decode_payload<T: DeserializeOwned>(payload: &Value) -> StreamResult<T> {
    T::deserialize(payload).map_err(StreamError::from)
}

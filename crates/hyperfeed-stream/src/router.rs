//! 수신 프레임 라우팅.
//!
//! 프레임의 채널은 구독 시 사용한 것과 같은 정규 키 형식이어야 하며,
//! 정확히 일치하는 구독에만 전달됩니다. 일치하는 구독이 없는 프레임
//! (`pong`, `subscriptionResponse`, 토픽만으로 키를 복원할 수 없는 종류)은 버려지며
//! 에러로 취급하지 않습니다.

use serde_json::Value;
use tracing::{debug, warn};

use crate::frame::{InboundFrame, ERROR_CHANNEL, SUBSCRIPTION_RESPONSE_CHANNEL};
use crate::registry::{Delivery, DeliveryTarget, Registry};
use crate::stats::Counters;
use crate::subscription::SubscriptionKey;

/// 라우팅 결정.
#[derive(Debug)]
pub(crate) enum Route {
    /// ping 응답 (keepalive가 소비)
    Pong,
    /// 구독자에게 전달
    Deliver {
        key: SubscriptionKey,
        target: DeliveryTarget,
    },
    /// 일치하는 구독 없음
    Unrouted,
}

/// 채널과 레지스트리만으로 라우팅 대상을 결정합니다.
///
/// 전달 대상은 복제해서 반환하므로 호출자는 락을 놓은 뒤 전달할 수 있습니다.
pub(crate) fn resolve(frame: &InboundFrame, registry: &Registry) -> Route {
    if frame.is_pong() {
        return Route::Pong;
    }

    match registry.get(&frame.channel) {
        Some(entry) => Route::Deliver {
            key: entry.subscription.key(),
            target: entry.target.clone(),
        },
        None => Route::Unrouted,
    }
}

/// 결정된 대상에 페이로드를 전달하고 결과를 카운터에 반영합니다.
///
/// 콜백 에러나 가득 찬 큐는 다른 구독의 디스패치를 막지 않습니다.
pub(crate) fn deliver(
    key: &SubscriptionKey,
    target: &DeliveryTarget,
    payload: Value,
    counters: &Counters,
) {
    match target.deliver(payload) {
        Delivery::Delivered => {}
        Delivery::Dropped => {
            Counters::incr(&counters.dropped_messages);
            debug!(key = %key, "구독 큐가 가득 차서 메시지를 버립니다");
        }
        Delivery::Closed => {
            debug!(key = %key, "구독 큐 수신 측이 닫혀 있습니다");
        }
        Delivery::HandlerFailed(e) => {
            Counters::incr(&counters.handler_errors);
            warn!(key = %key, error = %e, "구독 콜백 에러");
        }
    }
}

/// 라우팅되지 않은 프레임을 기록합니다.
pub(crate) fn record_unrouted(frame: &InboundFrame, counters: &Counters) {
    Counters::incr(&counters.unrouted_messages);
    match frame.channel.as_str() {
        SUBSCRIPTION_RESPONSE_CHANNEL => debug!(data = %frame.data, "구독 응답 수신"),
        ERROR_CHANNEL => warn!(data = %frame.data, "서버 에러 프레임 수신"),
        channel => debug!(channel = channel, "구독자가 없는 채널"),
    }
}

//! 구독 레지스트리와 전달 대상.
//!
//! 레지스트리는 "무엇이 구독되어 있어야 하는가"의 유일한 기준입니다.
//! 재연결 후 재구독도 과거 프레임 기록이 아니라 레지스트리에서 재생합니다.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::subscription::{Subscription, SubscriptionKey};

/// 구독 콜백. 메시지마다 디스패치 태스크에서 동기적으로 호출됩니다.
pub type MessageHandler = Arc<dyn Fn(&Value) -> anyhow::Result<()> + Send + Sync>;

/// 큐 기반 구독의 수신 측.
///
/// 구독이 해제되거나 연결이 종료되면 남은 메시지를 모두 받은 뒤 `None`을 반환합니다.
pub type SubscriptionReceiver = mpsc::Receiver<Value>;

/// 구독 메시지 전달 대상.
#[derive(Clone)]
pub enum DeliveryTarget {
    /// 메시지마다 호출되는 콜백
    Callback(MessageHandler),
    /// 호출자가 비우는 유한 큐 (가득 차면 새 메시지를 버림)
    Queue(mpsc::Sender<Value>),
}

/// 단일 메시지 전달 결과.
#[derive(Debug)]
pub(crate) enum Delivery {
    /// 전달 완료
    Delivered,
    /// 큐가 가득 차서 버림
    Dropped,
    /// 수신 측이 이미 닫힘
    Closed,
    /// 콜백이 에러 반환
    HandlerFailed(anyhow::Error),
}

impl DeliveryTarget {
    /// 콜백 전달 대상을 생성합니다.
    pub fn callback<F>(handler: F) -> Self
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        DeliveryTarget::Callback(Arc::new(handler))
    }

    /// 지정한 용량의 큐 전달 대상과 수신 측을 생성합니다.
    pub fn queue(capacity: usize) -> (Self, SubscriptionReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (DeliveryTarget::Queue(tx), rx)
    }

    /// 메시지를 전달합니다. 큐에 대해서는 절대 블로킹하지 않습니다.
    pub(crate) fn deliver(&self, payload: Value) -> Delivery {
        match self {
            DeliveryTarget::Callback(handler) => match handler(&payload) {
                Ok(()) => Delivery::Delivered,
                Err(e) => Delivery::HandlerFailed(e),
            },
            DeliveryTarget::Queue(tx) => match tx.try_send(payload) {
                Ok(()) => Delivery::Delivered,
                Err(mpsc::error::TrySendError::Full(_)) => Delivery::Dropped,
                Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
            },
        }
    }

    fn variant_name(&self) -> &'static str {
        match self {
            DeliveryTarget::Callback(_) => "callback",
            DeliveryTarget::Queue(_) => "queue",
        }
    }
}

impl fmt::Debug for DeliveryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryTarget::Callback(_) => f.write_str("Callback(..)"),
            DeliveryTarget::Queue(tx) => f
                .debug_struct("Queue")
                .field("capacity", &tx.max_capacity())
                .field("available", &tx.capacity())
                .finish(),
        }
    }
}

/// 등록된 구독 항목.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub subscription: Subscription,
    pub target: DeliveryTarget,
}

/// 정규 키 → 구독 매핑. 키당 최대 한 개의 항목만 존재합니다.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    entries: HashMap<SubscriptionKey, Entry>,
}

impl Registry {
    /// 항목을 등록합니다. 같은 키의 기존 항목이 있으면 교체하고 반환합니다.
    pub fn insert(&mut self, subscription: Subscription, target: DeliveryTarget) -> Option<Entry> {
        let key = subscription.key();
        let previous = self.entries.insert(
            key.clone(),
            Entry {
                subscription,
                target,
            },
        );
        if let Some(prev) = &previous {
            tracing::warn!(
                key = %key,
                previous_target = prev.target.variant_name(),
                "같은 키의 구독을 교체합니다"
            );
        }
        previous
    }

    /// 항목을 제거합니다.
    pub fn remove(&mut self, key: &str) -> Option<Entry> {
        self.entries.remove(key)
    }

    /// 항목을 조회합니다.
    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 모든 항목을 제거합니다. 큐 송신 측이 drop되어 수신 측이 닫힙니다.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// 정렬된 키 목록.
    pub fn keys(&self) -> Vec<SubscriptionKey> {
        let mut keys: Vec<_> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// 재구독용 구독 정의 목록.
    pub fn subscriptions(&self) -> impl Iterator<Item = &Subscription> {
        self.entries.values().map(|e| &e.subscription)
    }
}

//! 구독 정의와 정규 구독 키(canonical key) 도출.
//!
//! 구독의 식별자는 종류(kind)와 파라미터에서 결정적으로 도출되는 문자열입니다.
//! 같은 함수가 구독 등록, 재연결 후 재구독, 수신 프레임 라우팅에 모두 사용되므로
//! 키 형식이 바뀌면 라우팅과 재구독이 함께 깨집니다.
//!
//! | kind | key |
//! |---|---|
//! | `allMids` | `allMids` |
//! | `l2Book` | `l2Book:{coin}` |
//! | `trades` | `trades:{coin}` |
//! | `candle` | `candle:{coin}:{interval}` |
//! | `userEvents` / `orderUpdates` / `userFills` / `userFundings` | `{kind}:{user}` |
//! | 그 외 | `{kind}:{coin}` |

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

use crate::error::{StreamError, StreamResult};

/// 구독 종류 상수.
pub mod kind {
    /// 전체 코인 중간가
    pub const ALL_MIDS: &str = "allMids";
    /// L2 호가창
    pub const L2_BOOK: &str = "l2Book";
    /// 체결
    pub const TRADES: &str = "trades";
    /// 최우선 매수/매도 호가
    pub const BBO: &str = "bbo";
    /// 캔들
    pub const CANDLE: &str = "candle";
    /// 사용자 이벤트 (체결, 펀딩, 청산)
    pub const USER_EVENTS: &str = "userEvents";
    /// 주문 상태 업데이트
    pub const ORDER_UPDATES: &str = "orderUpdates";
    /// 사용자 체결
    pub const USER_FILLS: &str = "userFills";
    /// 사용자 펀딩 지급
    pub const USER_FUNDINGS: &str = "userFundings";
    /// 청산 이벤트
    pub const LIQUIDATIONS: &str = "liquidations";

    /// 사용자 주소로 키가 결정되는 종류.
    pub const USER_KEYED: [&str; 4] = [USER_EVENTS, ORDER_UPDATES, USER_FILLS, USER_FUNDINGS];

    /// 코인 파라미터가 반드시 필요한 종류.
    pub const COIN_REQUIRED: [&str; 4] = [L2_BOOK, TRADES, BBO, CANDLE];
}

/// 정규 구독 키.
///
/// 구독 핸들로 호출자에게 반환되며 `unsubscribe`에 그대로 전달합니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionKey(String);

impl SubscriptionKey {
    /// 키 문자열을 반환합니다.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for SubscriptionKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SubscriptionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SubscriptionKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SubscriptionKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// 구독 파라미터. 종류에 따라 각 필드는 선택적입니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionParams {
    /// 코인 심볼 (예: "BTC")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coin: Option<String>,
    /// 사용자 주소
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// 캔들 간격 (예: "1m", "1h")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

impl SubscriptionParams {
    /// 코인 파라미터를 설정합니다.
    pub fn with_coin(mut self, coin: impl Into<String>) -> Self {
        self.coin = Some(coin.into());
        self
    }

    /// 사용자 파라미터를 설정합니다.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// 간격 파라미터를 설정합니다.
    pub fn with_interval(mut self, interval: impl Into<String>) -> Self {
        self.interval = Some(interval.into());
        self
    }
}

/// 구독 요청. 와이어상의 `subscription` 객체와 같은 형태로 직렬화됩니다.
///
/// ```
/// use hyperfeed_stream::Subscription;
///
/// let sub = Subscription::candle("BTC", "1h");
/// assert_eq!(sub.key().as_str(), "candle:BTC:1h");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscription {
    /// 구독 종류
    #[serde(rename = "type")]
    pub kind: String,
    /// 구독 파라미터
    #[serde(flatten)]
    pub params: SubscriptionParams,
}

impl Subscription {
    /// 임의 종류의 구독을 생성합니다.
    pub fn new(kind: impl Into<String>, params: SubscriptionParams) -> Self {
        Self {
            kind: kind.into(),
            params,
        }
    }

    /// 전체 중간가 구독.
    pub fn all_mids() -> Self {
        Self::new(kind::ALL_MIDS, SubscriptionParams::default())
    }

    /// L2 호가창 구독.
    pub fn l2_book(coin: impl Into<String>) -> Self {
        Self::new(kind::L2_BOOK, SubscriptionParams::default().with_coin(coin))
    }

    /// 체결 구독.
    pub fn trades(coin: impl Into<String>) -> Self {
        Self::new(kind::TRADES, SubscriptionParams::default().with_coin(coin))
    }

    /// 최우선 호가 구독.
    pub fn bbo(coin: impl Into<String>) -> Self {
        Self::new(kind::BBO, SubscriptionParams::default().with_coin(coin))
    }

    /// 캔들 구독.
    pub fn candle(coin: impl Into<String>, interval: impl Into<String>) -> Self {
        Self::new(
            kind::CANDLE,
            SubscriptionParams::default()
                .with_coin(coin)
                .with_interval(interval),
        )
    }

    /// 주문 상태 업데이트 구독.
    pub fn order_updates(user: impl Into<String>) -> Self {
        Self::user_keyed(kind::ORDER_UPDATES, user)
    }

    /// 사용자 이벤트 구독.
    pub fn user_events(user: impl Into<String>) -> Self {
        Self::user_keyed(kind::USER_EVENTS, user)
    }

    /// 사용자 체결 구독.
    pub fn user_fills(user: impl Into<String>) -> Self {
        Self::user_keyed(kind::USER_FILLS, user)
    }

    /// 사용자 펀딩 구독.
    pub fn user_fundings(user: impl Into<String>) -> Self {
        Self::user_keyed(kind::USER_FUNDINGS, user)
    }

    /// 청산 이벤트 구독. 사용자를 지정하지 않으면 전체 청산을 받습니다.
    ///
    /// 키는 `liquidations:`(coin 없음)이므로 사용자별 구독과 전체 구독은 같은 키를
    /// 공유하며, 나중 구독이 앞의 구독을 교체합니다.
    pub fn liquidations(user: Option<String>) -> Self {
        Self::new(
            kind::LIQUIDATIONS,
            SubscriptionParams {
                user,
                ..Default::default()
            },
        )
    }

    fn user_keyed(kind: &str, user: impl Into<String>) -> Self {
        Self::new(kind, SubscriptionParams::default().with_user(user))
    }

    /// 정규 구독 키를 도출합니다. 같은 입력에 대해 항상 같은 키를 반환합니다.
    pub fn key(&self) -> SubscriptionKey {
        let coin = self.params.coin.as_deref().unwrap_or_default();
        let key = match self.kind.as_str() {
            kind::ALL_MIDS => kind::ALL_MIDS.to_string(),
            kind::CANDLE => {
                let interval = self.params.interval.as_deref().unwrap_or_default();
                format!("{}:{}:{}", kind::CANDLE, coin, interval)
            }
            k if kind::USER_KEYED.contains(&k) => {
                let user = self.params.user.as_deref().unwrap_or_default();
                format!("{}:{}", k, user)
            }
            // l2Book, trades 및 기타 종류는 모두 kind:coin
            k => format!("{}:{}", k, coin),
        };
        SubscriptionKey(key)
    }

    /// 종류별 필수 파라미터를 검증합니다.
    pub fn validate(&self) -> StreamResult<()> {
        if self.kind.trim().is_empty() {
            return Err(StreamError::InvalidSubscription(
                "subscription kind is empty".to_string(),
            ));
        }

        let missing = |name: &str| {
            StreamError::InvalidSubscription(format!("{} requires '{}'", self.kind, name))
        };
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());

        if kind::COIN_REQUIRED.contains(&self.kind.as_str()) && !present(&self.params.coin) {
            return Err(missing("coin"));
        }
        if self.kind == kind::CANDLE && !present(&self.params.interval) {
            return Err(missing("interval"));
        }
        if kind::USER_KEYED.contains(&self.kind.as_str()) && !present(&self.params.user) {
            return Err(missing("user"));
        }

        Ok(())
    }
}

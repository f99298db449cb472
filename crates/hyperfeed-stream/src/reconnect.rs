//! 재연결 감독 태스크.
//!
//! 연결이 끊기면 고정 지연 후 최대 횟수까지 재연결을 시도합니다. 각 시도는
//! `connect()`와 같은 경로를 사용하므로 성공 시 레지스트리의 모든 구독이 재전송됩니다.

use std::sync::Arc;
use std::time::Duration;

use hyperfeed_core::config::ConnectionConfig;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::event::ConnectionEvent;
use crate::manager::Shared;
use crate::session::Session;
use crate::state::ConnectionState;

/// 고정 지연 재시도 정책.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReconnectPolicy {
    pub delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// 다음 시도 번호가 허용 범위인지 확인.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }
}

impl From<&ConnectionConfig> for ReconnectPolicy {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            delay: config.reconnect_delay(),
            max_attempts: config.max_reconnect_attempts,
        }
    }
}

/// 실행 중인 재연결 태스크 핸들.
pub(crate) struct Supervisor {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Supervisor {
    /// 재시도를 중단하고 태스크 종료를 기다립니다.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "재연결 태스크가 비정상 종료됨");
        }
    }
}

/// 재연결 태스크를 시작합니다.
///
/// `previous`는 끊긴 세션으로, 첫 시도 전에 모든 태스크가 종료될 때까지 기다립니다.
pub(crate) fn spawn(shared: Arc<Shared>, previous: Option<Session>) -> Supervisor {
    let token = CancellationToken::new();
    let handle = tokio::spawn(supervise(shared, previous, token.clone()));
    Supervisor { token, handle }
}

async fn supervise(shared: Arc<Shared>, previous: Option<Session>, token: CancellationToken) {
    if let Some(session) = previous {
        session.shutdown().await;
    }

    let policy = ReconnectPolicy::from(&shared.config);
    let mut attempts = 0;

    while policy.allows(attempts + 1) {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = sleep(policy.delay) => {}
        }

        let attempt = {
            let mut inner = shared.inner.write().await;
            if inner.state.state != ConnectionState::Reconnecting {
                return;
            }
            inner.state.record_reconnect_attempt()
        };
        attempts = attempt;

        info!(attempt, max_attempts = policy.max_attempts, "재연결 시도");
        shared.emit(ConnectionEvent::Reconnecting {
            attempt,
            max_attempts: policy.max_attempts,
        });

        let span = info_span!("reconnect", attempt);
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            result = shared.establish(ConnectionState::Reconnecting).instrument(span) => result,
        };

        match result {
            Ok(()) => {
                info!(attempt, "재연결 성공");
                return;
            }
            Err(e) => warn!(attempt, error = %e, "재연결 실패"),
        }
    }

    {
        let mut inner = shared.inner.write().await;
        if inner.state.state != ConnectionState::Reconnecting {
            return;
        }
        inner.state.mark_disconnected();
    }

    error!(
        attempts,
        max_attempts = policy.max_attempts,
        "최대 재연결 시도 횟수를 초과했습니다. 자동 복구를 중단합니다"
    );
    shared.emit(ConnectionEvent::ReconnectFailed { attempts });
}

//! 연결 유지 (ping/pong).
//!
//! 주기마다 `{"method":"ping"}`을 보내고 `pong_timeout` 동안 `pong` 채널을 기다립니다.
//! 응답이 없거나 ping 전송이 실패하면 연결을 끊긴 것으로 보고합니다.

use std::sync::Arc;

use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::frame::ping_frame;
use crate::manager::Shared;
use crate::session::FrameWriter;
use crate::stats::Counters;

pub(crate) async fn run(
    shared: Arc<Shared>,
    session_id: u64,
    writer: FrameWriter,
    token: CancellationToken,
) {
    let period = shared.config.ping_interval();
    let window = shared.config.pong_timeout();

    // 첫 ping은 연결 직후가 아니라 한 주기 뒤
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let frame = match ping_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "ping 프레임 생성 실패");
                return;
            }
        };

        if !shared.record_ping(session_id).await {
            return;
        }

        if let Err(e) = writer.send(frame).await {
            warn!(session_id, error = %e, "ping 전송 실패");
            shared
                .connection_lost(session_id, format!("ping send failed: {}", e))
                .await;
            return;
        }
        debug!(session_id, "ping 전송");

        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = sleep(window) => {}
        }

        if shared.pong_overdue(session_id).await {
            Counters::incr(&shared.counters.probe_timeouts);
            warn!(
                session_id,
                timeout_secs = window.as_secs(),
                "pong 응답 시간 초과"
            );
            shared
                .connection_lost(session_id, "pong timeout".to_string())
                .await;
            return;
        }
    }
}

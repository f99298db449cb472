//! 연결 세션: 하나의 소켓에 묶인 백그라운드 태스크 묶음.
//!
//! 세션마다 네 개의 태스크가 실행됩니다.
//!
//! - writer: 송신 반쪽의 유일한 소유자. 송신 요청을 순서대로 기록합니다.
//! - reader: 수신 프레임을 디스패치 큐로 넘기고, 스트림 종료를 연결 끊김으로 보고합니다.
//! - dispatch: 프레임을 파싱해 구독자에게 라우팅합니다.
//! - keepalive: 주기적으로 ping을 보내고 pong 타임아웃을 감지합니다.
//!
//! 세션은 자체 취소 토큰을 가지며, 재연결 시 새 세션으로 통째로 교체됩니다.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{StreamError, StreamResult};
use crate::keepalive;
use crate::manager::Shared;
use crate::stats::Counters;
use crate::transport::{BoxedSink, BoxedSource};

/// writer 송신 요청 큐 용량.
const OUTBOUND_CAPACITY: usize = 64;

struct Outbound {
    text: String,
    ack: oneshot::Sender<StreamResult<()>>,
}

/// writer 태스크로의 송신 핸들.
#[derive(Clone)]
pub(crate) struct FrameWriter {
    tx: mpsc::Sender<Outbound>,
    write_timeout: Duration,
}

impl FrameWriter {
    /// 프레임을 전송하고 기록 완료까지 기다립니다.
    ///
    /// 큐 대기와 소켓 기록을 합쳐 `write_timeout`을 넘기면 실패합니다.
    pub async fn send(&self, text: String) -> StreamResult<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        let request = async {
            self.tx
                .send(Outbound { text, ack: ack_tx })
                .await
                .map_err(|_| StreamError::Transport("connection closed".to_string()))?;
            ack_rx
                .await
                .map_err(|_| StreamError::Transport("writer stopped".to_string()))?
        };

        timeout(self.write_timeout, request).await.map_err(|_| {
            StreamError::Transport(format!(
                "write timed out after {}ms",
                self.write_timeout.as_millis()
            ))
        })?
    }
}

/// 실행 중인 연결 세션.
pub(crate) struct Session {
    pub id: u64,
    pub writer: FrameWriter,
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    /// 세션 태스크를 시작합니다.
    pub fn start(shared: &Arc<Shared>, id: u64, sink: BoxedSink, source: BoxedSource) -> Self {
        let config = &shared.config;
        let token = CancellationToken::new();
        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel(config.inbound_queue_capacity.max(1));

        let writer = FrameWriter {
            tx: out_tx,
            write_timeout: config.write_timeout(),
        };

        let tasks = vec![
            tokio::spawn(write_loop(shared.clone(), sink, out_rx, token.clone())),
            tokio::spawn(read_loop(shared.clone(), id, source, in_tx, token.clone())),
            tokio::spawn(dispatch_loop(shared.clone(), in_rx, token.clone())),
            tokio::spawn(keepalive::run(
                shared.clone(),
                id,
                writer.clone(),
                token.clone(),
            )),
        ];

        debug!(session_id = id, "세션 태스크 시작");

        Self {
            id,
            writer,
            token,
            tasks,
        }
    }

    /// 태스크 중지를 요청합니다 (대기하지 않음).
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// 태스크를 중지하고 모두 종료될 때까지 기다립니다.
    pub async fn shutdown(self) {
        self.token.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(session_id = self.id, error = %e, "세션 태스크가 비정상 종료됨");
            }
        }
        debug!(session_id = self.id, "세션 종료");
    }
}

async fn write_loop(
    shared: Arc<Shared>,
    mut sink: BoxedSink,
    mut rx: mpsc::Receiver<Outbound>,
    token: CancellationToken,
) {
    loop {
        let outbound = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            outbound = rx.recv() => match outbound {
                Some(outbound) => outbound,
                None => break,
            },
        };

        let result = sink.send_text(outbound.text).await;
        if result.is_ok() {
            Counters::incr(&shared.counters.messages_sent);
        }
        // 요청자가 타임아웃으로 떠났으면 결과를 받을 곳이 없음
        let _ = outbound.ack.send(result);
    }

    if timeout(shared.config.write_timeout(), sink.close())
        .await
        .is_err()
    {
        debug!("소켓 종료 시간 초과");
    }
}

async fn read_loop(
    shared: Arc<Shared>,
    session_id: u64,
    mut source: BoxedSource,
    inbound: mpsc::Sender<String>,
    token: CancellationToken,
) {
    let reason = loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            next = source.next_frame() => next,
        };

        match next {
            Some(Ok(text)) => {
                Counters::incr(&shared.counters.messages_received);
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    sent = inbound.send(text) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
            Some(Err(StreamError::Decode(e))) => {
                Counters::incr(&shared.counters.decode_errors);
                warn!(session_id, error = %e, "수신 프레임을 해석할 수 없습니다");
            }
            Some(Err(e)) => break e.to_string(),
            None => break "stream closed by server".to_string(),
        }
    };

    shared.connection_lost(session_id, reason).await;
}

async fn dispatch_loop(
    shared: Arc<Shared>,
    mut inbound: mpsc::Receiver<String>,
    token: CancellationToken,
) {
    loop {
        let text = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            text = inbound.recv() => match text {
                Some(text) => text,
                None => return,
            },
        };

        shared.dispatch(&text).await;
    }
}

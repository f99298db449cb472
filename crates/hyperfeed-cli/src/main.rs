//! hyperfeed 스트리밍 CLI.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use hyperfeed_core::config::{FeedConfig, DEFAULT_CONFIG_PATH};
use hyperfeed_core::logging::{init_logging, LogConfig};
use hyperfeed_stream::{decode_payload, kind, ConnectionEvent, StreamManager, Subscription};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

#[derive(Parser)]
#[command(name = "hyperfeed")]
#[command(about = "Hyperliquid streaming feed client", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 설정 파일 경로 (기본: config/default.toml, 없으면 환경 변수)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 테스트넷 사용
    #[arg(long, global = true)]
    testnet: bool,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// 로그 형식 (pretty, json, compact)
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// 실시간 스트림 구독 (Ctrl-C로 종료)
    Stream {
        /// 전체 중간가 구독
        #[arg(long)]
        all_mids: bool,

        /// 체결 구독 (쉼표로 구분, 예: "BTC,ETH")
        #[arg(long, value_delimiter = ',')]
        trades: Vec<String>,

        /// L2 호가 구독 (쉼표로 구분)
        #[arg(long, value_delimiter = ',')]
        l2_book: Vec<String>,

        /// 캔들 구독 (COIN:INTERVAL, 쉼표로 구분, 예: "BTC:1m,ETH:1h")
        #[arg(long, value_delimiter = ',')]
        candles: Vec<String>,

        /// 사용자 체결 구독 (지갑 주소)
        #[arg(long)]
        user_fills: Option<String>,

        /// 주문 상태 변경 구독 (지갑 주소)
        #[arg(long)]
        order_updates: Option<String>,

        /// 통계 출력 주기 (초)
        #[arg(long, default_value_t = 60)]
        stats_interval: u64,
    },

    /// 적용된 설정을 TOML로 출력
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // wss 연결용 TLS 암호 모듈 (이미 설치되어 있으면 무시)
    let _ = rustls::crypto::ring::default_provider().install_default();

    let mut config = load_config(cli.config.as_deref())?;
    if cli.testnet {
        config.network.testnet = true;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    config.validate()?;

    init_logging(LogConfig::from(&config.logging))?;

    match cli.command {
        Commands::ShowConfig => {
            println!("{}", config.to_toml_string()?);
        }
        Commands::Stream {
            all_mids,
            trades,
            l2_book,
            candles,
            user_fills,
            order_updates,
            stats_interval,
        } => {
            let mut subscriptions = Vec::new();
            if all_mids {
                subscriptions.push(Subscription::all_mids());
            }
            subscriptions.extend(trades.iter().map(Subscription::trades));
            subscriptions.extend(l2_book.iter().map(Subscription::l2_book));
            for candle in &candles {
                let (coin, interval) = candle
                    .split_once(':')
                    .with_context(|| format!("캔들 형식은 COIN:INTERVAL 입니다: {}", candle))?;
                subscriptions.push(Subscription::candle(coin, interval));
            }
            if let Some(user) = user_fills {
                subscriptions.push(Subscription::user_fills(user));
            }
            if let Some(user) = order_updates {
                subscriptions.push(Subscription::order_updates(user));
            }

            if subscriptions.is_empty() {
                bail!("구독할 채널을 하나 이상 지정하세요 (예: --all-mids, --trades BTC)");
            }

            run_stream(&config, subscriptions, Duration::from_secs(stats_interval.max(1))).await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<FeedConfig> {
    let config = match path {
        Some(path) => FeedConfig::load(path)
            .with_context(|| format!("설정 파일 로드 실패: {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => FeedConfig::load_default()?,
        None => FeedConfig::from_env()?,
    };
    Ok(config)
}

async fn run_stream(
    config: &FeedConfig,
    subscriptions: Vec<Subscription>,
    stats_interval: Duration,
) -> anyhow::Result<()> {
    let manager = StreamManager::from_config(config)?;
    let mut events = manager.events();

    tracing::info!(url = %manager.url(), "hyperfeed 스트림 시작");
    manager.connect().await?;

    for subscription in subscriptions {
        let sub_kind = subscription.kind.clone();
        let key = subscription.key();
        let channel = key.clone();
        manager
            .subscribe_callback(subscription, move |payload| {
                tracing::info!(channel = %channel, summary = %summarize(&sub_kind, payload), "수신");
                Ok(())
            })
            .await
            .with_context(|| format!("구독 실패: {}", key))?;
    }

    let mut ticker = interval_at(Instant::now() + stats_interval, stats_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("종료 신호 수신, 스트림 종료 중...");
                break Ok(());
            }
            _ = ticker.tick() => {
                manager.stats().await.log_summary();
            }
            event = events.recv() => match event {
                Ok(ConnectionEvent::ReconnectFailed { attempts }) => {
                    break Err(anyhow::anyhow!("재연결 {}회 실패로 스트림을 중단합니다", attempts));
                }
                Ok(event) => tracing::info!(event = ?event, "연결 이벤트"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "연결 이벤트 일부를 놓쳤습니다");
                }
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    for key in manager.stats().await.subscription_keys {
        if let Err(e) = manager.unsubscribe(key.as_str()).await {
            tracing::warn!(key = %key, error = %e, "구독 해제 실패");
        }
    }
    manager.disconnect().await?;
    manager.stats().await.log_summary();
    tracing::info!("hyperfeed 스트림 종료");

    outcome
}

#[derive(Deserialize)]
struct AllMids {
    mids: HashMap<String, String>,
}

/// 로그용 페이로드 요약.
fn summarize(sub_kind: &str, payload: &Value) -> String {
    if sub_kind == kind::ALL_MIDS {
        if let Ok(all_mids) = decode_payload::<AllMids>(payload) {
            return format!("{} mids", all_mids.mids.len());
        }
    }

    match payload {
        Value::Array(items) => format!("{} items", items.len()),
        Value::Object(fields) => {
            let keys: Vec<&str> = fields.keys().map(String::as_str).take(6).collect();
            format!("{{{}}}", keys.join(", "))
        }
        other => {
            let text = other.to_string();
            if text.len() > 80 {
                format!("{}...", text.chars().take(80).collect::<String>())
            } else {
                text
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cli_parses_stream_args() {
        let cli = Cli::try_parse_from([
            "hyperfeed",
            "--testnet",
            "stream",
            "--trades",
            "BTC,ETH",
            "--candles",
            "BTC:1m",
            "--stats-interval",
            "10",
        ])
        .unwrap();

        assert!(cli.testnet);
        match cli.command {
            Commands::Stream {
                trades,
                candles,
                stats_interval,
                all_mids,
                ..
            } => {
                assert_eq!(trades, vec!["BTC", "ETH"]);
                assert_eq!(candles, vec!["BTC:1m"]);
                assert_eq!(stats_interval, 10);
                assert!(!all_mids);
            }
            Commands::ShowConfig => panic!("expected stream command"),
        }
    }

    #[test]
    fn test_summarize() {
        assert_eq!(
            summarize(kind::ALL_MIDS, &json!({"mids": {"BTC": "1", "ETH": "2"}})),
            "2 mids"
        );
        assert_eq!(summarize(kind::TRADES, &json!([1, 2, 3])), "3 items");
        assert_eq!(summarize(kind::L2_BOOK, &json!({"coin": "BTC"})), "{coin}");
    }
}

//! 설정 관리.
//!
//! 스트리밍 클라이언트 설정을 정의하고 TOML 파일, 환경 변수에서 로드합니다.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{CoreError, CoreResult};
use crate::logging::LogFormat;

/// 메인넷 WebSocket 엔드포인트.
pub const MAINNET_WS_URL: &str = "wss://api.hyperliquid.xyz/ws";

/// 테스트넷 WebSocket 엔드포인트.
pub const TESTNET_WS_URL: &str = "wss://api.hyperliquid-testnet.xyz/ws";

/// 기본 설정 파일 경로.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedConfig {
    /// 네트워크/엔드포인트 설정
    pub network: NetworkConfig,
    /// 연결 관리 설정
    pub connection: ConnectionConfig,
    /// 로깅 설정
    pub logging: LoggingConfig,
}

/// 네트워크 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// 테스트넷 사용 여부
    pub testnet: bool,
    /// 엔드포인트 직접 지정 (설정 시 testnet 플래그보다 우선)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
}

/// 연결 관리 설정.
///
/// keepalive, 재연결, 큐 크기 등 연결 관리자의 모든 시간/용량 한도를 담습니다.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// 연결 수립 타임아웃 (밀리초)
    pub dial_timeout_ms: u64,
    /// 프레임 전송 타임아웃 (밀리초)
    pub write_timeout_ms: u64,
    /// ping 전송 간격 (초)
    pub ping_interval_secs: u64,
    /// pong 응답 대기 시간 (초)
    pub pong_timeout_secs: u64,
    /// 자동 재연결 활성화
    pub reconnect_enabled: bool,
    /// 재연결 시도 간 고정 대기 시간 (초)
    pub reconnect_delay_secs: u64,
    /// 최대 재연결 시도 횟수
    pub max_reconnect_attempts: u32,
    /// 수신 프레임 디스패치 큐 크기
    pub inbound_queue_capacity: usize,
    /// 큐 기반 구독의 기본 용량
    pub default_queue_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            dial_timeout_ms: 10_000,
            write_timeout_ms: 10_000,
            ping_interval_secs: 30,
            pong_timeout_secs: 10,
            reconnect_enabled: true,
            reconnect_delay_secs: 5,
            max_reconnect_attempts: 10,
            inbound_queue_capacity: 1000,
            default_queue_capacity: 100,
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl NetworkConfig {
    /// 실제로 연결할 WebSocket URL을 반환합니다.
    pub fn ws_url(&self) -> &str {
        match &self.ws_url {
            Some(url) => url,
            None if self.testnet => TESTNET_WS_URL,
            None => MAINNET_WS_URL,
        }
    }
}

impl ConnectionConfig {
    /// 연결 수립 타임아웃을 Duration으로 반환
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    /// 프레임 전송 타임아웃을 Duration으로 반환
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// ping 간격을 Duration으로 반환
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// pong 대기 시간을 Duration으로 반환
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }

    /// 재연결 대기 시간을 Duration으로 반환
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    /// 설정 값을 검증합니다.
    pub fn validate(&self) -> CoreResult<()> {
        let checks: [(&str, bool); 6] = [
            ("dial_timeout_ms", self.dial_timeout_ms > 0),
            ("write_timeout_ms", self.write_timeout_ms > 0),
            ("ping_interval_secs", self.ping_interval_secs > 0),
            ("pong_timeout_secs", self.pong_timeout_secs > 0),
            ("inbound_queue_capacity", self.inbound_queue_capacity > 0),
            ("default_queue_capacity", self.default_queue_capacity > 0),
        ];

        if let Some((field, _)) = checks.iter().find(|(_, ok)| !ok) {
            return Err(CoreError::InvalidConfig(format!(
                "{}는 0보다 커야 합니다",
                field
            )));
        }

        if self.pong_timeout_secs >= self.ping_interval_secs {
            return Err(CoreError::InvalidConfig(
                "pong_timeout_secs는 ping_interval_secs보다 작아야 합니다".to_string(),
            ));
        }

        Ok(())
    }
}

impl FeedConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 우선순위: 환경 변수(`HYPERFEED__CONNECTION__PING_INTERVAL_SECS` 등) > 파일 > 기본값.
    pub fn load<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let builder = config::Config::builder()
            // 파일에서 로드
            .add_source(config::File::from(path.as_ref()))
            // 환경 변수로 오버라이드
            .add_source(
                config::Environment::with_prefix("HYPERFEED")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: FeedConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> CoreResult<Self> {
        Self::load(DEFAULT_CONFIG_PATH)
    }

    /// 설정 파일 없이 환경변수에서 설정을 로드합니다.
    pub fn from_env() -> CoreResult<Self> {
        dotenvy::dotenv().ok();

        let defaults = ConnectionConfig::default();
        let config = Self {
            network: NetworkConfig {
                testnet: env_var_bool("HYPERFEED_TESTNET", false),
                ws_url: std::env::var("HYPERFEED_WS_URL").ok(),
            },
            connection: ConnectionConfig {
                dial_timeout_ms: env_var_parse(
                    "HYPERFEED_DIAL_TIMEOUT_MS",
                    defaults.dial_timeout_ms,
                ),
                write_timeout_ms: env_var_parse(
                    "HYPERFEED_WRITE_TIMEOUT_MS",
                    defaults.write_timeout_ms,
                ),
                ping_interval_secs: env_var_parse(
                    "HYPERFEED_PING_INTERVAL_SECS",
                    defaults.ping_interval_secs,
                ),
                pong_timeout_secs: env_var_parse(
                    "HYPERFEED_PONG_TIMEOUT_SECS",
                    defaults.pong_timeout_secs,
                ),
                reconnect_enabled: env_var_bool(
                    "HYPERFEED_RECONNECT_ENABLED",
                    defaults.reconnect_enabled,
                ),
                reconnect_delay_secs: env_var_parse(
                    "HYPERFEED_RECONNECT_DELAY_SECS",
                    defaults.reconnect_delay_secs,
                ),
                max_reconnect_attempts: env_var_parse(
                    "HYPERFEED_MAX_RECONNECT_ATTEMPTS",
                    defaults.max_reconnect_attempts,
                ),
                inbound_queue_capacity: env_var_parse(
                    "HYPERFEED_INBOUND_QUEUE_CAPACITY",
                    defaults.inbound_queue_capacity,
                ),
                default_queue_capacity: env_var_parse(
                    "HYPERFEED_QUEUE_CAPACITY",
                    defaults.default_queue_capacity,
                ),
            },
            logging: LoggingConfig {
                level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
                format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// 전체 설정을 검증합니다.
    pub fn validate(&self) -> CoreResult<()> {
        if self.ws_url().trim().is_empty() {
            return Err(CoreError::InvalidConfig("ws_url이 비어 있습니다".to_string()));
        }
        self.logging.format.parse::<LogFormat>()?;
        self.connection.validate()
    }

    /// 연결할 WebSocket URL.
    pub fn ws_url(&self) -> &str {
        self.network.ws_url()
    }

    /// 현재 설정을 TOML 문자열로 직렬화합니다.
    pub fn to_toml_string(&self) -> CoreResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용)
fn env_var_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// 환경변수에서 bool 값 파싱
fn env_var_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp_config(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "hyperfeed-{}-{}.toml",
            name,
            std::process::id()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_default_values() {
        let config = FeedConfig::default();
        assert_eq!(config.ws_url(), MAINNET_WS_URL);
        assert_eq!(config.connection.ping_interval(), Duration::from_secs(30));
        assert_eq!(config.connection.pong_timeout(), Duration::from_secs(10));
        assert_eq!(config.connection.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.connection.max_reconnect_attempts, 10);
        assert_eq!(config.connection.inbound_queue_capacity, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ws_url_selection() {
        let mut network = NetworkConfig {
            testnet: true,
            ws_url: None,
        };
        assert_eq!(network.ws_url(), TESTNET_WS_URL);

        network.ws_url = Some("ws://127.0.0.1:9000/ws".to_string());
        assert_eq!(network.ws_url(), "ws://127.0.0.1:9000/ws");
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut connection = ConnectionConfig::default();
        connection.default_queue_capacity = 0;
        assert!(matches!(
            connection.validate(),
            Err(CoreError::InvalidConfig(msg)) if msg.contains("default_queue_capacity")
        ));

        let mut connection = ConnectionConfig::default();
        connection.pong_timeout_secs = 30;
        assert!(connection.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_log_format() {
        let mut config = FeedConfig::default();
        config.logging.format = "yaml".to_string();
        assert!(matches!(config.validate(), Err(CoreError::InvalidConfig(_))));

        config.logging.format = "json".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let path = write_temp_config(
            "partial",
            r#"
[network]
testnet = true

[connection]
ping_interval_secs = 20
max_reconnect_attempts = 3
"#,
        );

        let config = FeedConfig::load(&path).unwrap();
        assert_eq!(config.ws_url(), TESTNET_WS_URL);
        assert_eq!(config.connection.ping_interval_secs, 20);
        assert_eq!(config.connection.max_reconnect_attempts, 3);
        // 지정하지 않은 값은 기본값 유지
        assert_eq!(config.connection.pong_timeout_secs, 10);
        assert_eq!(config.logging.level, "info");

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let path = write_temp_config(
            "invalid",
            r#"
[connection]
ping_interval_secs = 5
pong_timeout_secs = 10
"#,
        );

        assert!(matches!(
            FeedConfig::load(&path),
            Err(CoreError::InvalidConfig(_))
        ));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            FeedConfig::load("/nonexistent/hyperfeed.toml"),
            Err(CoreError::ConfigLoad(_))
        ));
    }

    #[test]
    fn test_toml_roundtrip_keeps_connection_section() {
        let text = FeedConfig::default().to_toml_string().unwrap();
        assert!(text.contains("[connection]"));
        assert!(text.contains("ping_interval_secs = 30"));
    }
}

//! tracing 기반 로깅 초기화.
//!
//! 출력 형식은 세 가지입니다:
//! - **pretty**: 터미널에서 스트림을 지켜볼 때 쓰는 여러 줄 형식
//! - **json**: 로그 수집기로 보내는 한 줄 JSON
//! - **compact**: 메시지 요약을 빠르게 훑어보는 한 줄 형식
//!
//! 연결 관리자는 구독 키(`key`), 세션 번호(`session_id`), 재연결 시도(`attempt`)를
//! 필드로 남기므로 json 형식에서 그대로 검색할 수 있습니다.

use std::fmt;

use tracing::Subscriber;
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::config::LoggingConfig;
use crate::error::{CoreError, CoreResult};

/// 로그 출력 형식.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
            Self::Compact => "compact",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(CoreError::InvalidConfig(format!(
                "logging.format must be pretty, json or compact (got {:?})",
                other
            ))),
        }
    }
}

/// 로깅 초기화 옵션.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// `EnvFilter` 지시문 (예: "info", "hyperfeed_stream=debug")
    pub level: String,
    pub format: LogFormat,
    /// span 생성/종료 이벤트 출력 (구독·재연결 span 추적용)
    pub with_span_events: bool,
    /// 파일명과 줄 번호
    pub with_file: bool,
    pub with_thread_ids: bool,
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            with_span_events: false,
            with_file: false,
            with_thread_ids: false,
            with_target: true,
        }
    }
}

impl LogConfig {
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Default::default()
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.with_span_events = enabled;
        self
    }

    pub fn with_file(mut self, enabled: bool) -> Self {
        self.with_file = enabled;
        self
    }

    /// `RUST_LOG`와 `LOG_FORMAT`에서 옵션을 읽습니다. 잘못된 형식은 pretty로 대체합니다.
    pub fn from_env() -> Self {
        let level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let format = std::env::var("LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();

        Self::new(level).with_format(format)
    }

    fn span_events(&self) -> FmtSpan {
        if self.with_span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }

    /// 형식별 fmt 레이어.
    fn output_layer<S>(&self) -> Box<dyn Layer<S> + Send + Sync + 'static>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let layer = tracing_subscriber::fmt::layer()
            .with_file(self.with_file)
            .with_line_number(self.with_file)
            .with_thread_ids(self.with_thread_ids)
            .with_target(self.with_target)
            .with_span_events(self.span_events());

        match self.format {
            LogFormat::Pretty => layer.pretty().boxed(),
            LogFormat::Json => layer.json().boxed(),
            LogFormat::Compact => layer.compact().boxed(),
        }
    }
}

impl From<&LoggingConfig> for LogConfig {
    fn from(config: &LoggingConfig) -> Self {
        // validate()를 거치지 않은 설정이면 pretty로 대체
        let format = config.format.parse().unwrap_or_default();
        Self::new(config.level.clone()).with_format(format)
    }
}

/// 전역 tracing subscriber를 설치합니다.
///
/// `RUST_LOG`가 있으면 `config.level`보다 우선합니다. 이미 설치되어 있으면
/// `CoreError::Logging`을 반환합니다.
///
/// ```no_run
/// use hyperfeed_core::logging::{init_logging, LogConfig, LogFormat};
///
/// # fn main() -> hyperfeed_core::error::CoreResult<()> {
/// init_logging(LogConfig::new("hyperfeed_stream=debug").with_format(LogFormat::Compact))?;
/// # Ok(())
/// # }
/// ```
pub fn init_logging(config: LogConfig) -> CoreResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| CoreError::Logging(format!("invalid filter {:?}: {}", config.level, e)))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(config.output_layer())
        .try_init()
        .map_err(|e| CoreError::Logging(e.to_string()))?;

    tracing::debug!(format = %config.format, level = %config.level, "로깅 초기화");
    Ok(())
}

/// `LogConfig::from_env()`로 로깅을 초기화합니다.
pub fn init_logging_from_env() -> CoreResult<()> {
    init_logging(LogConfig::from_env())
}

/// 구독 키 필드가 붙은 info span.
///
/// ```ignore
/// let span = stream_span!("subscribe", key);
/// ```
#[macro_export]
macro_rules! stream_span {
    ($name:expr, $key:expr) => {
        tracing::info_span!($name, key = %$key)
    };
}

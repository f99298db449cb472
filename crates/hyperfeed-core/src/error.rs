//! 설정 및 초기화 에러 타입.

use thiserror::Error;

/// 공통 인프라 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// 설정 파일/환경 변수 로드 실패
    #[error("설정 로드 에러: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    /// 설정 값 검증 실패
    #[error("잘못된 설정: {0}")]
    InvalidConfig(String),

    /// 설정 직렬화 실패
    #[error("설정 직렬화 에러: {0}")]
    Serialization(String),

    /// 로깅 초기화 실패
    #[error("로깅 초기화 에러: {0}")]
    Logging(String),
}

/// 공통 인프라 작업을 위한 Result 타입.
pub type CoreResult<T> = Result<T, CoreError>;

impl From<toml::ser::Error> for CoreError {
    fn from(err: toml::ser::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

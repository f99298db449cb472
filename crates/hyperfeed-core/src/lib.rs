//! # Hyperfeed Core
//!
//! 스트리밍 클라이언트 전반에서 사용하는 공통 인프라를 제공합니다:
//! - 설정 관리 (TOML 파일 + 환경 변수)
//! - 로깅 인프라
//! - 설정/초기화 에러 타입

pub mod config;
pub mod error;
pub mod logging;

pub use config::*;
pub use error::*;
pub use logging::*;

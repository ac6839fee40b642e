//! 설정 관리.
//!
//! 이 모듈은 애플리케이션 설정을 정의하고 관리합니다.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// 데이터베이스 설정
    #[serde(default)]
    pub database: DatabaseConfig,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 수집 엔진 설정
    #[serde(default)]
    pub acquire: AcquireConfig,
    /// 원격 소스 설정
    #[serde(default)]
    pub source: SourceConfig,
}

/// 데이터베이스 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// 최대 연결 수
    pub max_connections: u32,
    /// 연결 타임아웃 (초)
    pub connection_timeout_secs: u64,
    /// 유휴 타임아웃 (초)
    pub idle_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            connection_timeout_secs: 30,
            idle_timeout_secs: 300,
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
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

/// 수집 엔진 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AcquireConfig {
    /// 동시 원격 요청 최대 수
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    /// 일시적 오류에 대한 최대 시도 횟수
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// 초기 백오프 (밀리초)
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// 최대 백오프 (밀리초)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// 백오프 배수
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// 지터 계수 (0.0 ~ 1.0)
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_concurrent_fetches() -> usize {
    8
}
fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    100
}
fn default_max_backoff_ms() -> u64 {
    30_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_jitter_factor() -> f64 {
    0.2
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent_fetches(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

/// 원격 소스 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// 기본 거래소 라우팅
    pub default_exchange: String,
    /// 기본 통화
    pub default_currency: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            default_exchange: "SMART".to_string(),
            default_currency: "USD".to_string(),
        }
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            // 기본값으로 시작
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // 파일에서 로드
            .add_source(config::File::from(path.as_ref()))
            // 환경 변수로 오버라이드
            .add_source(
                config::Environment::with_prefix("HISTFEED")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> Result<Self, config::ConfigError> {
        Self::load("config/default.toml")
    }
}

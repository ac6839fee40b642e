//! 수집 시스템의 에러 타입.
//!
//! 이 모듈은 수집 파이프라인 전반에서 사용되는 에러 타입을 정의합니다.

use thiserror::Error;

/// 핵심 수집 에러.
#[derive(Debug, Error)]
pub enum HistfeedError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 스키마 에러 (입력 테이블의 필수 컬럼 누락 등)
    #[error("스키마 에러: {0}")]
    Schema(String),

    /// 원격 수집 에러
    #[error("수집 에러: {0}")]
    Fetch(String),

    /// 캐시 에러
    #[error("캐시 에러: {0}")]
    Cache(String),

    /// 데이터베이스 에러
    #[error("데이터베이스 에러: {0}")]
    Database(String),

    /// 네트워크 에러
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 요청 한도 초과
    #[error("요청 한도 초과: {0}")]
    RateLimit(String),

    /// 작업 취소됨
    #[error("작업 취소됨: {0}")]
    Cancelled(String),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),

    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),

    /// 찾을 수 없음
    #[error("찾을 수 없음: {0}")]
    NotFound(String),

    /// 내부 에러
    #[error("내부 에러: {0}")]
    Internal(String),
}

/// 수집 작업을 위한 Result 타입.
pub type HistfeedResult<T> = Result<T, HistfeedError>;

impl HistfeedError {
    /// 재시도 가능한 에러인지 확인합니다.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HistfeedError::Network(_) | HistfeedError::RateLimit(_)
        )
    }

    /// 치명적인 에러인지 확인합니다.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            HistfeedError::Config(_) | HistfeedError::Schema(_)
        )
    }
}

impl From<serde_json::Error> for HistfeedError {
    fn from(err: serde_json::Error) -> Self {
        HistfeedError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let network_err = HistfeedError::Network("timeout".to_string());
        assert!(network_err.is_retryable());

        let schema_err = HistfeedError::Schema("missing close column".to_string());
        assert!(!schema_err.is_retryable());
    }

    #[test]
    fn test_error_critical() {
        let schema_err = HistfeedError::Schema("missing close column".to_string());
        assert!(schema_err.is_critical());

        let fetch_err = HistfeedError::Fetch("empty response".to_string());
        assert!(!fetch_err.is_critical());
    }
}

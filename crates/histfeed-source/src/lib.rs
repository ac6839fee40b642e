//! 원격 시세 소스 어댑터.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - RemoteSource trait: 통합 원격 소스 인터페이스
//! - Yahoo Finance 소스
//! - 시뮬레이션 소스 (테스트 및 오프라인 작업용)
//! - 재시도 정책 및 지수 백오프 계산
//! - 에러 분류 (일시적/영구적)

pub mod error;
pub mod remote;
pub mod retry;
pub mod simulated;
pub mod yahoo;

pub use error::*;
pub use remote::{RemoteSource, SubRequest};
pub use retry::{BackoffCalculator, RetryPolicy};
pub use simulated::{SimulatedSource, SimulatedSourceConfig};
pub use yahoo::YahooSource;

//! # Histfeed Core
//!
//! 과거 시세 데이터 수집 시스템의 핵심 도메인 모델 및 타입을 제공합니다.
//!
//! 이 크레이트는 수집 파이프라인 전반에서 사용되는 기본 타입을 제공합니다:
//! - 바(OHLCV) 및 원시 테이블 구조체
//! - 수집 요청 및 기간 파싱
//! - 바 크기, 데이터 종류, 자산군 정의
//! - 시간 구간 연산
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
pub use types::*;

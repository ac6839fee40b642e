//! 과거 바 데이터 엔진.
//!
//! 이 crate는 다음을 제공합니다:
//! - 커버리지 기반 요청 분할 (캐시 조회 vs 원격 수집)
//! - 단일 비행 동시 수집 조정과 지수 백오프 재시도
//! - 소스별 스키마 정규화와 표준 바 블록 병합
//! - PostgreSQL 바 캐시와 커버리지 기록

pub mod block;
pub mod coordinator;
pub mod coverage;
pub mod error;
pub mod manager;
pub mod planner;
pub mod schema;
pub mod store;

pub use error::{DataError, Result};
pub use manager::*;

// 데이터 블록 재내보내기
pub use block::{BlockKey, DataBlock, ExportRow};

// 수집 구성 요소 재내보내기
pub use coordinator::{AcquireOutcome, FetchCoordinator, FetchFailure};
pub use coverage::CoverageIndex;
pub use planner::{Plan, RequestPlanner};
pub use schema::{normalize_table, SchemaOverrides};

// 저장소 재내보내기
pub use store::{BarStore, MemoryBarStore, PgBarStore};

//! 바 저장소.
//!
//! 키 구간 캐시의 읽기/쓰기 계약과 그 구현을 제공합니다.
//! 운영에는 PostgreSQL 구현을, 테스트와 소규모 작업에는 메모리
//! 구현을 사용합니다.

use async_trait::async_trait;

use histfeed_core::TimeSpan;

use crate::block::{BlockKey, DataBlock};
use crate::error::Result;

mod memory;
mod postgres;

pub use memory::MemoryBarStore;
pub use postgres::PgBarStore;

/// 키 구간 바 캐시의 계약.
///
/// 쓰기는 멱등해야 합니다: 같은 바를 다시 기록해도 중복 행이 생기지
/// 않습니다. 커버리지 기록은 바 행과 별개로 유지됩니다. 바가 없는
/// 구간(휴장일만 포함하는 구간)도 커버된 것으로 기록될 수 있기
/// 때문입니다.
#[async_trait]
pub trait BarStore: Send + Sync {
    /// 키의 구간 내 바를 조회합니다. 없으면 빈 블록을 반환합니다.
    async fn query(&self, key: &BlockKey, span: TimeSpan) -> Result<DataBlock>;

    /// 블록의 모든 바를 upsert로 기록하고 기록된 행 수를 반환합니다.
    async fn write(&self, block: &DataBlock) -> Result<usize>;

    /// 키의 영속 커버리지 구간을 시작 시각 오름차순으로 반환합니다.
    async fn coverage(&self, key: &BlockKey) -> Result<Vec<TimeSpan>>;

    /// 커버리지 구간을 기록합니다. 겹치거나 인접한 기존 구간과 합쳐집니다.
    async fn record_coverage(&self, key: &BlockKey, span: TimeSpan) -> Result<()>;

    /// 저장소 연결 상태를 확인합니다.
    async fn ping(&self) -> Result<()>;
}

//! 메모리 바 저장소.
//!
//! 테스트와 캐시 없는 소규모 작업을 위한 [`BarStore`] 구현입니다.
//! 읽기/쓰기 실패 주입 스위치로 저장소 장애 경로를 시험할 수 있습니다.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use histfeed_core::{Bar, TimeSpan};

use crate::block::{BlockKey, DataBlock};
use crate::coverage::CoverageIndex;
use crate::error::{DataError, Result};
use crate::store::BarStore;

#[derive(Default)]
struct MemoryInner {
    bars: HashMap<BlockKey, BTreeMap<DateTime<Utc>, Bar>>,
    coverage: CoverageIndex,
}

/// 메모리 기반 바 저장소.
#[derive(Default)]
pub struct MemoryBarStore {
    inner: RwLock<MemoryInner>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryBarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 이후의 조회/커버리지 읽기가 실패하도록 설정합니다.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// 이후의 기록이 실패하도록 설정합니다.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// 커버리지 기록 없이 바만 넣습니다.
    ///
    /// 커버리지 기록이 없는 기존 데이터에서 커버리지를 유도하는 경로를
    /// 시험할 때 사용합니다.
    pub async fn seed_bars(&self, bars: Vec<Bar>) {
        let mut inner = self.inner.write().await;
        for bar in bars {
            inner
                .bars
                .entry(BlockKey::from_bar(&bar))
                .or_default()
                .insert(bar.time, bar);
        }
    }

    /// 저장된 전체 바 수.
    pub async fn bar_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.bars.values().map(|bars| bars.len()).sum()
    }
}

#[async_trait]
impl BarStore for MemoryBarStore {
    async fn query(&self, key: &BlockKey, span: TimeSpan) -> Result<DataBlock> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DataError::QueryError("simulated read failure".to_string()));
        }
        let inner = self.inner.read().await;
        let mut block = DataBlock::new();
        if let Some(bars) = inner.bars.get(key) {
            if !span.is_empty() {
                for (_, bar) in bars.range(span.start..=span.end) {
                    block.insert_bar(bar.clone());
                }
            }
        }
        Ok(block)
    }

    async fn write(&self, block: &DataBlock) -> Result<usize> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DataError::InsertError("simulated write failure".to_string()));
        }
        let mut inner = self.inner.write().await;
        let mut written = 0;
        for key in block.keys() {
            for bar in block.bars(key) {
                inner
                    .bars
                    .entry(key.clone())
                    .or_default()
                    .insert(bar.time, bar);
                written += 1;
            }
        }
        Ok(written)
    }

    async fn coverage(&self, key: &BlockKey) -> Result<Vec<TimeSpan>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DataError::QueryError("simulated read failure".to_string()));
        }
        let inner = self.inner.read().await;
        Ok(inner.coverage.covered(key))
    }

    async fn record_coverage(&self, key: &BlockKey, span: TimeSpan) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DataError::InsertError("simulated write failure".to_string()));
        }
        let mut inner = self.inner.write().await;
        inner.coverage.mark_covered(key, span);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DataError::ConnectionError("simulated outage".to_string()));
        }
        Ok(())
    }
}

// =============================================================================
// 테스트
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use histfeed_core::{BarSize, DataType};
    use rust_decimal_macros::dec;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 9, d, 0, 0, 0).unwrap()
    }

    fn key() -> BlockKey {
        BlockKey::new("GS", DataType::Trades, BarSize::D1)
    }

    #[tokio::test]
    async fn test_write_then_query_round_trip() {
        let store = MemoryBarStore::new();
        let mut block = DataBlock::new();
        for d in [1, 5, 6] {
            block.insert_bar(Bar::new("GS", DataType::Trades, BarSize::D1, day(d), dec!(100)));
        }

        let written = store.write(&block).await.unwrap();
        assert_eq!(written, 3);

        let loaded = store.query(&key(), TimeSpan::new(day(1), day(5))).await.unwrap();
        assert_eq!(loaded.len(), 2);

        // 같은 블록을 다시 기록해도 행이 늘지 않는다
        store.write(&block).await.unwrap();
        assert_eq!(store.bar_count().await, 3);
    }

    #[tokio::test]
    async fn test_coverage_round_trip() {
        let store = MemoryBarStore::new();
        let span = TimeSpan::new(day(1), day(5));

        store.record_coverage(&key(), span).await.unwrap();
        store
            .record_coverage(&key(), TimeSpan::new(day(6), day(8)))
            .await
            .unwrap();

        // 한 스텝 인접 구간은 합쳐진다
        assert_eq!(
            store.coverage(&key()).await.unwrap(),
            vec![TimeSpan::new(day(1), day(8))]
        );
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryBarStore::new();
        store.set_fail_writes(true);

        let mut block = DataBlock::new();
        block.insert_bar(Bar::new("GS", DataType::Trades, BarSize::D1, day(1), dec!(1)));
        assert!(store.write(&block).await.is_err());

        store.set_fail_writes(false);
        assert!(store.write(&block).await.is_ok());

        store.set_fail_reads(true);
        assert!(store.query(&key(), TimeSpan::new(day(1), day(2))).await.is_err());
        assert!(store.ping().await.is_err());
    }
}

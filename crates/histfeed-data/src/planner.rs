//! 요청 분할 계획.
//!
//! 요청 구간을 커버리지 인덱스와 대조하여 캐시에서 읽을 부분과 원격에서
//! 받아야 할 갭으로 나눕니다. 저장소가 없거나 바 크기가 캐시 대상이
//! 아니면 전체 구간을 원격 수집으로 우회하고, 캐시 읽기가 실패하면
//! 경고 후 전체 구간 수집으로 강등합니다. 계획 단계는 실패하지
//! 않습니다.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use histfeed_core::HistRequest;
use histfeed_source::SubRequest;

use crate::block::{BlockKey, DataBlock};
use crate::coverage::CoverageIndex;
use crate::store::BarStore;

/// 한 요청에 대한 수집 계획.
#[derive(Debug)]
pub struct Plan {
    /// 캐시에서 읽어 온 바
    pub cached: DataBlock,
    /// 원격으로 보낼 갭 하위 요청 (시간 오름차순)
    pub subrequests: Vec<SubRequest>,
}

impl Plan {
    fn empty(request: &HistRequest) -> Self {
        Self {
            cached: DataBlock::with_timezone(request.timezone),
            subrequests: Vec::new(),
        }
    }

    fn full_fetch(request: &HistRequest) -> Self {
        Self {
            cached: DataBlock::with_timezone(request.timezone),
            subrequests: vec![SubRequest::from_request(request, request.span())],
        }
    }

    /// 원격 수집 없이 캐시만으로 요청을 만족하는지 여부.
    pub fn is_cache_only(&self) -> bool {
        self.subrequests.is_empty()
    }
}

/// 커버리지 기반 요청 분할기.
pub struct RequestPlanner {
    store: Option<Arc<dyn BarStore>>,
    coverage: Arc<RwLock<CoverageIndex>>,
}

impl RequestPlanner {
    pub fn new(store: Option<Arc<dyn BarStore>>, coverage: Arc<RwLock<CoverageIndex>>) -> Self {
        Self { store, coverage }
    }

    /// 요청을 캐시 조회와 갭 하위 요청으로 분할합니다.
    pub async fn plan(&self, request: &HistRequest) -> Plan {
        let span = request.span();
        if request.duration <= chrono::Duration::zero() {
            debug!(symbol = %request.symbol, "빈 요청 구간, 수집할 것 없음");
            return Plan::empty(request);
        }

        let store = match &self.store {
            Some(store) if request.bar_size.is_cacheable() => store,
            Some(_) => {
                debug!(
                    symbol = %request.symbol,
                    bar_size = %request.bar_size,
                    "캐시 대상이 아닌 바 크기, 전체 구간을 원격에서 수집"
                );
                return Plan::full_fetch(request);
            }
            None => {
                debug!(symbol = %request.symbol, "저장소 없음, 전체 구간을 원격에서 수집");
                return Plan::full_fetch(request);
            }
        };

        let key = BlockKey::new(&request.symbol, request.data_type, request.bar_size);

        let persisted = match store.coverage(&key).await {
            Ok(spans) => spans,
            Err(e) => {
                warn!(key = %key, error = %e, "커버리지 조회 실패, 전체 구간을 원격에서 수집");
                return Plan::full_fetch(request);
            }
        };
        let cached = match store.query(&key, span).await {
            Ok(block) => block,
            Err(e) => {
                warn!(key = %key, error = %e, "캐시 조회 실패, 전체 구간을 원격에서 수집");
                return Plan::full_fetch(request);
            }
        };

        let gaps = {
            let mut index = self.coverage.write().await;
            if persisted.is_empty() {
                // 커버리지 기록이 없는 기존 캐시: 들어 있는 바에서 보수적으로 유도
                for (bar_key, covered) in cached.coverage() {
                    index.mark_covered(&bar_key, covered);
                }
            } else {
                index.mark_all(&key, &persisted);
            }
            index.gaps(&key, span)
        };

        let subrequests: Vec<SubRequest> = gaps
            .into_iter()
            .map(|gap| SubRequest::from_request(request, gap))
            .collect();

        info!(
            key = %key,
            span = %span,
            cached_bars = cached.len(),
            gaps = subrequests.len(),
            "요청 분할 완료"
        );

        let mut cached = cached;
        cached.set_timezone(request.timezone);
        Plan { cached, subrequests }
    }
}

// =============================================================================
// 테스트
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use histfeed_core::{Bar, BarSize, DataType, TimeSpan};
    use rust_decimal_macros::dec;

    use crate::store::MemoryBarStore;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 9, d, 0, 0, 0).unwrap()
    }

    fn key() -> BlockKey {
        BlockKey::new("GS", DataType::Trades, BarSize::D1)
    }

    fn planner_with(store: Option<Arc<dyn BarStore>>) -> RequestPlanner {
        RequestPlanner::new(store, Arc::new(RwLock::new(CoverageIndex::new())))
    }

    async fn seeded_store() -> Arc<MemoryBarStore> {
        let store = Arc::new(MemoryBarStore::new());
        let mut block = DataBlock::new();
        // 8/31 ~ 9/5 커버, 바는 거래일에만 존재 (9/2~3 주말, 9/4 휴장)
        for d in [1, 5] {
            block.insert_bar(Bar::new("GS", DataType::Trades, BarSize::D1, day(d), dec!(100)));
        }
        block.insert_bar(Bar::new(
            "GS",
            DataType::Trades,
            BarSize::D1,
            Utc.with_ymd_and_hms(2017, 8, 31, 0, 0, 0).unwrap(),
            dec!(99),
        ));
        store.write(&block).await.unwrap();
        store
            .record_coverage(
                &key(),
                TimeSpan::new(Utc.with_ymd_and_hms(2017, 8, 31, 0, 0, 0).unwrap(), day(5)),
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_zero_length_request_yields_empty_plan() {
        let planner = planner_with(Some(seeded_store().await));
        let request = HistRequest::new("GS", BarSize::D1, Duration::zero(), day(8));

        let plan = planner.plan(&request).await;
        assert!(plan.is_cache_only());
        assert!(plan.cached.is_empty());
    }

    #[tokio::test]
    async fn test_no_store_bypasses_cache() {
        let planner = planner_with(None);
        let request = HistRequest::new("GS", BarSize::D1, Duration::days(10), day(8));

        let plan = planner.plan(&request).await;
        assert_eq!(plan.subrequests.len(), 1);
        assert_eq!(plan.subrequests[0].span, request.span());
        assert!(plan.cached.is_empty());
    }

    #[tokio::test]
    async fn test_sub_minute_bars_bypass_cache() {
        let planner = planner_with(Some(seeded_store().await));
        let request = HistRequest::new("GS", BarSize::S5, Duration::hours(1), day(8));

        let plan = planner.plan(&request).await;
        assert_eq!(plan.subrequests.len(), 1);
        assert_eq!(plan.subrequests[0].span, request.span());
    }

    #[tokio::test]
    async fn test_fully_covered_request_is_cache_only() {
        let planner = planner_with(Some(seeded_store().await));
        // 9/1 ~ 9/5, 커버리지 안쪽
        let request = HistRequest::new("GS", BarSize::D1, Duration::days(4), day(5));

        let plan = planner.plan(&request).await;
        assert!(plan.is_cache_only());
        assert_eq!(plan.cached.len(), 2);
    }

    #[tokio::test]
    async fn test_partially_covered_request_splits_into_gaps() {
        let planner = planner_with(Some(seeded_store().await));
        // 8/29 ~ 9/8, 커버리지는 8/31 ~ 9/5
        let request = HistRequest::new("GS", BarSize::D1, Duration::days(10), day(8));

        let plan = planner.plan(&request).await;
        assert_eq!(plan.subrequests.len(), 2);
        assert_eq!(
            plan.subrequests[0].span,
            TimeSpan::new(
                Utc.with_ymd_and_hms(2017, 8, 29, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2017, 8, 30, 0, 0, 0).unwrap()
            )
        );
        assert_eq!(plan.subrequests[1].span, TimeSpan::new(day(6), day(8)));
        assert_eq!(plan.cached.len(), 3);
    }

    #[tokio::test]
    async fn test_read_failure_degrades_to_full_fetch() {
        let store = seeded_store().await;
        store.set_fail_reads(true);
        let planner = planner_with(Some(store));
        let request = HistRequest::new("GS", BarSize::D1, Duration::days(4), day(5));

        let plan = planner.plan(&request).await;
        assert_eq!(plan.subrequests.len(), 1);
        assert_eq!(plan.subrequests[0].span, request.span());
        assert!(plan.cached.is_empty());
    }

    #[tokio::test]
    async fn test_coverage_derived_from_bars_when_no_record() {
        let store = Arc::new(MemoryBarStore::new());
        // 커버리지 기록 없이 연속된 바만 존재 (9/5 ~ 9/7)
        store
            .seed_bars(
                (5..=7)
                    .map(|d| Bar::new("GS", DataType::Trades, BarSize::D1, day(d), dec!(100)))
                    .collect(),
            )
            .await;
        let planner = planner_with(Some(store));
        let request = HistRequest::new("GS", BarSize::D1, Duration::days(3), day(8));

        let plan = planner.plan(&request).await;
        // 바 구간 [9/5, 9/7]이 커버리지로 유도되어 9/8만 갭
        assert_eq!(plan.subrequests.len(), 1);
        assert_eq!(plan.subrequests[0].span, TimeSpan::new(day(8), day(8)));
        assert_eq!(plan.cached.len(), 3);
    }
}

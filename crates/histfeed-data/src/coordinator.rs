//! 동시 수집 조정.
//!
//! 계획이 만든 갭 하위 요청들을 원격 소스로 보내는 단계입니다.
//!
//! # 주요 기능
//!
//! - **동시성 제한**: 세마포어로 동시 원격 호출 수를 제한
//! - **단일 비행**: 같은 키·같은 구간의 중복 수집을 하나로 합침
//! - **재시도**: 일시적 오류는 지수 백오프로 재시도, 영구 오류는 즉시 보고
//! - **캐시 기록**: 성공한 구간을 저장소와 커버리지 인덱스에 반영
//!
//! # 동작 흐름
//!
//! ```text
//! 하위 요청 목록
//!       │
//!       ▼ (하위 요청마다)
//! ┌────────────────────┐
//! │ 1. 비행 레지스트리  │ ← 이미 진행 중이면 그 결과를 공유
//! └─────────┬──────────┘
//!           │ 리더
//! ┌─────────▼──────────┐
//! │ 2. 세마포어 획득    │ ← 동시 호출 수 제한
//! └─────────┬──────────┘
//!           │
//! ┌─────────▼──────────┐
//! │ 3. 수집 + 재시도    │ ← 일시적 오류는 백오프 후 재시도
//! └─────────┬──────────┘
//!           │ 성공
//! ┌─────────▼──────────┐
//! │ 4. 정규화 + 절단    │ ← 구간 밖 데이터 제거
//! └─────────┬──────────┘
//!           │
//! ┌─────────▼──────────┐
//! │ 5. 캐시/커버리지 기록│ ← 실패해도 데이터는 반환
//! └─────────┬──────────┘
//!           ▼
//!      블록 병합 + 실패 목록
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, TimeZone, Utc};
use futures::future::join_all;
use tokio::sync::{watch, Mutex, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use histfeed_core::{AcquireConfig, RawTable, TimeSpan};
use histfeed_source::{BackoffCalculator, RemoteSource, RetryPolicy, SubRequest};

use crate::block::{BlockKey, DataBlock};
use crate::coverage::CoverageIndex;
use crate::error::DataError;
use crate::schema::SchemaOverrides;
use crate::store::BarStore;

type FetchResult = std::result::Result<DataBlock, DataError>;

// =============================================================================
// 비행 레지스트리
// =============================================================================

/// 진행 중인 수집을 식별하는 키.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FlightKey {
    key: BlockKey,
    span: TimeSpan,
}

impl FlightKey {
    fn from_subrequest(request: &SubRequest) -> Self {
        Self {
            key: BlockKey::new(&request.symbol, request.data_type, request.bar_size),
            span: request.span,
        }
    }
}

/// 레지스트리 확인 결과: 직접 수집하거나 진행 중인 수집에 합류.
enum FlightRole {
    Leader(watch::Sender<Option<FetchResult>>),
    Follower(FetchResult),
}

// =============================================================================
// 결과 타입
// =============================================================================

/// 하위 요청 단위의 실패 기록.
///
/// 실패한 구간을 함께 보고하므로 호출자는 어느 구간이 비었는지 알 수
/// 있습니다.
#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub request: SubRequest,
    pub error: DataError,
}

/// 수집 호출의 집계 결과.
///
/// 일부 하위 요청이 실패해도 성공한 구간의 데이터는 `block`에 담겨
/// 반환됩니다.
#[derive(Debug, Default)]
pub struct AcquireOutcome {
    pub block: DataBlock,
    pub errors: Vec<FetchFailure>,
    /// 원격에서 새로 받은 바 수
    pub fetched_bars: usize,
    /// 캐시에 기록된 행 수
    pub rows_written: usize,
}

struct SubOutcome {
    request: SubRequest,
    block: Option<DataBlock>,
    errors: Vec<DataError>,
    rows_written: usize,
}

// =============================================================================
// 조정자
// =============================================================================

/// 갭 하위 요청의 동시 수집을 조정합니다.
pub struct FetchCoordinator {
    source: Arc<dyn RemoteSource>,
    store: Option<Arc<dyn BarStore>>,
    coverage: Arc<RwLock<CoverageIndex>>,
    inflight: Mutex<HashMap<FlightKey, watch::Receiver<Option<FetchResult>>>>,
    semaphore: Semaphore,
    backoff: BackoffCalculator,
}

impl FetchCoordinator {
    pub fn new(
        source: Arc<dyn RemoteSource>,
        store: Option<Arc<dyn BarStore>>,
        coverage: Arc<RwLock<CoverageIndex>>,
        config: &AcquireConfig,
    ) -> Self {
        let policy = RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: StdDuration::from_millis(config.initial_backoff_ms),
            max_backoff: StdDuration::from_millis(config.max_backoff_ms),
            backoff_multiplier: config.backoff_multiplier,
            jitter_factor: config.jitter_factor,
        };

        Self {
            source,
            store,
            coverage,
            inflight: Mutex::new(HashMap::new()),
            semaphore: Semaphore::new(config.max_concurrent_fetches.max(1)),
            backoff: BackoffCalculator::new(policy),
        }
    }

    /// 하위 요청들을 동시 수집하고 결과를 하나의 블록으로 병합합니다.
    pub async fn acquire(&self, subrequests: Vec<SubRequest>) -> AcquireOutcome {
        self.acquire_with_cancel(subrequests, CancellationToken::new())
            .await
    }

    /// 취소 토큰과 함께 수집합니다.
    ///
    /// 취소 시 이미 끝난 하위 요청의 데이터는 유지되고, 끝나지 않은
    /// 하위 요청은 [`DataError::Cancelled`]로 보고됩니다.
    #[instrument(skip(self, subrequests, cancel), fields(count = subrequests.len()))]
    pub async fn acquire_with_cancel(
        &self,
        subrequests: Vec<SubRequest>,
        cancel: CancellationToken,
    ) -> AcquireOutcome {
        if subrequests.is_empty() {
            return AcquireOutcome::default();
        }

        let tasks = subrequests
            .into_iter()
            .map(|request| self.run_one(request, cancel.clone()));
        let outcomes = join_all(tasks).await;

        let mut result = AcquireOutcome::default();
        for outcome in outcomes {
            if let Some(block) = outcome.block {
                result.fetched_bars += block.len();
                result.block.combine(block);
            }
            result.rows_written += outcome.rows_written;
            result
                .errors
                .extend(outcome.errors.into_iter().map(|error| FetchFailure {
                    request: outcome.request.clone(),
                    error,
                }));
        }

        info!(
            fetched_bars = result.fetched_bars,
            rows_written = result.rows_written,
            failures = result.errors.len(),
            "원격 수집 완료"
        );

        result
    }

    async fn run_one(&self, request: SubRequest, cancel: CancellationToken) -> SubOutcome {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(request = %request, "수집 취소됨");
                SubOutcome {
                    errors: vec![DataError::Cancelled(request.to_string())],
                    request,
                    block: None,
                    rows_written: 0,
                }
            }
            outcome = self.run_subrequest(request.clone()) => outcome,
        }
    }

    async fn run_subrequest(&self, request: SubRequest) -> SubOutcome {
        let flight = FlightKey::from_subrequest(&request);

        match self.join_or_lead(&flight).await {
            FlightRole::Follower(Ok(block)) => SubOutcome {
                request,
                block: Some(block),
                errors: Vec::new(),
                rows_written: 0,
            },
            FlightRole::Follower(Err(err)) => SubOutcome {
                request,
                block: None,
                errors: vec![err],
                rows_written: 0,
            },
            FlightRole::Leader(tx) => {
                let result = self.fetch_with_retry(&request).await;

                // 합류한 대기자들에게 결과를 전달한 뒤 레지스트리에서 제거
                let _ = tx.send(Some(result.clone()));
                self.inflight.lock().await.remove(&flight);

                match result {
                    Ok(block) => {
                        let (rows_written, errors) = self.persist(&request, &block).await;
                        SubOutcome {
                            request,
                            block: Some(block),
                            errors,
                            rows_written,
                        }
                    }
                    Err(err) => SubOutcome {
                        request,
                        block: None,
                        errors: vec![err],
                        rows_written: 0,
                    },
                }
            }
        }
    }

    /// 비행 레지스트리를 확인하여 리더가 되거나 진행 중인 수집에 합류합니다.
    ///
    /// 리더가 결과를 보내지 않고 종료된 경우(취소 등) 대기자 중 하나가
    /// 스테일 엔트리를 정리하고 새 리더가 됩니다.
    async fn join_or_lead(&self, flight: &FlightKey) -> FlightRole {
        loop {
            let mut registry = self.inflight.lock().await;
            let existing = match registry.get(flight) {
                Some(rx) => rx.clone(),
                None => {
                    let (tx, rx) = watch::channel(None);
                    registry.insert(flight.clone(), rx);
                    return FlightRole::Leader(tx);
                }
            };
            drop(registry);

            debug!(key = %flight.key, span = %flight.span, "진행 중인 동일 수집에 합류");
            let mut rx = existing;
            loop {
                if let Some(result) = rx.borrow_and_update().clone() {
                    return FlightRole::Follower(result);
                }
                if rx.changed().await.is_err() {
                    let mut registry = self.inflight.lock().await;
                    if let Some(entry) = registry.get(flight) {
                        if entry.has_changed().is_err() {
                            registry.remove(flight);
                        }
                    }
                    break;
                }
            }
        }
    }

    /// 세마포어 제한 아래에서 수집하고 일시적 오류를 재시도합니다.
    async fn fetch_with_retry(&self, request: &SubRequest) -> FetchResult {
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => return Err(DataError::Cancelled("fetch semaphore closed".to_string())),
        };

        let mut attempt: u32 = 0;
        loop {
            match self.source.fetch(request).await {
                Ok(table) => {
                    debug!(request = %request, rows = table.len(), "원격 수집 성공");
                    return self.table_to_block(request, &table);
                }
                Err(err) if err.is_fatal() || !err.is_retryable() => {
                    warn!(request = %request, error = %err, "영구 수집 실패");
                    return Err(DataError::PermanentFetch(format!("{}: {}", request, err)));
                }
                Err(err) => match self.backoff.next_backoff(attempt) {
                    Some(delay) => {
                        // 소스가 더 긴 대기를 제안하면 그쪽을 따른다
                        let delay = match err.retry_delay_ms() {
                            Some(ms) if StdDuration::from_millis(ms) > delay => {
                                StdDuration::from_millis(ms)
                            }
                            _ => delay,
                        };
                        attempt += 1;
                        warn!(
                            request = %request,
                            attempt = attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "일시적 오류, 재시도 대기"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        let attempts = attempt + 1;
                        warn!(request = %request, attempts = attempts, error = %err, "재시도 한도 소진");
                        return Err(DataError::FetchFailed {
                            attempts,
                            reason: err.to_string(),
                        });
                    }
                },
            }
        }
    }

    /// 원시 테이블을 정규화하고 요청 구간 밖의 바를 제거합니다.
    fn table_to_block(&self, request: &SubRequest, table: &RawTable) -> FetchResult {
        let overrides = SchemaOverrides::new()
            .symbol(request.symbol.clone())
            .data_type(request.data_type)
            .bar_size(request.bar_size)
            .timezone(request.timezone);

        let mut block = DataBlock::from_table(table, &overrides)?;
        block.clamp(request.span);
        Ok(block)
    }

    /// 수집 성공 구간을 저장소와 커버리지 인덱스에 반영합니다.
    ///
    /// 바가 없는 구간(휴장일만 포함)도 커버리지는 기록합니다. 기록이
    /// 실패하면 커버리지를 갱신하지 않고 실패를 보고하되, 데이터 자체는
    /// 호출자에게 그대로 반환됩니다.
    async fn persist(&self, request: &SubRequest, block: &DataBlock) -> (usize, Vec<DataError>) {
        let Some(store) = &self.store else {
            return (0, Vec::new());
        };
        if !request.bar_size.is_cacheable() {
            return (0, Vec::new());
        }

        let key = BlockKey::new(&request.symbol, request.data_type, request.bar_size);

        let rows = if block.is_empty() {
            0
        } else {
            match store.write(block).await {
                Ok(rows) => rows,
                Err(err) => {
                    warn!(key = %key, error = %err, "캐시 기록 실패, 커버리지를 갱신하지 않음");
                    return (0, vec![DataError::CacheUnavailable(err.to_string())]);
                }
            }
        };

        let covered = closed_span(request.span, request.bar_size.step());
        if !covered.is_empty() {
            if let Err(err) = store.record_coverage(&key, covered).await {
                warn!(key = %key, error = %err, "커버리지 기록 실패");
            }
            self.coverage.write().await.mark_covered(&key, covered);
        }

        (rows, Vec::new())
    }
}

// =============================================================================
// 헬퍼 함수
// =============================================================================

/// 커버리지로 기록할 구간.
///
/// 마지막 바가 아직 닫히지 않았을 수 있으므로 구간 끝을 마지막으로
/// 닫힌 바 시각까지로 자릅니다. 현재 진행 중인 바는 다음 요청에서
/// 다시 받습니다.
fn closed_span(span: TimeSpan, step: chrono::Duration) -> TimeSpan {
    let last_closed = floor_to_step(Utc::now(), step) - step;
    TimeSpan::new(span.start, span.end.min(last_closed))
}

fn floor_to_step(time: DateTime<Utc>, step: chrono::Duration) -> DateTime<Utc> {
    let secs = step.num_seconds().max(1);
    let floored = time.timestamp() - time.timestamp().rem_euclid(secs);
    Utc.timestamp_opt(floored, 0).single().unwrap_or(time)
}

// =============================================================================
// 테스트
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use histfeed_core::{BarSize, DataType, HistRequest};
    use histfeed_source::{SimulatedSource, SourceError};

    use crate::store::MemoryBarStore;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 9, d, 0, 0, 0).unwrap()
    }

    fn subrequest(from: u32, to: u32) -> SubRequest {
        let request = HistRequest::new("GS", BarSize::D1, Duration::days(1), day(to));
        SubRequest::from_request(&request, TimeSpan::new(day(from), day(to)))
    }

    fn coordinator(source: Arc<SimulatedSource>, store: Option<Arc<dyn BarStore>>) -> FetchCoordinator {
        FetchCoordinator::new(
            source,
            store,
            Arc::new(RwLock::new(CoverageIndex::new())),
            &AcquireConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried_until_success() {
        let source = Arc::new(SimulatedSource::new());
        source
            .push_failures(vec![
                SourceError::Timeout("slow".to_string()),
                SourceError::Timeout("slow".to_string()),
            ])
            .await;

        let coordinator = coordinator(source.clone(), None);
        let outcome = coordinator.acquire(vec![subrequest(5, 7)]).await;

        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.block.len(), 3);
        // 실패 2회 + 성공 1회
        assert_eq!(source.fetch_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_exhaustion_reports_attempts() {
        let source = Arc::new(SimulatedSource::new());
        source
            .push_failures(vec![
                SourceError::Timeout("slow".to_string()),
                SourceError::Timeout("slow".to_string()),
                SourceError::Timeout("slow".to_string()),
            ])
            .await;

        let coordinator = coordinator(source.clone(), None);
        let outcome = coordinator.acquire(vec![subrequest(5, 7)]).await;

        assert!(outcome.block.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        match &outcome.errors[0].error {
            DataError::FetchFailed { attempts, .. } => assert_eq!(*attempts, 3),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(source.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let source = Arc::new(SimulatedSource::new());
        source
            .push_failure(SourceError::InvalidSymbol("NOPE".to_string()))
            .await;

        let coordinator = coordinator(source.clone(), None);
        let outcome = coordinator.acquire(vec![subrequest(5, 7)]).await;

        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(
            outcome.errors[0].error,
            DataError::PermanentFetch(_)
        ));
        assert_eq!(outcome.errors[0].request.span, TimeSpan::new(day(5), day(7)));
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_span_is_still_marked_covered() {
        let source = Arc::new(SimulatedSource::new());
        let store = Arc::new(MemoryBarStore::new());
        let coverage = Arc::new(RwLock::new(CoverageIndex::new()));
        let coordinator = FetchCoordinator::new(
            source,
            Some(store.clone()),
            coverage.clone(),
            &AcquireConfig::default(),
        );

        // 9/2(토) ~ 9/3(일): 바가 생성되지 않는 구간
        let outcome = coordinator.acquire(vec![subrequest(2, 3)]).await;
        assert!(outcome.errors.is_empty());
        assert!(outcome.block.is_empty());
        assert_eq!(outcome.rows_written, 0);

        let key = BlockKey::new("GS", DataType::Trades, BarSize::D1);
        let span = TimeSpan::new(day(2), day(3));
        assert!(coverage.read().await.is_covered(&key, span));
        assert_eq!(store.coverage(&key).await.unwrap(), vec![span]);
    }

    #[tokio::test]
    async fn test_write_failure_does_not_advance_coverage() {
        let source = Arc::new(SimulatedSource::new());
        let store = Arc::new(MemoryBarStore::new());
        store.set_fail_writes(true);
        let coverage = Arc::new(RwLock::new(CoverageIndex::new()));
        let coordinator = FetchCoordinator::new(
            source,
            Some(store.clone()),
            coverage.clone(),
            &AcquireConfig::default(),
        );

        let outcome = coordinator.acquire(vec![subrequest(5, 7)]).await;

        // 데이터는 반환되고 실패는 보고되며 커버리지는 그대로
        assert_eq!(outcome.block.len(), 3);
        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(
            outcome.errors[0].error,
            DataError::CacheUnavailable(_)
        ));

        let key = BlockKey::new("GS", DataType::Trades, BarSize::D1);
        assert!(!coverage.read().await.is_covered(&key, TimeSpan::new(day(5), day(7))));
        assert!(store.coverage(&key).await.unwrap().is_empty());
    }
}

//! 과거 시세 수집 관리자.
//!
//! 계획, 수집, 병합을 하나의 진입점으로 묶습니다.
//!
//! # 동작 흐름
//!
//! ```text
//! acquire(요청)
//!       │
//! ┌─────▼──────────────┐
//! │ 1. 요청 분할        │ ← 커버리지/캐시 조회
//! └─────┬──────────────┘
//!       │ 캐시 블록 + 갭 목록
//! ┌─────▼──────────────┐
//! │ 2. 갭 동시 수집     │ ← 재시도, 단일 비행, 캐시 기록
//! └─────┬──────────────┘
//!       │
//! ┌─────▼──────────────┐
//! │ 3. 병합 + 절단      │ ← 요청 구간으로 잘라 반환
//! └────────────────────┘
//! ```
//!
//! # 사용 예제
//!
//! ```rust,ignore
//! use histfeed_data::HistDataManager;
//!
//! let manager = HistDataManager::new(source, store, AcquireConfig::default());
//! let result = manager.acquire(&request).await;
//! ```

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use histfeed_core::{AcquireConfig, DatabaseConfig, HistRequest};
use histfeed_source::RemoteSource;

use crate::block::DataBlock;
use crate::coordinator::{FetchCoordinator, FetchFailure};
use crate::coverage::CoverageIndex;
use crate::planner::{Plan, RequestPlanner};
use crate::store::{BarStore, PgBarStore};

// =============================================================================
// 결과 타입
// =============================================================================

/// 수집 호출 통계.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AcquireStats {
    pub planned_subrequests: usize,
    pub cached_bars: usize,
    pub fetched_bars: usize,
    pub rows_written: usize,
    pub elapsed_ms: u64,
}

/// 수집 호출의 최종 결과.
///
/// 일부 하위 요청이 실패해도 성공한 구간의 데이터는 `block`에 담겨
/// 있습니다. 어떤 구간이 비었는지는 `errors`로 확인합니다.
#[derive(Debug)]
pub struct Acquisition {
    pub block: DataBlock,
    pub errors: Vec<FetchFailure>,
    pub stats: AcquireStats,
}

impl Acquisition {
    /// 모든 하위 요청이 성공했는지 여부.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// 구성 요소 상태.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub store_configured: bool,
    pub store_healthy: bool,
    pub overall: bool,
}

// =============================================================================
// 관리자
// =============================================================================

/// 과거 바 데이터 수집의 중앙 진입점.
pub struct HistDataManager {
    planner: RequestPlanner,
    coordinator: FetchCoordinator,
    store: Option<Arc<dyn BarStore>>,
}

impl HistDataManager {
    /// 새 관리자를 생성합니다.
    ///
    /// 저장소가 없으면 모든 요청이 원격 수집으로 우회됩니다.
    pub fn new(
        source: Arc<dyn RemoteSource>,
        store: Option<Arc<dyn BarStore>>,
        config: AcquireConfig,
    ) -> Self {
        if store.is_none() {
            warn!("저장소 없이 동작합니다. 모든 요청을 원격에서 수집합니다");
        }

        let coverage = Arc::new(RwLock::new(CoverageIndex::new()));
        let planner = RequestPlanner::new(store.clone(), coverage.clone());
        let coordinator = FetchCoordinator::new(source, store.clone(), coverage, &config);

        Self {
            planner,
            coordinator,
            store,
        }
    }

    /// PostgreSQL 저장소에 연결하여 관리자를 생성합니다.
    ///
    /// 연결에 실패하면 경고 후 저장소 없이 계속합니다.
    pub async fn with_database_url(
        source: Arc<dyn RemoteSource>,
        database_url: &str,
        db_config: &DatabaseConfig,
        config: AcquireConfig,
    ) -> Self {
        let store: Option<Arc<dyn BarStore>> =
            match PgBarStore::connect(database_url, db_config).await {
                Ok(store) => {
                    info!("Bar store connected");
                    Some(Arc::new(store))
                }
                Err(e) => {
                    warn!(
                        "Failed to connect to bar store: {}. Continuing without cache.",
                        e
                    );
                    None
                }
            };

        Self::new(source, store, config)
    }

    /// 요청 구간의 바를 수집합니다.
    ///
    /// 캐시에 있는 부분은 캐시에서 읽고, 빠진 갭만 원격에서 받아
    /// 하나의 블록으로 병합합니다. 결과는 요청 구간으로 잘려 있고
    /// 시간 오름차순이며 중복이 없습니다.
    pub async fn acquire(&self, request: &HistRequest) -> Acquisition {
        self.acquire_with_cancel(request, CancellationToken::new())
            .await
    }

    /// 취소 토큰과 함께 수집합니다.
    ///
    /// 취소 시 그때까지 완료된 부분 결과가 반환되고, 끝나지 않은
    /// 하위 요청은 실패 목록에 취소로 기록됩니다.
    #[instrument(skip(self, request, cancel), fields(symbol = %request.symbol, bar_size = %request.bar_size))]
    pub async fn acquire_with_cancel(
        &self,
        request: &HistRequest,
        cancel: CancellationToken,
    ) -> Acquisition {
        let started = Instant::now();
        let span = request.span();

        let Plan {
            cached,
            subrequests,
        } = self.planner.plan(request).await;

        let planned_subrequests = subrequests.len();
        let cached_bars = cached.len();

        let mut block = cached;
        let mut errors = Vec::new();
        let mut fetched_bars = 0;
        let mut rows_written = 0;

        if subrequests.is_empty() {
            debug!(symbol = %request.symbol, "캐시만으로 요청 충족");
        } else {
            let outcome = self
                .coordinator
                .acquire_with_cancel(subrequests, cancel)
                .await;
            fetched_bars = outcome.fetched_bars;
            rows_written = outcome.rows_written;
            errors = outcome.errors;
            block.combine(outcome.block);
        }

        block.clamp(span);
        block.set_timezone(request.timezone);

        let stats = AcquireStats {
            planned_subrequests,
            cached_bars,
            fetched_bars,
            rows_written,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            planned = stats.planned_subrequests,
            cached = stats.cached_bars,
            fetched = stats.fetched_bars,
            failures = errors.len(),
            elapsed_ms = stats.elapsed_ms,
            "수집 완료"
        );

        Acquisition {
            block,
            errors,
            stats,
        }
    }

    /// 구성 요소 상태를 확인합니다.
    pub async fn health_check(&self) -> HealthStatus {
        let store_configured = self.store.is_some();
        let store_healthy = match &self.store {
            Some(store) => store.ping().await.is_ok(),
            None => true, // 저장소가 없는 것은 비정상이 아님
        };

        HealthStatus {
            store_configured,
            store_healthy,
            overall: store_healthy,
        }
    }
}

// =============================================================================
// 테스트
// =============================================================================

//! 시뮬레이션 원격 소스.
//!
//! 네트워크 없이 수집 파이프라인을 구동하기 위한 스크립트형 소스입니다.
//! 구간에 맞는 결정적 바 생성, 실패 주입, 인위적 지연, 호출 횟수 추적을
//! 지원하며 테스트와 오프라인 작업에 사용합니다.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::Mutex;

use histfeed_core::{RawTable, RawValue, TimeSpan};

use crate::remote::{RemoteSource, SubRequest};
use crate::SourceError;

/// 시뮬레이션 소스 설정.
#[derive(Debug, Clone)]
pub struct SimulatedSourceConfig {
    /// 생성 가격의 기준값
    pub base_price: Decimal,
    /// 바 순번당 가격 증가폭
    pub price_step: Decimal,
    /// 주말 바 생성 여부
    pub include_weekends: bool,
    /// 바를 생성하지 않을 휴장일
    pub holidays: Vec<NaiveDate>,
    /// 응답 전 인위적 지연
    pub latency: Option<Duration>,
}

impl Default for SimulatedSourceConfig {
    fn default() -> Self {
        Self {
            base_price: dec!(100),
            price_step: dec!(0.25),
            include_weekends: false,
            holidays: Vec::new(),
            latency: None,
        }
    }
}

/// 스크립트형 시뮬레이션 소스.
///
/// 같은 타임스탬프에는 항상 같은 바를 생성하므로, 겹치는 구간을
/// 여러 번 수집해도 병합 결과가 달라지지 않습니다.
pub struct SimulatedSource {
    config: SimulatedSourceConfig,
    /// 다음 호출들이 순서대로 반환할 실패 스크립트
    failures: Mutex<VecDeque<SourceError>>,
    /// 수집에 성공/실패한 구간 기록
    fetched_spans: Mutex<Vec<TimeSpan>>,
    /// 누적 fetch 호출 수
    fetch_count: AtomicUsize,
}

impl SimulatedSource {
    /// 기본 설정으로 소스를 생성합니다.
    pub fn new() -> Self {
        Self::with_config(SimulatedSourceConfig::default())
    }

    /// 주어진 설정으로 소스를 생성합니다.
    pub fn with_config(config: SimulatedSourceConfig) -> Self {
        Self {
            config,
            failures: Mutex::new(VecDeque::new()),
            fetched_spans: Mutex::new(Vec::new()),
            fetch_count: AtomicUsize::new(0),
        }
    }

    /// 다음 fetch 호출이 반환할 실패를 예약합니다.
    ///
    /// 예약된 실패가 모두 소진되면 이후 호출은 정상 데이터를 반환합니다.
    pub async fn push_failure(&self, error: SourceError) {
        self.failures.lock().await.push_back(error);
    }

    /// 여러 실패를 순서대로 예약합니다.
    pub async fn push_failures(&self, errors: impl IntoIterator<Item = SourceError>) {
        let mut queue = self.failures.lock().await;
        queue.extend(errors);
    }

    /// 지금까지의 fetch 호출 수를 반환합니다.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// 지금까지 요청된 구간 목록을 반환합니다.
    pub async fn fetched_spans(&self) -> Vec<TimeSpan> {
        self.fetched_spans.lock().await.clone()
    }

    /// 구간에 맞는 결정적 바 테이블을 생성합니다.
    fn generate_table(&self, request: &SubRequest) -> RawTable {
        let step = request.bar_size.step();
        let step_secs = step.num_seconds().max(1);

        let mut table = RawTable::new(vec!["time", "open", "high", "low", "close", "volume"]);
        let mut time = request.span.start;
        while time <= request.span.end {
            if self.emits_bar_at(time) {
                let price = self.price_at(time, step_secs);
                table.push_row(vec![
                    RawValue::Time(time),
                    RawValue::Decimal(price),
                    RawValue::Decimal(price + self.config.price_step),
                    RawValue::Decimal(price - self.config.price_step),
                    RawValue::Decimal(price),
                    RawValue::Int(1000 + (time.timestamp() / step_secs) % 100),
                ]);
            }
            time += step;
        }

        table
    }

    /// 해당 시각에 바를 생성할지 결정합니다.
    fn emits_bar_at(&self, time: DateTime<Utc>) -> bool {
        if !self.config.include_weekends
            && matches!(time.weekday(), Weekday::Sat | Weekday::Sun)
        {
            return false;
        }
        !self.config.holidays.contains(&time.date_naive())
    }

    /// 타임스탬프에 결정적으로 대응하는 가격을 계산합니다.
    fn price_at(&self, time: DateTime<Utc>, step_secs: i64) -> Decimal {
        let sequence = (time.timestamp() / step_secs) % 1000;
        self.config.base_price + self.config.price_step * Decimal::from(sequence)
    }
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteSource for SimulatedSource {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn fetch(&self, request: &SubRequest) -> Result<RawTable, SourceError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        self.fetched_spans.lock().await.push(request.span);

        if let Some(latency) = self.config.latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(error) = self.failures.lock().await.pop_front() {
            return Err(error);
        }

        Ok(self.generate_table(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use histfeed_core::{BarSize, HistRequest};

    fn daily_request(start_day: u32, end_day: u32) -> SubRequest {
        let start = Utc.with_ymd_and_hms(2017, 9, start_day, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2017, 9, end_day, 0, 0, 0).unwrap();
        let request = HistRequest::new("GS", BarSize::D1, end - start, end);
        SubRequest::from_request(&request, TimeSpan::new(start, end))
    }

    #[tokio::test]
    async fn test_generates_weekday_bars_only() {
        let source = SimulatedSource::new();
        // 2017-09-01(금) ~ 2017-09-05(화), 주말인 2~3일은 제외
        let table = source.fetch(&daily_request(1, 5)).await.unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_holiday_excluded() {
        let source = SimulatedSource::with_config(SimulatedSourceConfig {
            holidays: vec![NaiveDate::from_ymd_opt(2017, 9, 4).unwrap()],
            ..Default::default()
        });

        // 9월 4일(노동절)이 빠져 1일과 5일만 남는다
        let table = source.fetch(&daily_request(1, 5)).await.unwrap();
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_script_pops_in_order() {
        let source = SimulatedSource::new();
        source
            .push_failures([
                SourceError::Timeout("first".to_string()),
                SourceError::Timeout("second".to_string()),
            ])
            .await;

        let request = daily_request(1, 5);
        assert!(matches!(
            source.fetch(&request).await,
            Err(SourceError::Timeout(msg)) if msg == "first"
        ));
        assert!(matches!(
            source.fetch(&request).await,
            Err(SourceError::Timeout(msg)) if msg == "second"
        ));
        assert!(source.fetch(&request).await.is_ok());
        assert_eq!(source.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_deterministic_prices() {
        let source = SimulatedSource::new();
        let request = daily_request(5, 8);

        let first = source.fetch(&request).await.unwrap();
        let second = source.fetch(&request).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_request_span_recorded() {
        let source = SimulatedSource::new();
        let request = daily_request(1, 5);
        source.fetch(&request).await.unwrap();

        let spans = source.fetched_spans().await;
        assert_eq!(spans, vec![request.span]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_applied() {
        let source = SimulatedSource::with_config(SimulatedSourceConfig {
            latency: Some(Duration::from_millis(250)),
            ..Default::default()
        });

        let before = tokio::time::Instant::now();
        source.fetch(&daily_request(1, 5)).await.unwrap();
        assert!(before.elapsed() >= Duration::from_millis(250));
    }
}

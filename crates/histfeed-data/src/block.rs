//! 표준 바 컨테이너.
//!
//! 정규화된 바를 `(심볼, 데이터 종류, 바 크기)` 키별 시계열로 보관합니다.
//! 같은 키·같은 시각의 바는 하나만 유지되며(나중 값 우선), 키 내부는
//! 항상 시간 오름차순입니다. 서로 다른 소스에서 온 테이블을 반복해서
//! 병합해도 결과는 같은 표준 형태가 됩니다.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::Serialize;

use histfeed_core::{Bar, BarSize, DataType, RawTable, TimeSpan};

use crate::error::Result;
use crate::schema::{normalize_table, SchemaOverrides};

// =============================================================================
// 블록 키
// =============================================================================

/// 바 시계열을 식별하는 키.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BlockKey {
    pub symbol: String,
    pub data_type: DataType,
    pub bar_size: BarSize,
}

impl BlockKey {
    pub fn new(symbol: impl Into<String>, data_type: DataType, bar_size: BarSize) -> Self {
        Self {
            symbol: symbol.into(),
            data_type,
            bar_size,
        }
    }

    pub fn from_bar(bar: &Bar) -> Self {
        Self {
            symbol: bar.symbol.clone(),
            data_type: bar.data_type,
            bar_size: bar.bar_size,
        }
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.symbol, self.data_type, self.bar_size)
    }
}

// =============================================================================
// 데이터 블록
// =============================================================================

/// 내보내기용 평면 행. 시각은 블록의 표시 타임존으로 변환된 상태입니다.
#[derive(Debug, Clone, Serialize)]
pub struct ExportRow {
    pub symbol: String,
    pub data_type: DataType,
    pub bar_size: BarSize,
    pub time: DateTime<Tz>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
    pub bar_count: i64,
    pub average: Decimal,
}

/// 키별 바 시계열의 묶음.
///
/// 내부 시각은 항상 UTC이며, 표시 타임존은 내보내기 시점에만 적용됩니다.
#[derive(Debug, Clone)]
pub struct DataBlock {
    series: BTreeMap<BlockKey, BTreeMap<DateTime<Utc>, Bar>>,
    timezone: Tz,
}

impl Default for DataBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl DataBlock {
    /// 빈 블록 생성 (표시 타임존 UTC).
    pub fn new() -> Self {
        Self {
            series: BTreeMap::new(),
            timezone: Tz::UTC,
        }
    }

    pub fn with_timezone(timezone: Tz) -> Self {
        Self {
            series: BTreeMap::new(),
            timezone,
        }
    }

    /// 원시 테이블을 정규화하여 새 블록을 만듭니다.
    pub fn from_table(table: &RawTable, overrides: &SchemaOverrides) -> Result<Self> {
        let mut block = Self::new();
        if let Some(tz) = overrides.timezone {
            block.timezone = tz;
        }
        block.update(table, overrides)?;
        Ok(block)
    }

    /// 원시 테이블을 정규화하여 블록에 병합합니다.
    ///
    /// 같은 키·같은 시각의 기존 바는 새 값으로 교체됩니다. 같은 입력을
    /// 두 번 병합해도 결과는 변하지 않습니다. 처리한 바 수를 반환합니다.
    pub fn update(&mut self, table: &RawTable, overrides: &SchemaOverrides) -> Result<usize> {
        let bars = normalize_table(table, overrides)?;
        let count = bars.len();
        self.insert_bars(bars);
        Ok(count)
    }

    /// 정규화된 바들을 병합합니다 (나중 값 우선).
    pub fn insert_bars(&mut self, bars: Vec<Bar>) {
        for bar in bars {
            self.insert_bar(bar);
        }
    }

    pub fn insert_bar(&mut self, bar: Bar) {
        self.series
            .entry(BlockKey::from_bar(&bar))
            .or_default()
            .insert(bar.time, bar);
    }

    /// 다른 블록을 이 블록에 병합합니다. 충돌 시 `other`의 바가 우선합니다.
    pub fn combine(&mut self, other: DataBlock) {
        for (key, bars) in other.series {
            self.series.entry(key).or_default().extend(bars);
        }
    }

    /// 키의 구간 내 바를 시간 오름차순으로 반환합니다 (경계 포함).
    pub fn query(&self, key: &BlockKey, span: TimeSpan) -> Vec<Bar> {
        if span.is_empty() {
            return Vec::new();
        }
        match self.series.get(key) {
            Some(bars) => bars.range(span.start..=span.end).map(|(_, b)| b.clone()).collect(),
            None => Vec::new(),
        }
    }

    /// 키의 모든 바를 시간 오름차순으로 반환합니다.
    pub fn bars(&self, key: &BlockKey) -> Vec<Bar> {
        self.series
            .get(key)
            .map(|bars| bars.values().cloned().collect())
            .unwrap_or_default()
    }

    /// 실제로 들어 있는 바로부터 키별 연속 구간을 계산합니다.
    ///
    /// 이웃한 바 사이 간격이 바 크기 한 스텝 이하인 동안 하나의 구간으로
    /// 이어집니다. 영속 커버리지 기록이 없는 캐시를 시딩할 때의 보수적
    /// 근사로 사용됩니다 (주말·휴장일은 구간을 끊습니다).
    pub fn coverage(&self) -> Vec<(BlockKey, TimeSpan)> {
        let mut spans = Vec::new();
        for (key, bars) in &self.series {
            let step = key.bar_size.step();
            let mut start: Option<DateTime<Utc>> = None;
            let mut prev: Option<DateTime<Utc>> = None;
            for &time in bars.keys() {
                match prev {
                    Some(p) if time - p <= step => {}
                    Some(p) => {
                        if let Some(s) = start {
                            spans.push((key.clone(), TimeSpan::new(s, p)));
                        }
                        start = Some(time);
                    }
                    None => start = Some(time),
                }
                prev = Some(time);
            }
            if let (Some(s), Some(p)) = (start, prev) {
                spans.push((key.clone(), TimeSpan::new(s, p)));
            }
        }
        spans
    }

    /// 구간 밖의 바를 모두 제거합니다.
    pub fn clamp(&mut self, span: TimeSpan) {
        for bars in self.series.values_mut() {
            bars.retain(|time, _| span.contains(*time));
        }
        self.series.retain(|_, bars| !bars.is_empty());
    }

    /// 키의 구간 내 바를 표시 타임존이 적용된 평면 행으로 내보냅니다.
    pub fn export(&self, key: &BlockKey, span: TimeSpan) -> Vec<ExportRow> {
        self.query(key, span)
            .into_iter()
            .map(|bar| ExportRow {
                symbol: bar.symbol,
                data_type: bar.data_type,
                bar_size: bar.bar_size,
                time: bar.time.with_timezone(&self.timezone),
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
                bar_count: bar.bar_count,
                average: bar.average,
            })
            .collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &BlockKey> {
        self.series.keys()
    }

    /// 전체 바 수.
    pub fn len(&self) -> usize {
        self.series.values().map(|bars| bars.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.series.values().all(|bars| bars.is_empty())
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn set_timezone(&mut self, timezone: Tz) {
        self.timezone = timezone;
    }
}

// =============================================================================
// 테스트
// =============================================================================

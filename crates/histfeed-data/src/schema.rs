//! 바 스키마 정규화.
//!
//! 원격 소스마다 다른 컬럼 이름과 값 형식의 테이블을 표준 [`Bar`]
//! 시퀀스로 변환합니다. 컬럼 이름 해석은 대소문자를 구분하지 않으며
//! 필드별 별칭 표를 따릅니다. 입력 테이블에 없는 키 필드(심볼,
//! 데이터 종류, 바 크기)는 오버라이드로 보충할 수 있습니다.
//!
//! 타임스탬프는 내부적으로 항상 UTC 절대 시각입니다. 타임존이 없는
//! (naive) 타임스탬프는 오버라이드 타임존이 있을 때만 해석됩니다.

use std::collections::HashMap;

use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;

use histfeed_core::{Bar, BarSize, DataType, RawTable, RawValue, MISSING_INT};

use crate::error::{DataError, Result};

// =============================================================================
// 필드 별칭
// =============================================================================

/// 표준 바 필드.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    Symbol,
    DataType,
    BarSize,
    Time,
    Open,
    High,
    Low,
    Close,
    Volume,
    BarCount,
    Average,
}

/// 컬럼 이름을 표준 필드로 해석합니다. 알 수 없는 컬럼은 무시됩니다.
fn canonical_field(name: &str) -> Option<Field> {
    match name.to_lowercase().as_str() {
        "symbol" | "symb" | "sym" | "ticker" => Some(Field::Symbol),
        "datatype" | "data_type" => Some(Field::DataType),
        "barsize" | "bar_size" | "bar" => Some(Field::BarSize),
        "tickertime" | "ticktime" | "date" | "time" | "datetime" | "timestamp" => {
            Some(Field::Time)
        }
        "open" | "opening" | "o" => Some(Field::Open),
        "high" | "h" => Some(Field::High),
        "low" | "l" => Some(Field::Low),
        "close" | "closing" | "c" => Some(Field::Close),
        "volume" | "vol" | "v" => Some(Field::Volume),
        "barcount" | "bar_count" | "count" => Some(Field::BarCount),
        "average" | "avg" | "wap" => Some(Field::Average),
        _ => None,
    }
}

// =============================================================================
// 오버라이드
// =============================================================================

/// 입력 테이블에 없는 필드를 보충하는 값.
///
/// 테이블에 해당 컬럼이 있으면 컬럼 값이 우선하고, 컬럼도 오버라이드도
/// 없는 키 필드는 [`DataError::SchemaError`]가 됩니다.
#[derive(Debug, Clone, Default)]
pub struct SchemaOverrides {
    pub symbol: Option<String>,
    pub data_type: Option<DataType>,
    pub bar_size: Option<BarSize>,
    /// naive 타임스탬프에 부여할 타임존
    pub timezone: Option<Tz>,
}

impl SchemaOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    pub fn bar_size(mut self, bar_size: BarSize) -> Self {
        self.bar_size = Some(bar_size);
        self
    }

    pub fn timezone(mut self, timezone: Tz) -> Self {
        self.timezone = Some(timezone);
        self
    }
}

// =============================================================================
// 정규화
// =============================================================================

/// 원시 테이블을 표준 바 시퀀스로 정규화합니다.
///
/// - 타임스탬프와 종가 컬럼은 필수이며 해석 불가 시 에러
/// - 키 필드는 컬럼 또는 오버라이드에서 결정, 둘 다 없으면 에러
/// - 없는 선택 필드는 숫자 -1 센티널로 채움
pub fn normalize_table(table: &RawTable, overrides: &SchemaOverrides) -> Result<Vec<Bar>> {
    // 같은 필드를 가리키는 컬럼이 여러 개면 먼저 나온 것을 사용
    let mut fields: HashMap<Field, usize> = HashMap::new();
    for (idx, name) in table.columns.iter().enumerate() {
        if let Some(field) = canonical_field(name) {
            fields.entry(field).or_insert(idx);
        }
    }

    let time_idx = fields.get(&Field::Time).copied().ok_or_else(|| {
        DataError::SchemaError(format!(
            "cannot resolve a timestamp column from {:?}",
            table.columns
        ))
    })?;
    let close_idx = fields.get(&Field::Close).copied().ok_or_else(|| {
        DataError::SchemaError(format!(
            "cannot resolve a close column from {:?}",
            table.columns
        ))
    })?;

    if fields.get(&Field::Symbol).is_none() && overrides.symbol.is_none() {
        return Err(DataError::SchemaError(
            "symbol is neither a column nor an override".to_string(),
        ));
    }
    if fields.get(&Field::DataType).is_none() && overrides.data_type.is_none() {
        return Err(DataError::SchemaError(
            "data type is neither a column nor an override".to_string(),
        ));
    }
    if fields.get(&Field::BarSize).is_none() && overrides.bar_size.is_none() {
        return Err(DataError::SchemaError(
            "bar size is neither a column nor an override".to_string(),
        ));
    }

    let mut bars = Vec::with_capacity(table.rows.len());
    for (row_no, row) in table.rows.iter().enumerate() {
        let time_value = row.get(time_idx).unwrap_or(&RawValue::Null);
        let time = resolve_time(time_value, overrides.timezone)
            .map_err(|e| DataError::SchemaError(format!("row {}: {}", row_no, e)))?;
        let close = row
            .get(close_idx)
            .and_then(RawValue::as_decimal)
            .ok_or_else(|| {
                DataError::SchemaError(format!("row {}: close value is not numeric", row_no))
            })?;

        let symbol = resolve_text(row, fields.get(&Field::Symbol))
            .or_else(|| overrides.symbol.clone())
            .ok_or_else(|| {
                DataError::SchemaError(format!("row {}: symbol value is missing", row_no))
            })?;
        let data_type = match resolve_text(row, fields.get(&Field::DataType)) {
            Some(text) => text.parse::<DataType>().map_err(DataError::SchemaError)?,
            None => overrides.data_type.ok_or_else(|| {
                DataError::SchemaError(format!("row {}: data type value is missing", row_no))
            })?,
        };
        let bar_size = match resolve_text(row, fields.get(&Field::BarSize)) {
            Some(text) => BarSize::from_token(&text).ok_or_else(|| {
                DataError::SchemaError(format!("row {}: unknown bar size {:?}", row_no, text))
            })?,
            None => overrides.bar_size.ok_or_else(|| {
                DataError::SchemaError(format!("row {}: bar size value is missing", row_no))
            })?,
        };

        bars.push(Bar {
            symbol,
            data_type,
            bar_size,
            time,
            open: opt_decimal(row, fields.get(&Field::Open)),
            high: opt_decimal(row, fields.get(&Field::High)),
            low: opt_decimal(row, fields.get(&Field::Low)),
            close,
            volume: opt_int(row, fields.get(&Field::Volume)),
            bar_count: opt_int(row, fields.get(&Field::BarCount)),
            average: opt_decimal(row, fields.get(&Field::Average)),
        });
    }

    Ok(bars)
}

/// 타임스탬프 값을 UTC 절대 시각으로 해석합니다.
///
/// - 타임존이 붙은 값은 UTC로 변환
/// - naive 값은 `timezone` 오버라이드가 있을 때만 해당 지역 시각으로 해석
/// - 정수 값은 유닉스 epoch 초로 간주
fn resolve_time(value: &RawValue, timezone: Option<Tz>) -> Result<DateTime<Utc>> {
    match value {
        RawValue::Time(t) => Ok(*t),
        RawValue::NaiveTime(naive) => localize(*naive, timezone),
        RawValue::Int(secs) => Utc
            .timestamp_opt(*secs, 0)
            .single()
            .ok_or_else(|| DataError::SchemaError(format!("invalid epoch seconds: {}", secs))),
        RawValue::Text(text) => parse_time_text(text, timezone),
        other => Err(DataError::SchemaError(format!(
            "timestamp value has unsupported type: {:?}",
            other
        ))),
    }
}

fn localize(naive: NaiveDateTime, timezone: Option<Tz>) -> Result<DateTime<Utc>> {
    let tz = timezone.ok_or_else(|| {
        DataError::SchemaError(format!(
            "naive timestamp {} requires a timezone override",
            naive
        ))
    })?;
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(t) => Ok(t.with_timezone(&Utc)),
        // DST 중복 구간은 이른 쪽을 택한다
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => Err(DataError::SchemaError(format!(
            "nonexistent local time: {} in {}",
            naive, tz
        ))),
    }
}

fn parse_time_text(text: &str, timezone: Option<Tz>) -> Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Ok(t.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return localize(naive, timezone);
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return localize(date.and_hms_opt(0, 0, 0).unwrap_or_default(), timezone);
    }
    Err(DataError::SchemaError(format!(
        "unparseable timestamp text: {:?}",
        text
    )))
}

fn resolve_text(row: &[RawValue], idx: Option<&usize>) -> Option<String> {
    idx.and_then(|i| row.get(*i))
        .and_then(RawValue::as_text)
        .map(str::to_string)
}

fn opt_decimal(row: &[RawValue], idx: Option<&usize>) -> Decimal {
    idx.and_then(|i| row.get(*i))
        .and_then(RawValue::as_decimal)
        .unwrap_or(Decimal::NEGATIVE_ONE)
}

fn opt_int(row: &[RawValue], idx: Option<&usize>) -> i64 {
    idx.and_then(|i| row.get(*i))
        .and_then(RawValue::as_i64)
        .unwrap_or(MISSING_INT)
}

// =============================================================================
// 테스트
// =============================================================================

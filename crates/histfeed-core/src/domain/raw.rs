//! 정규화 이전의 원시 테이블 표현.
//!
//! 원격 소스마다 컬럼 이름과 타입이 제각각이므로, 수집 결과는 먼저
//! `RawTable`로 들어온 뒤 스키마 정규화를 거쳐 표준 `Bar`가 됩니다.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// 원시 테이블의 셀 값.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// 문자열
    Text(String),
    /// 십진수
    Decimal(Decimal),
    /// 정수
    Int(i64),
    /// 부동소수점
    Float(f64),
    /// 타임존이 포함된 시각
    Time(DateTime<Utc>),
    /// 타임존이 없는 시각
    NaiveTime(NaiveDateTime),
    /// 값 없음
    Null,
}

impl RawValue {
    /// 십진수로 변환을 시도합니다.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            RawValue::Decimal(d) => Some(*d),
            RawValue::Int(i) => Some(Decimal::from(*i)),
            RawValue::Float(f) => Decimal::from_f64(*f),
            RawValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// 정수로 변환을 시도합니다.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RawValue::Int(i) => Some(*i),
            RawValue::Decimal(d) => d.trunc().to_i64(),
            RawValue::Float(f) if f.is_finite() => Some(*f as i64),
            RawValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// 문자열 표현을 반환합니다.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// 값이 비어 있는지 확인합니다.
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl From<Decimal> for RawValue {
    fn from(d: Decimal) -> Self {
        RawValue::Decimal(d)
    }
}

impl From<i64> for RawValue {
    fn from(i: i64) -> Self {
        RawValue::Int(i)
    }
}

impl From<f64> for RawValue {
    fn from(f: f64) -> Self {
        RawValue::Float(f)
    }
}

impl From<DateTime<Utc>> for RawValue {
    fn from(t: DateTime<Utc>) -> Self {
        RawValue::Time(t)
    }
}

impl From<NaiveDateTime> for RawValue {
    fn from(t: NaiveDateTime) -> Self {
        RawValue::NaiveTime(t)
    }
}

/// 컬럼 이름과 행으로 구성된 원시 테이블.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    /// 소스가 붙인 컬럼 이름 (정규화 전)
    pub columns: Vec<String>,
    /// 행 데이터 (각 행은 컬럼 순서를 따름)
    pub rows: Vec<Vec<RawValue>>,
}

impl RawTable {
    /// 주어진 컬럼으로 빈 테이블을 생성합니다.
    pub fn new(columns: Vec<&str>) -> Self {
        Self {
            columns: columns.into_iter().map(String::from).collect(),
            rows: Vec::new(),
        }
    }

    /// 행을 추가합니다.
    ///
    /// 행 길이가 컬럼 수와 다르면 `Null`로 채우거나 잘라냅니다.
    pub fn push_row(&mut self, mut row: Vec<RawValue>) {
        row.resize(self.columns.len(), RawValue::Null);
        self.rows.push(row);
    }

    /// 행 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// 테이블이 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

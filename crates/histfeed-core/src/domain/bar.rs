//! 바 데이터 타입 및 구조체.
//!
//! 이 모듈은 과거 시세의 기본 단위인 `Bar`를 정의합니다.

use crate::types::{BarSize, DataType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 값이 없는 정수 필드를 나타내는 센티널.
pub const MISSING_INT: i64 = -1;

/// 하나의 OHLCV 관측값.
///
/// `(symbol, data_type, bar_size, time)` 튜플이 블록 내에서 유일해야 합니다.
/// 선택 필드(시가/고가/저가/거래량 등)가 입력에 없으면 -1 센티널을 갖습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// 거래 심볼
    pub symbol: String,
    /// 데이터 종류
    pub data_type: DataType,
    /// 바 크기
    pub bar_size: BarSize,
    /// 바 시작 시각 (UTC 순간값)
    pub time: DateTime<Utc>,
    /// 시가
    pub open: Decimal,
    /// 고가
    pub high: Decimal,
    /// 저가
    pub low: Decimal,
    /// 종가
    pub close: Decimal,
    /// 거래량
    pub volume: i64,
    /// 바에 포함된 체결 수
    pub bar_count: i64,
    /// 가중 평균가
    pub average: Decimal,
}

impl Bar {
    /// 필수 필드만으로 새 바를 생성합니다.
    ///
    /// 나머지 필드는 -1 센티널로 채워집니다.
    pub fn new(
        symbol: impl Into<String>,
        data_type: DataType,
        bar_size: BarSize,
        time: DateTime<Utc>,
        close: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            data_type,
            bar_size,
            time,
            open: Decimal::NEGATIVE_ONE,
            high: Decimal::NEGATIVE_ONE,
            low: Decimal::NEGATIVE_ONE,
            close,
            volume: MISSING_INT,
            bar_count: MISSING_INT,
            average: Decimal::NEGATIVE_ONE,
        }
    }

    /// 시가/고가/저가가 모두 채워져 있는지 확인합니다.
    pub fn has_ohlc(&self) -> bool {
        self.open != Decimal::NEGATIVE_ONE
            && self.high != Decimal::NEGATIVE_ONE
            && self.low != Decimal::NEGATIVE_ONE
    }

    /// 바 범위(고가 - 저가)를 반환합니다.
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }

    /// 양봉(종가 > 시가)인지 확인합니다.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }
}

//! 과거 시세 데이터의 종류 정의.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 바가 집계하는 시세의 종류.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    /// 체결가 기준
    #[default]
    Trades,
    /// 매수/매도 호가의 중간값
    Midpoint,
    /// 매수 호가
    Bid,
    /// 매도 호가
    Ask,
    /// 매수/매도 호가 쌍
    BidAsk,
    /// 배당/분할 조정 종가
    AdjustedLast,
}

impl DataType {
    /// 표준 문자열 표기를 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Trades => "TRADES",
            DataType::Midpoint => "MIDPOINT",
            DataType::Bid => "BID",
            DataType::Ask => "ASK",
            DataType::BidAsk => "BID_ASK",
            DataType::AdjustedLast => "ADJUSTED_LAST",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TRADES" => Ok(DataType::Trades),
            "MIDPOINT" => Ok(DataType::Midpoint),
            "BID" => Ok(DataType::Bid),
            "ASK" => Ok(DataType::Ask),
            "BID_ASK" => Ok(DataType::BidAsk),
            "ADJUSTED_LAST" => Ok(DataType::AdjustedLast),
            _ => Err(format!("Invalid data type: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_roundtrip() {
        assert_eq!(DataType::Trades.as_str(), "TRADES");
        assert_eq!("bid_ask".parse::<DataType>().unwrap(), DataType::BidAsk);
        assert!("TICKS".parse::<DataType>().is_err());
    }

    #[test]
    fn test_data_type_default() {
        assert_eq!(DataType::default(), DataType::Trades);
    }
}

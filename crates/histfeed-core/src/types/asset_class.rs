//! 자산군 정의.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 요청 라우팅에 사용되는 자산군.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    /// 주식
    #[default]
    Stock,
    /// 지수
    Index,
    /// 옵션
    Option,
    /// 선물
    Future,
    /// 선물 옵션
    FuturesOption,
    /// 외환
    Forex,
    /// 원자재
    Commodity,
    /// 채권
    Bond,
    /// 뮤추얼 펀드
    MutualFund,
    /// 차액결제거래
    Cfd,
    /// 워런트
    Warrant,
}

impl AssetClass {
    /// 표준 문자열 표기를 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Stock => "Stock",
            AssetClass::Index => "Index",
            AssetClass::Option => "Option",
            AssetClass::Future => "Future",
            AssetClass::FuturesOption => "FuturesOption",
            AssetClass::Forex => "Forex",
            AssetClass::Commodity => "Commodity",
            AssetClass::Bond => "Bond",
            AssetClass::MutualFund => "MutualFund",
            AssetClass::Cfd => "CFD",
            AssetClass::Warrant => "Warrant",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AssetClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stock" | "stk" => Ok(AssetClass::Stock),
            "index" | "ind" => Ok(AssetClass::Index),
            "option" | "opt" => Ok(AssetClass::Option),
            "future" | "fut" => Ok(AssetClass::Future),
            "futuresoption" | "fop" => Ok(AssetClass::FuturesOption),
            "forex" | "cash" => Ok(AssetClass::Forex),
            "commodity" | "cmdty" => Ok(AssetClass::Commodity),
            "bond" => Ok(AssetClass::Bond),
            "mutualfund" | "fund" => Ok(AssetClass::MutualFund),
            "cfd" => Ok(AssetClass::Cfd),
            "warrant" | "war" => Ok(AssetClass::Warrant),
            _ => Err(format!("Invalid asset class: {}", s)),
        }
    }
}

//! 바 데이터의 샘플링 간격 정의.
//!
//! 이 모듈은 과거 시세 바의 다양한 샘플링 간격을 나타내는 타입을 정의합니다.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// 바 샘플링 간격.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarSize {
    /// 1초봉
    S1,
    /// 5초봉
    S5,
    /// 10초봉
    S10,
    /// 15초봉
    S15,
    /// 30초봉
    S30,
    /// 1분봉
    M1,
    /// 2분봉
    M2,
    /// 3분봉
    M3,
    /// 5분봉
    M5,
    /// 10분봉
    M10,
    /// 15분봉
    M15,
    /// 20분봉
    M20,
    /// 30분봉
    M30,
    /// 1시간봉
    H1,
    /// 2시간봉
    H2,
    /// 3시간봉
    H3,
    /// 4시간봉
    H4,
    /// 8시간봉
    H8,
    /// 일봉
    D1,
    /// 주봉
    W1,
    /// 월봉
    MN1,
}

impl BarSize {
    /// 이 바 크기의 기간을 반환합니다.
    pub fn duration(&self) -> Duration {
        match self {
            BarSize::S1 => Duration::from_secs(1),
            BarSize::S5 => Duration::from_secs(5),
            BarSize::S10 => Duration::from_secs(10),
            BarSize::S15 => Duration::from_secs(15),
            BarSize::S30 => Duration::from_secs(30),
            BarSize::M1 => Duration::from_secs(60),
            BarSize::M2 => Duration::from_secs(2 * 60),
            BarSize::M3 => Duration::from_secs(3 * 60),
            BarSize::M5 => Duration::from_secs(5 * 60),
            BarSize::M10 => Duration::from_secs(10 * 60),
            BarSize::M15 => Duration::from_secs(15 * 60),
            BarSize::M20 => Duration::from_secs(20 * 60),
            BarSize::M30 => Duration::from_secs(30 * 60),
            BarSize::H1 => Duration::from_secs(60 * 60),
            BarSize::H2 => Duration::from_secs(2 * 60 * 60),
            BarSize::H3 => Duration::from_secs(3 * 60 * 60),
            BarSize::H4 => Duration::from_secs(4 * 60 * 60),
            BarSize::H8 => Duration::from_secs(8 * 60 * 60),
            BarSize::D1 => Duration::from_secs(24 * 60 * 60),
            BarSize::W1 => Duration::from_secs(7 * 24 * 60 * 60),
            BarSize::MN1 => Duration::from_secs(30 * 24 * 60 * 60), // 근사값
        }
    }

    /// 이 바 크기의 초 단위 값을 반환합니다.
    pub fn as_secs(&self) -> u64 {
        self.duration().as_secs()
    }

    /// 한 바의 시간 간격을 반환합니다.
    ///
    /// 커버리지 구간 병합과 갭 경계 계산의 기준 단위입니다.
    pub fn step(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.as_secs() as i64)
    }

    /// 일중(intraday) 바인지 확인합니다.
    pub fn is_intraday(&self) -> bool {
        *self < BarSize::D1
    }

    /// 캐시 대상 바인지 확인합니다.
    ///
    /// 초 단위 바는 스트리밍 수준의 granularity라 캐시하지 않습니다.
    pub fn is_cacheable(&self) -> bool {
        *self >= BarSize::M1
    }

    /// 간격 토큰 문자열로 변환합니다.
    pub fn as_token(&self) -> &'static str {
        match self {
            BarSize::S1 => "1s",
            BarSize::S5 => "5s",
            BarSize::S10 => "10s",
            BarSize::S15 => "15s",
            BarSize::S30 => "30s",
            BarSize::M1 => "1m",
            BarSize::M2 => "2m",
            BarSize::M3 => "3m",
            BarSize::M5 => "5m",
            BarSize::M10 => "10m",
            BarSize::M15 => "15m",
            BarSize::M20 => "20m",
            BarSize::M30 => "30m",
            BarSize::H1 => "1h",
            BarSize::H2 => "2h",
            BarSize::H3 => "3h",
            BarSize::H4 => "4h",
            BarSize::H8 => "8h",
            BarSize::D1 => "1d",
            BarSize::W1 => "1wk",
            BarSize::MN1 => "1mo",
        }
    }

    /// 간격 토큰 문자열에서 파싱합니다.
    ///
    /// 분("1m")과 월("1M")은 대소문자로 구분합니다.
    pub fn from_token(s: &str) -> Option<Self> {
        match s {
            "1s" => Some(BarSize::S1),
            "5s" => Some(BarSize::S5),
            "10s" => Some(BarSize::S10),
            "15s" => Some(BarSize::S15),
            "30s" => Some(BarSize::S30),
            "1m" => Some(BarSize::M1),
            "2m" => Some(BarSize::M2),
            "3m" => Some(BarSize::M3),
            "5m" => Some(BarSize::M5),
            "10m" => Some(BarSize::M10),
            "15m" => Some(BarSize::M15),
            "20m" => Some(BarSize::M20),
            "30m" => Some(BarSize::M30),
            "1h" => Some(BarSize::H1),
            "2h" => Some(BarSize::H2),
            "3h" => Some(BarSize::H3),
            "4h" => Some(BarSize::H4),
            "8h" => Some(BarSize::H8),
            "1d" => Some(BarSize::D1),
            "1w" | "1wk" => Some(BarSize::W1),
            "1M" | "1mo" => Some(BarSize::MN1),
            _ => None,
        }
    }
}

impl fmt::Display for BarSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_token())
    }
}

impl FromStr for BarSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(s).ok_or_else(|| format!("Invalid bar size: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_size_duration() {
        assert_eq!(BarSize::S5.as_secs(), 5);
        assert_eq!(BarSize::M1.as_secs(), 60);
        assert_eq!(BarSize::H1.as_secs(), 3600);
        assert_eq!(BarSize::D1.as_secs(), 86400);
    }

    #[test]
    fn test_bar_size_token() {
        assert_eq!(BarSize::M15.as_token(), "15m");
        assert_eq!(BarSize::from_token("4h"), Some(BarSize::H4));
        assert_eq!(BarSize::from_token("1wk"), Some(BarSize::W1));
        assert_eq!(BarSize::from_token("7m"), None);
    }

    #[test]
    fn test_bar_size_minute_month_case() {
        assert_eq!(BarSize::from_token("1m"), Some(BarSize::M1));
        assert_eq!(BarSize::from_token("1M"), Some(BarSize::MN1));
    }

    #[test]
    fn test_bar_size_cacheable() {
        assert!(!BarSize::S1.is_cacheable());
        assert!(!BarSize::S30.is_cacheable());
        assert!(BarSize::M1.is_cacheable());
        assert!(BarSize::D1.is_cacheable());
    }

    #[test]
    fn test_bar_size_intraday() {
        assert!(BarSize::M30.is_intraday());
        assert!(BarSize::H8.is_intraday());
        assert!(!BarSize::D1.is_intraday());
        assert!(!BarSize::MN1.is_intraday());
    }
}

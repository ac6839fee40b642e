//! 소스 중립적 원격 수집 인터페이스.
//!
//! 계획 단계가 만든 갭 단위 요청을 받아 원시 바 테이블을 돌려주는
//! 통합 인터페이스를 제공합니다.
//!
//! # 사용 예제
//!
//! ```rust,ignore
//! use histfeed_source::{RemoteSource, YahooSource};
//!
//! let source = YahooSource::new()?;
//! let table = source.fetch(&subrequest).await?;
//! ```

use std::fmt;

use async_trait::async_trait;
use chrono_tz::Tz;

use histfeed_core::{AssetClass, BarSize, DataType, HistRequest, RawTable, TimeSpan};

use crate::SourceError;

/// 하나의 갭을 채우기 위한 수집 단위.
///
/// 요청 전체가 아닌 좁혀진 시간 구간을 가리키며,
/// `(symbol, data_type, bar_size, span)`이 동시 수집 중복 제거의 키가 됩니다.
#[derive(Debug, Clone, PartialEq)]
pub struct SubRequest {
    /// 자산군
    pub asset_class: AssetClass,
    /// 거래 심볼
    pub symbol: String,
    /// 데이터 종류
    pub data_type: DataType,
    /// 바 크기
    pub bar_size: BarSize,
    /// 수집할 시간 구간
    pub span: TimeSpan,
    /// 표시 타임존 (정규화 시 naive 시각 해석에 사용)
    pub timezone: Tz,
    /// 거래소 라우팅
    pub exchange: String,
    /// 통화
    pub currency: String,
}

impl SubRequest {
    /// 수집 요청에서 좁혀진 구간으로 하위 요청을 만듭니다.
    pub fn from_request(request: &HistRequest, span: TimeSpan) -> Self {
        Self {
            asset_class: request.asset_class,
            symbol: request.symbol.clone(),
            data_type: request.data_type,
            bar_size: request.bar_size,
            span,
            timezone: request.timezone,
            exchange: request.exchange.clone(),
            currency: request.currency.clone(),
        }
    }
}

impl fmt::Display for SubRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} [{}]",
            self.symbol, self.data_type, self.bar_size, self.span
        )
    }
}

/// 소스 중립적 원격 수집 trait.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// 소스 이름 (로깅용).
    fn name(&self) -> &'static str;

    /// 하위 요청 구간의 원시 바 테이블 조회.
    ///
    /// 반환된 에러는 `is_retryable()` / `is_fatal()`로 스스로를 분류하여
    /// 호출 측이 재시도 여부를 결정할 수 있게 합니다.
    async fn fetch(&self, request: &SubRequest) -> Result<RawTable, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_subrequest_from_request() {
        let end = Utc.with_ymd_and_hms(2017, 9, 8, 0, 0, 0).unwrap();
        let request = HistRequest::new("GS", BarSize::D1, Duration::days(10), end)
            .with_timezone(chrono_tz::America::New_York);

        let narrowed = TimeSpan::new(end - Duration::days(2), end);
        let sub = SubRequest::from_request(&request, narrowed);

        assert_eq!(sub.symbol, "GS");
        assert_eq!(sub.span, narrowed);
        assert_eq!(sub.timezone, chrono_tz::America::New_York);
        assert_eq!(sub.exchange, "SMART");
    }
}

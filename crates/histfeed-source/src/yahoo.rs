//! Yahoo Finance 원격 소스.
//!
//! Yahoo Finance API를 사용하여 구간 단위로 과거 바 데이터를 조회합니다.
//!
//! # 지원 간격
//!
//! - **분봉**: 1m, 2m, 5m, 15m, 30m (최근 60일 제한)
//! - **시간봉**: 1h (최근 730일 제한)
//! - **일봉 이상**: 1d, 1wk, 1mo (수년간 데이터 가능)
//!
//! Yahoo가 제공하지 않는 간격(초봉, 3분봉 등)은 `NotSupported`로
//! 즉시 실패합니다. 바 크기는 저장 키의 일부라서 가까운 간격으로
//! 대체하면 캐시가 오염되기 때문입니다.
//!
//! # 심볼 형식
//!
//! 모든 심볼은 Yahoo Finance 형식으로 전달되어야 합니다:
//! - 미국 주식: "AAPL", "GS"
//! - 한국 주식: "005930.KS" (코스피) 또는 "124560.KQ" (코스닥)
//! - ETF: "SPY", "QQQ"

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use time::OffsetDateTime;
use tracing::{debug, warn};
use yahoo_finance_api as yahoo;

use histfeed_core::{BarSize, RawTable, RawValue};

use crate::remote::{RemoteSource, SubRequest};
use crate::SourceError;

/// Yahoo Finance 원격 소스.
pub struct YahooSource {
    connector: yahoo::YahooConnector,
}

impl YahooSource {
    /// 새로운 Yahoo Finance 소스 생성.
    pub fn new() -> Result<Self, SourceError> {
        let connector = yahoo::YahooConnector::new()
            .map_err(|e| SourceError::NetworkError(format!("Yahoo Finance 연결 실패: {}", e)))?;

        Ok(Self { connector })
    }

    /// 바 크기를 Yahoo Finance 간격 문자열로 변환.
    ///
    /// Yahoo가 제공하지 않는 간격은 `None`을 반환합니다.
    pub fn bar_size_to_interval(bar_size: BarSize) -> Option<&'static str> {
        match bar_size {
            BarSize::M1 => Some("1m"),
            BarSize::M2 => Some("2m"),
            BarSize::M5 => Some("5m"),
            BarSize::M15 => Some("15m"),
            BarSize::M30 => Some("30m"),
            BarSize::H1 => Some("1h"),
            BarSize::D1 => Some("1d"),
            BarSize::W1 => Some("1wk"),
            BarSize::MN1 => Some("1mo"),
            _ => None,
        }
    }

    /// Yahoo Quote 목록을 원시 테이블로 변환.
    ///
    /// 컬럼 이름은 Yahoo 표기를 그대로 쓰고, 표준화는 스키마
    /// 정규화 단계에 맡깁니다.
    fn quotes_to_table(quotes: &[yahoo::Quote]) -> RawTable {
        let mut sorted: Vec<&yahoo::Quote> = quotes.iter().collect();
        sorted.sort_by_key(|q| q.timestamp);

        let mut table = RawTable::new(vec!["Date", "Open", "High", "Low", "Close", "Volume"]);
        for quote in sorted {
            let time = match Utc.timestamp_opt(quote.timestamp as i64, 0).single() {
                Some(t) => t,
                None => {
                    warn!(timestamp = quote.timestamp, "잘못된 타임스탬프를 건너뜁니다");
                    continue;
                }
            };

            table.push_row(vec![
                RawValue::Time(time),
                RawValue::Float(quote.open),
                RawValue::Float(quote.high),
                RawValue::Float(quote.low),
                RawValue::Float(quote.close),
                RawValue::Int(quote.volume as i64),
            ]);
        }

        table
    }
}

#[async_trait]
impl RemoteSource for YahooSource {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    async fn fetch(&self, request: &SubRequest) -> Result<RawTable, SourceError> {
        let interval = Self::bar_size_to_interval(request.bar_size).ok_or_else(|| {
            SourceError::NotSupported(format!(
                "Yahoo Finance does not serve {} bars",
                request.bar_size
            ))
        })?;

        let start = to_offset_datetime(request.span.start)?;
        let end = to_offset_datetime(request.span.end)?;

        debug!(
            symbol = %request.symbol,
            interval = interval,
            span = %request.span,
            "Yahoo Finance API 호출"
        );

        let response = self
            .connector
            .get_quote_history_interval(&request.symbol, start, end, interval)
            .await
            .map_err(|e| SourceError::ApiError {
                code: 0,
                message: format!("Yahoo Finance API 오류 ({}): {}", request.symbol, e),
            })?;

        let quotes = response
            .quotes()
            .map_err(|e| SourceError::ParseError(format!("Quote 파싱 오류: {}", e)))?;

        if quotes.is_empty() {
            warn!(symbol = %request.symbol, span = %request.span, "Yahoo Finance: 데이터 없음");
        }

        Ok(Self::quotes_to_table(&quotes))
    }
}

/// chrono UTC 시각을 time 크레이트의 OffsetDateTime으로 변환.
fn to_offset_datetime(time: DateTime<Utc>) -> Result<OffsetDateTime, SourceError> {
    OffsetDateTime::from_unix_timestamp(time.timestamp())
        .map_err(|e| SourceError::InvalidRequest(format!("invalid fetch boundary {}: {}", time, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_size_to_interval() {
        assert_eq!(YahooSource::bar_size_to_interval(BarSize::M1), Some("1m"));
        assert_eq!(YahooSource::bar_size_to_interval(BarSize::H1), Some("1h"));
        assert_eq!(YahooSource::bar_size_to_interval(BarSize::D1), Some("1d"));
        assert_eq!(YahooSource::bar_size_to_interval(BarSize::W1), Some("1wk"));
        assert_eq!(YahooSource::bar_size_to_interval(BarSize::MN1), Some("1mo"));
    }

    #[test]
    fn test_unsupported_bar_sizes() {
        assert_eq!(YahooSource::bar_size_to_interval(BarSize::S5), None);
        assert_eq!(YahooSource::bar_size_to_interval(BarSize::M3), None);
        assert_eq!(YahooSource::bar_size_to_interval(BarSize::H4), None);
    }

    #[test]
    fn test_to_offset_datetime() {
        let time = Utc.timestamp_opt(1_504_742_400, 0).single().unwrap();
        let offset = to_offset_datetime(time).unwrap();
        assert_eq!(offset.unix_timestamp(), 1_504_742_400);
    }
}

//! 과거 시세 수집 요청.
//!
//! 이 모듈은 수집 요청 값 객체와 기간 문자열 파싱을 정의합니다.

use crate::error::{HistfeedError, HistfeedResult};
use crate::types::{AssetClass, BarSize, DataType, TimeSpan};
use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

/// 과거 시세 수집 요청.
///
/// `duration`과 `end`가 요청 구간 `[end - duration, end]`를 결정합니다.
/// `timezone`은 내부 비교에는 쓰이지 않고 표시/내보내기 경계에서만 사용됩니다.
#[derive(Debug, Clone, PartialEq)]
pub struct HistRequest {
    /// 자산군
    pub asset_class: AssetClass,
    /// 거래 심볼
    pub symbol: String,
    /// 데이터 종류
    pub data_type: DataType,
    /// 바 크기
    pub bar_size: BarSize,
    /// 요청 기간
    pub duration: Duration,
    /// 요청 구간의 끝 시각
    pub end: DateTime<Utc>,
    /// 거래소 타임존 (표시용)
    pub timezone: Tz,
    /// 거래소 라우팅
    pub exchange: String,
    /// 통화
    pub currency: String,
}

impl HistRequest {
    /// 새 수집 요청을 생성합니다.
    pub fn new(
        symbol: impl Into<String>,
        bar_size: BarSize,
        duration: Duration,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            asset_class: AssetClass::default(),
            symbol: symbol.into(),
            data_type: DataType::default(),
            bar_size,
            duration,
            end,
            timezone: Tz::UTC,
            exchange: "SMART".to_string(),
            currency: "USD".to_string(),
        }
    }

    /// 타임존이 없는 종료 시각으로 요청을 생성합니다.
    ///
    /// 종료 시각을 주어진 타임존 기준으로 해석하고 경고를 남깁니다.
    pub fn from_local(
        symbol: impl Into<String>,
        bar_size: BarSize,
        duration: Duration,
        end_local: NaiveDateTime,
        timezone: Tz,
    ) -> Self {
        warn!(
            timezone = %timezone,
            end = %end_local,
            "타임존이 없는 종료 시각을 요청 타임존 기준으로 해석합니다"
        );

        let end = match timezone.from_local_datetime(&end_local) {
            LocalResult::Single(t) => t,
            // 서머타임 전환으로 모호한 시각은 이른 쪽을 택합니다
            LocalResult::Ambiguous(earliest, _) => earliest,
            // 존재하지 않는 시각은 UTC로 해석합니다
            LocalResult::None => timezone.from_utc_datetime(&end_local),
        }
        .with_timezone(&Utc);

        Self::new(symbol, bar_size, duration, end).with_timezone(timezone)
    }

    /// 자산군을 설정합니다.
    pub fn with_asset_class(mut self, asset_class: AssetClass) -> Self {
        self.asset_class = asset_class;
        self
    }

    /// 데이터 종류를 설정합니다.
    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    /// 표시 타임존을 설정합니다.
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// 거래소 라우팅을 설정합니다.
    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    /// 통화를 설정합니다.
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// 요청이 가리키는 절대 시간 구간을 반환합니다.
    pub fn span(&self) -> TimeSpan {
        TimeSpan::new(self.end - self.duration, self.end)
    }
}

/// 사람이 쓰는 기간 문자열을 파싱합니다.
///
/// `"1 min"`, `"5days"`, `"2 W"`, `"1 year"`처럼 숫자와 단위 사이의
/// 공백 유무와 단위 표기의 차이를 허용합니다. 한 글자 단위에서
/// 분(`m`)과 월(`M`)은 대소문자로 구분합니다.
pub fn parse_duration(input: &str) -> HistfeedResult<Duration> {
    let trimmed = input.trim();
    let digits_end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (count_str, unit_raw) = trimmed.split_at(digits_end);

    let count: i64 = count_str
        .parse()
        .map_err(|_| HistfeedError::InvalidInput(format!("invalid duration: {}", input)))?;
    if count <= 0 {
        return Err(HistfeedError::InvalidInput(format!(
            "duration must be positive: {}",
            input
        )));
    }

    let unit = unit_raw.trim();
    let duration = if unit.chars().count() == 1 {
        match unit.chars().next().unwrap_or(' ') {
            's' | 'S' => Duration::seconds(count),
            'm' => Duration::minutes(count),
            'M' => Duration::days(30 * count), // 근사값
            'h' | 'H' => Duration::hours(count),
            'd' | 'D' => Duration::days(count),
            'w' | 'W' => Duration::weeks(count),
            'y' | 'Y' => Duration::days(365 * count), // 근사값
            _ => {
                return Err(HistfeedError::InvalidInput(format!(
                    "unknown duration unit: {}",
                    unit
                )))
            }
        }
    } else {
        match unit.to_lowercase().as_str() {
            "sec" | "secs" | "second" | "seconds" => Duration::seconds(count),
            "min" | "mins" | "minute" | "minutes" => Duration::minutes(count),
            "hr" | "hrs" | "hour" | "hours" => Duration::hours(count),
            "day" | "days" => Duration::days(count),
            "wk" | "wks" | "week" | "weeks" => Duration::weeks(count),
            "mo" | "mon" | "mons" | "month" | "months" => Duration::days(30 * count), // 근사값
            "yr" | "yrs" | "year" | "years" => Duration::days(365 * count),           // 근사값
            _ => {
                return Err(HistfeedError::InvalidInput(format!(
                    "unknown duration unit: {}",
                    unit
                )))
            }
        }
    };

    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("1 min").unwrap(), Duration::minutes(1));
        assert_eq!(parse_duration("5days").unwrap(), Duration::days(5));
        assert_eq!(parse_duration("2 W").unwrap(), Duration::weeks(2));
        assert_eq!(parse_duration("1 year").unwrap(), Duration::days(365));
        assert_eq!(parse_duration("60s").unwrap(), Duration::seconds(60));
        assert_eq!(parse_duration("3mo").unwrap(), Duration::days(90));
    }

    #[test]
    fn test_parse_duration_minute_month_case() {
        assert_eq!(parse_duration("1m").unwrap(), Duration::minutes(1));
        assert_eq!(parse_duration("1M").unwrap(), Duration::days(30));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10 fortnight").is_err());
        assert!(parse_duration("0d").is_err());
    }

    #[test]
    fn test_request_span() {
        let end = Utc.with_ymd_and_hms(2017, 9, 8, 0, 0, 0).unwrap();
        let req = HistRequest::new("GS", BarSize::D1, Duration::days(10), end);

        let span = req.span();
        assert_eq!(span.end, end);
        assert_eq!(span.start, Utc.with_ymd_and_hms(2017, 8, 29, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_request_from_local() {
        let naive = NaiveDateTime::parse_from_str("2017-09-08 16:00:00", "%Y-%m-%d %H:%M:%S")
            .unwrap();
        let req = HistRequest::from_local(
            "GS",
            BarSize::D1,
            Duration::days(1),
            naive,
            chrono_tz::America::New_York,
        );

        // 2017-09-08은 서머타임(EDT, UTC-4) 기간
        assert_eq!(
            req.end,
            Utc.with_ymd_and_hms(2017, 9, 8, 20, 0, 0).unwrap()
        );
        assert_eq!(req.timezone, chrono_tz::America::New_York);
    }
}

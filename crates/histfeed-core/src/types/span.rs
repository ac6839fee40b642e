//! 시간 구간 연산.
//!
//! 이 모듈은 커버리지 추적과 요청 분할에 사용되는 폐구간 타입을 정의합니다.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// UTC 시각의 폐구간 `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeSpan {
    /// 구간 시작 (포함)
    pub start: DateTime<Utc>,
    /// 구간 끝 (포함)
    pub end: DateTime<Utc>,
}

impl TimeSpan {
    /// 새 구간을 생성합니다.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// 빈 구간인지 확인합니다 (시작이 끝보다 뒤).
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// 주어진 시각이 구간에 포함되는지 확인합니다.
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.start <= time && time <= self.end
    }

    /// 다른 구간과 겹치는지 확인합니다.
    pub fn overlaps(&self, other: &TimeSpan) -> bool {
        !self.is_empty() && !other.is_empty() && self.start <= other.end && other.start <= self.end
    }

    /// 두 구간의 교집합을 반환합니다.
    pub fn intersect(&self, other: &TimeSpan) -> Option<TimeSpan> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start <= end {
            Some(TimeSpan::new(start, end))
        } else {
            None
        }
    }

    /// 구간의 길이를 반환합니다.
    ///
    /// 빈 구간은 음수 길이를 갖습니다.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ~ {}", self.start, self.end)
    }
}

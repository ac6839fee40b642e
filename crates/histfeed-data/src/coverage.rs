//! 캐시 커버리지 추적.
//!
//! 키별로 "캐시에 있다고 증명된" 시간 구간 집합을 유지합니다. 구간은
//! 시작 시각 오름차순이며 서로소입니다. 겹치거나 바 크기 한 스텝
//! 이내로 인접한 구간은 기록 시점에 하나로 합쳐지므로, 같은 구간을
//! 반복 기록해도 집합은 더 자라지 않습니다.
//!
//! 요청 구간에서 커버리지를 뺀 나머지가 원격에서 받아야 할 갭입니다.
//! 갭 경계는 커버된 구간에서 정확히 한 스텝 바깥입니다.

use std::collections::HashMap;

use histfeed_core::TimeSpan;

use crate::block::BlockKey;

/// 키별 커버리지 구간 인덱스.
#[derive(Debug, Clone, Default)]
pub struct CoverageIndex {
    ranges: HashMap<BlockKey, Vec<TimeSpan>>,
}

impl CoverageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 구간을 커버된 것으로 기록합니다.
    ///
    /// 기존 구간과 겹치거나 한 스텝 이내로 인접하면 하나로 합칩니다.
    /// 빈 구간은 무시됩니다.
    pub fn mark_covered(&mut self, key: &BlockKey, span: TimeSpan) {
        if span.is_empty() {
            return;
        }
        let step = key.bar_size.step();
        let ranges = self.ranges.entry(key.clone()).or_default();
        ranges.push(span);
        ranges.sort_by_key(|s| s.start);

        let mut merged: Vec<TimeSpan> = Vec::with_capacity(ranges.len());
        for &span in ranges.iter() {
            match merged.last_mut() {
                Some(last) if span.start <= last.end + step => {
                    if span.end > last.end {
                        last.end = span.end;
                    }
                }
                _ => merged.push(span),
            }
        }
        *ranges = merged;
    }

    /// 여러 구간을 한꺼번에 기록합니다.
    pub fn mark_all(&mut self, key: &BlockKey, spans: &[TimeSpan]) {
        for &span in spans {
            self.mark_covered(key, span);
        }
    }

    /// 요청 구간 중 커버되지 않은 갭을 시간 오름차순으로 반환합니다.
    ///
    /// 커버된 구간에 인접한 갭 경계는 그 구간에서 한 스텝 바깥입니다.
    /// 요청 전체가 커버되어 있으면 빈 목록입니다.
    pub fn gaps(&self, key: &BlockKey, request: TimeSpan) -> Vec<TimeSpan> {
        if request.is_empty() {
            return Vec::new();
        }
        let step = key.bar_size.step();
        let covered = match self.ranges.get(key) {
            Some(ranges) => ranges.as_slice(),
            None => return vec![request],
        };

        let mut gaps = Vec::new();
        let mut cursor = request.start;
        for span in covered {
            if span.end < cursor {
                continue;
            }
            if span.start > request.end {
                break;
            }
            let gap = TimeSpan::new(cursor, (span.start - step).min(request.end));
            if !gap.is_empty() {
                gaps.push(gap);
            }
            cursor = span.end + step;
            if cursor > request.end {
                return gaps;
            }
        }
        gaps.push(TimeSpan::new(cursor, request.end));
        gaps
    }

    /// 요청 구간이 전부 커버되어 있는지 확인합니다.
    pub fn is_covered(&self, key: &BlockKey, request: TimeSpan) -> bool {
        self.gaps(key, request).is_empty()
    }

    /// 키의 커버된 구간 목록.
    pub fn covered(&self, key: &BlockKey) -> Vec<TimeSpan> {
        self.ranges.get(key).cloned().unwrap_or_default()
    }

    /// 인덱스에 기록된 키 수.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

// =============================================================================
// 테스트
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use histfeed_core::{BarSize, DataType};
    use proptest::prelude::*;

    fn day(d: u32) -> DateTime<Utc> {
        // 2017-08-20 + d일
        Utc.with_ymd_and_hms(2017, 8, 20, 0, 0, 0).unwrap() + chrono::Duration::days(d as i64)
    }

    fn span(from: u32, to: u32) -> TimeSpan {
        TimeSpan::new(day(from), day(to))
    }

    fn key() -> BlockKey {
        BlockKey::new("GS", DataType::Trades, BarSize::D1)
    }

    #[test]
    fn test_gaps_subtract_covered_middle() {
        let mut index = CoverageIndex::new();
        // 8/31 ~ 9/5 커버, 요청 8/29 ~ 9/8
        index.mark_covered(&key(), span(11, 16));

        let gaps = index.gaps(&key(), span(9, 19));
        assert_eq!(gaps, vec![span(9, 10), span(17, 19)]);
    }

    #[test]
    fn test_gap_boundaries_are_one_step_outside() {
        let mut index = CoverageIndex::new();
        index.mark_covered(&key(), span(5, 10));

        let gaps = index.gaps(&key(), span(1, 20));
        assert_eq!(gaps, vec![span(1, 4), span(11, 20)]);
    }

    #[test]
    fn test_overlapping_marks_coalesce() {
        let mut index = CoverageIndex::new();
        index.mark_covered(&key(), span(1, 5));
        index.mark_covered(&key(), span(3, 8));

        assert_eq!(index.covered(&key()), vec![span(1, 8)]);
    }

    #[test]
    fn test_adjacent_within_one_step_coalesce() {
        let mut index = CoverageIndex::new();
        index.mark_covered(&key(), span(1, 2));
        index.mark_covered(&key(), span(3, 5));

        assert_eq!(index.covered(&key()), vec![span(1, 5)]);
        assert!(index.is_covered(&key(), span(1, 5)));
    }

    #[test]
    fn test_disjoint_marks_stay_disjoint() {
        let mut index = CoverageIndex::new();
        index.mark_covered(&key(), span(1, 2));
        index.mark_covered(&key(), span(10, 12));

        assert_eq!(index.covered(&key()), vec![span(1, 2), span(10, 12)]);
    }

    #[test]
    fn test_repeated_marks_do_not_grow() {
        let mut index = CoverageIndex::new();
        index.mark_covered(&key(), span(1, 5));
        index.mark_covered(&key(), span(1, 5));
        index.mark_covered(&key(), span(2, 4));

        assert_eq!(index.covered(&key()), vec![span(1, 5)]);
    }

    #[test]
    fn test_full_coverage_yields_no_gaps() {
        let mut index = CoverageIndex::new();
        index.mark_covered(&key(), span(0, 30));

        assert!(index.gaps(&key(), span(5, 10)).is_empty());
    }

    #[test]
    fn test_uncovered_request_is_one_gap() {
        let index = CoverageIndex::new();
        assert_eq!(index.gaps(&key(), span(1, 5)), vec![span(1, 5)]);
    }

    #[test]
    fn test_empty_request_has_no_gaps() {
        let mut index = CoverageIndex::new();
        index.mark_covered(&key(), span(1, 5));

        let empty = TimeSpan::new(day(10), day(8));
        assert!(index.gaps(&key(), empty).is_empty());
    }

    proptest! {
        /// 일 단위 격자에서: 요청 내 모든 시점은 커버리지나 갭 중
        /// 정확히 한쪽에만 속한다.
        #[test]
        fn prop_gaps_partition_request(
            marks in prop::collection::vec((0u32..40, 0u32..6), 0..6),
            req_start in 0u32..35,
            req_len in 0u32..20,
        ) {
            let mut index = CoverageIndex::new();
            for (start, len) in &marks {
                index.mark_covered(&key(), span(*start, start + len));
            }

            let request = span(req_start, req_start + req_len);
            let gaps = index.gaps(&key(), request);
            let covered = index.covered(&key());

            // 갭은 요청 안에 있고 서로소이며 정렬되어 있다
            for pair in gaps.windows(2) {
                prop_assert!(pair[0].end < pair[1].start);
            }
            for gap in &gaps {
                prop_assert!(!gap.is_empty());
                prop_assert!(gap.start >= request.start && gap.end <= request.end);
            }

            for d in req_start..=req_start + req_len {
                let t = day(d);
                let in_covered = covered.iter().any(|s| s.contains(t));
                let in_gap = gaps.iter().any(|g| g.contains(t));
                prop_assert!(
                    in_covered != in_gap,
                    "day {} covered={} gap={}",
                    d,
                    in_covered,
                    in_gap
                );
            }
        }
    }
}

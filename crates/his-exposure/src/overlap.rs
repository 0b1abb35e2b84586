//! 时间区间重叠计算

use chrono::{DateTime, Utc};
use his_core::{effective_end, Movement};
use serde::Serialize;

/// 两个区间的交集
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Overlap {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub minutes: i64,
}

/// 计算两个区间的交集，缺失或晚于 `now` 的结束时间按 `now` 处理
///
/// 交集为空、长度为零或四舍五入后不足一分钟时返回 `None`，
/// 因此首尾相接的两个区间不算重叠。结果与参数顺序无关。
pub fn overlap(
    a_start: DateTime<Utc>,
    a_end: Option<DateTime<Utc>>,
    b_start: DateTime<Utc>,
    b_end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<Overlap> {
    let start = a_start.max(b_start);
    let end = effective_end(a_end, now).min(effective_end(b_end, now));
    if end <= start {
        return None;
    }

    let minutes = ((end - start).num_milliseconds() as f64 / 60_000.0).round() as i64;
    if minutes <= 0 {
        return None;
    }

    Some(Overlap { start, end, minutes })
}

/// 两条转科记录在时间上的重叠，不比较位置
pub fn movement_overlap(a: &Movement, b: &Movement, now: DateTime<Utc>) -> Option<Overlap> {
    overlap(a.start, a.end, b.start, b.end, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn hours_ago(h: i64) -> DateTime<Utc> {
        now() - Duration::hours(h)
    }

    #[test]
    fn test_partial_overlap() {
        let result = overlap(hours_ago(10), Some(hours_ago(4)), hours_ago(6), Some(hours_ago(1)), now()).unwrap();
        assert_eq!(result.start, hours_ago(6));
        assert_eq!(result.end, hours_ago(4));
        assert_eq!(result.minutes, 120);
    }

    #[test]
    fn test_overlap_is_symmetric() {
        let cases = [
            (hours_ago(10), Some(hours_ago(4)), hours_ago(6), Some(hours_ago(1))),
            (hours_ago(10), None, hours_ago(6), Some(hours_ago(1))),
            (hours_ago(3), None, hours_ago(8), None),
            (hours_ago(10), Some(hours_ago(9)), hours_ago(2), None),
            (hours_ago(5), Some(hours_ago(4)), hours_ago(4), Some(hours_ago(3))),
        ];
        for (a_start, a_end, b_start, b_end) in cases {
            assert_eq!(
                overlap(a_start, a_end, b_start, b_end, now()),
                overlap(b_start, b_end, a_start, a_end, now())
            );
        }
    }

    #[test]
    fn test_disjoint_intervals() {
        assert_eq!(overlap(hours_ago(10), Some(hours_ago(9)), hours_ago(5), Some(hours_ago(2)), now()), None);
    }

    #[test]
    fn test_touching_intervals() {
        assert_eq!(overlap(hours_ago(5), Some(hours_ago(4)), hours_ago(4), Some(hours_ago(3)), now()), None);
    }

    #[test]
    fn test_open_ends_use_now() {
        let result = overlap(hours_ago(3), None, hours_ago(8), None, now()).unwrap();
        assert_eq!(result.end, now());
        assert_eq!(result.minutes, 180);
    }

    #[test]
    fn test_future_end_counts_as_open() {
        let open = overlap(hours_ago(1), None, hours_ago(1), None, now()).unwrap();
        let scheduled = overlap(
            hours_ago(1),
            Some(now() + Duration::hours(3)),
            hours_ago(1),
            Some(now() + Duration::hours(3)),
            now(),
        )
        .unwrap();
        assert_eq!(scheduled, open);
        assert_eq!(scheduled.minutes, 60);
        assert_eq!(scheduled.end, now());
    }

    #[test]
    fn test_movement_starting_in_future_has_no_overlap() {
        let later = now() + Duration::hours(1);
        assert_eq!(overlap(later, Some(later + Duration::hours(2)), hours_ago(2), None, now()), None);
    }

    #[test]
    fn test_rounding_to_nearest_minute() {
        let start = hours_ago(1);
        let result = overlap(start, Some(start + Duration::seconds(90)), start, None, now()).unwrap();
        assert_eq!(result.minutes, 2);

        let result = overlap(start, Some(start + Duration::seconds(150)), start, None, now()).unwrap();
        assert_eq!(result.minutes, 3);

        // 不足半分钟四舍五入为 0，不计为重叠
        assert_eq!(overlap(start, Some(start + Duration::seconds(20)), start, None, now()), None);
    }
}

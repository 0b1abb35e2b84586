//! 候选人筛选
//!
//! 先按追溯窗口过滤索引患者自身的轨迹，再收集涉及的 (医院, 病区)，
//! 生成交给存储层的粗筛条件。

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use his_core::{CandidateQuery, Movement, Patient, WardKey};

/// 默认追溯天数
pub const DEFAULT_WINDOW_DAYS: i64 = 7;
/// 追溯天数上限
pub const MAX_WINDOW_DAYS: i64 = 36_500;

/// 追溯窗口（天），始终不小于 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceWindow {
    days: i64,
}

impl TraceWindow {
    /// 非正数回落到默认值
    pub fn new(days: i64) -> Self {
        Self::with_default(days, DEFAULT_WINDOW_DAYS)
    }

    fn with_default(days: i64, default_days: i64) -> Self {
        let days = if days >= 1 { days } else { default_days.max(1) };
        Self { days: days.min(MAX_WINDOW_DAYS) }
    }

    /// 解析查询参数
    ///
    /// 缺失、非数字或小于 1 的输入回落到 `default_days`；小数截断取整。
    pub fn parse(param: Option<&str>, default_days: i64) -> Self {
        let days = param
            .map(str::trim)
            .and_then(|raw| raw.parse::<f64>().ok())
            .filter(|value| value.is_finite())
            .map(|value| value.trunc() as i64)
            .unwrap_or(0);
        Self::with_default(days, default_days)
    }

    pub fn days(&self) -> i64 {
        self.days
    }

    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.days)
    }
}

impl Default for TraceWindow {
    fn default() -> Self {
        Self { days: DEFAULT_WINDOW_DAYS }
    }
}

/// 筛选结果：窗口内的索引轨迹与候选人查询条件
#[derive(Debug, Clone)]
pub struct CandidateSelection {
    pub index_movements: Vec<Movement>,
    pub query: CandidateQuery,
}

/// 窗口内的轨迹：有效区间 `[start, end 或 now]` 与 `[window_start, now]` 相交
pub fn recent_movements(
    movements: &[Movement],
    window_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Vec<Movement> {
    movements
        .iter()
        .filter(|m| m.start <= now && m.effective_end(now) >= window_start)
        .cloned()
        .collect()
}

/// 去重后的 (医院, 病区)，保持首次出现的顺序
pub fn touched_locations(movements: &[Movement]) -> Vec<WardKey> {
    let mut seen = HashSet::new();
    movements
        .iter()
        .map(Movement::location)
        .filter(|loc| seen.insert(loc.clone()))
        .collect()
}

/// 为索引患者生成候选人查询；窗口内没有任何轨迹时返回 `None`，调用方不应再查询
pub fn select_candidates(
    index: &Patient,
    window: TraceWindow,
    now: DateTime<Utc>,
) -> Option<CandidateSelection> {
    let window_start = window.start(now);
    let index_movements = recent_movements(&index.movements, window_start, now);
    if index_movements.is_empty() {
        return None;
    }

    let locations = touched_locations(&index_movements);
    Some(CandidateSelection {
        query: CandidateQuery {
            exclude_abha_id: index.abha_id.clone(),
            locations,
            window_start,
            now,
        },
        index_movements,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use his_core::NewPatient;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn days_ago(d: i64) -> DateTime<Utc> {
        now() - Duration::days(d)
    }

    fn movement(hospital: &str, ward: &str, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Movement {
        Movement {
            id: Uuid::new_v4(),
            hospital_id: hospital.to_string(),
            ward: ward.to_string(),
            bed: None,
            start,
            end,
        }
    }

    #[test]
    fn test_window_parse() {
        assert_eq!(TraceWindow::parse(None, 7).days(), 7);
        assert_eq!(TraceWindow::parse(Some("abc"), 7).days(), 7);
        assert_eq!(TraceWindow::parse(Some("0"), 7).days(), 7);
        assert_eq!(TraceWindow::parse(Some("-3"), 7).days(), 7);
        assert_eq!(TraceWindow::parse(Some("2.9"), 7).days(), 2);
        assert_eq!(TraceWindow::parse(Some(" 14 "), 7).days(), 14);
        assert_eq!(TraceWindow::parse(Some("NaN"), 7).days(), 7);
        assert_eq!(TraceWindow::parse(Some("1e300"), 7).days(), MAX_WINDOW_DAYS);
        assert_eq!(TraceWindow::new(-1), TraceWindow::default());
    }

    #[test]
    fn test_recent_movements() {
        let movements = vec![
            movement("H1", "ICU", days_ago(20), Some(days_ago(10))),
            movement("H1", "WARD-2", days_ago(9), Some(days_ago(6))),
            movement("H1", "WARD-3", days_ago(2), None),
        ];
        let recent = recent_movements(&movements, days_ago(7), now());
        let wards: Vec<_> = recent.iter().map(|m| m.ward.as_str()).collect();
        assert_eq!(wards, vec!["WARD-2", "WARD-3"]);
    }

    #[test]
    fn test_touched_locations_are_distinct() {
        let movements = vec![
            movement("H1", "ICU", days_ago(3), Some(days_ago(2))),
            movement("H2", "ICU", days_ago(2), Some(days_ago(1))),
            movement("H1", "ICU", days_ago(1), None),
        ];
        let locations = touched_locations(&movements);
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0].hospital_id, "H1");
        assert_eq!(locations[1].hospital_id, "H2");
    }

    #[test]
    fn test_short_circuit_when_no_recent_movement() {
        let mut index = NewPatient::new("INDEX", "Index").unwrap().into_patient(days_ago(30));
        index.movements.push(movement("H1", "ICU", days_ago(15), Some(days_ago(10))));

        assert!(select_candidates(&index, TraceWindow::new(7), now()).is_none());

        let selection = select_candidates(&index, TraceWindow::new(14), now()).unwrap();
        assert_eq!(selection.query.exclude_abha_id, "INDEX");
        assert_eq!(selection.query.window_start, days_ago(14));
        assert_eq!(selection.index_movements.len(), 1);
    }
}

//! 暴露聚合
//!
//! 对每个候选人，遍历 (索引轨迹, 候选轨迹) 中医院与病区都相同的组合，
//! 累加重叠分钟数。没有任何有效重叠的候选人不会出现在结果里。

use chrono::{DateTime, Utc};
use his_core::{Movement, Patient};
use serde::Serialize;
use tracing::warn;

use crate::overlap::movement_overlap;

/// 单个病区的重叠明细
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlapDetail {
    pub ward: String,
    pub hospital_id: String,
    pub overlap_start: DateTime<Utc>,
    pub overlap_end: DateTime<Utc>,
    pub minutes: i64,
}

/// 单个候选人的聚合暴露
#[derive(Debug, Clone)]
pub struct AggregatedExposure<'a> {
    pub patient: &'a Patient,
    pub total_minutes: i64,
    pub details: Vec<OverlapDetail>,
}

/// 聚合所有候选人的暴露，按候选人首次命中的顺序返回
///
/// `end < start` 的脏数据会被跳过并记录告警，不中断计算。
pub fn aggregate_exposures<'a>(
    index_movements: &[Movement],
    candidates: &'a [Patient],
    now: DateTime<Utc>,
) -> Vec<AggregatedExposure<'a>> {
    let index_movements: Vec<&Movement> = index_movements
        .iter()
        .filter(|m| well_formed_or_warn(m, "index"))
        .collect();

    let mut exposures = Vec::new();
    for candidate in candidates {
        let mut exposure: Option<AggregatedExposure<'a>> = None;

        for candidate_move in &candidate.movements {
            if !well_formed_or_warn(candidate_move, &candidate.abha_id) {
                continue;
            }
            for index_move in &index_movements {
                if !index_move.same_location(candidate_move) {
                    continue;
                }
                let Some(overlap) = movement_overlap(index_move, candidate_move, now) else {
                    continue;
                };

                let entry = exposure.get_or_insert_with(|| AggregatedExposure {
                    patient: candidate,
                    total_minutes: 0,
                    details: Vec::new(),
                });
                entry.total_minutes += overlap.minutes;
                entry.details.push(OverlapDetail {
                    ward: candidate_move.ward.clone(),
                    hospital_id: candidate_move.hospital_id.clone(),
                    overlap_start: overlap.start,
                    overlap_end: overlap.end,
                    minutes: overlap.minutes,
                });
            }
        }

        if let Some(exposure) = exposure {
            exposures.push(exposure);
        }
    }

    exposures
}

fn well_formed_or_warn(movement: &Movement, owner: &str) -> bool {
    if movement.is_well_formed() {
        return true;
    }
    warn!(
        "Skipping malformed movement {} of {}: end precedes start",
        movement.id, owner
    );
    false
}

//! 风险评分
//!
//! `risk = round((min(minutes / saturation, 1) * duration_weight
//!        + vulnerability * vulnerability_weight) * 100)`，取值 0–100。

use chrono::{DateTime, Utc};
use his_core::{HisError, Patient, Result};
use serde::{Deserialize, Serialize};

/// 暴露时长权重
pub const DURATION_WEIGHT: f64 = 0.7;
/// 易感性权重
pub const VULNERABILITY_WEIGHT: f64 = 0.3;
/// 时长饱和点（分钟），超过后时长项不再增加
pub const SATURATION_MINUTES: f64 = 240.0;
/// 高龄或免疫功能低下
pub const ELEVATED_VULNERABILITY: f64 = 1.0;
/// 其他患者
pub const BASELINE_VULNERABILITY: f64 = 0.5;
/// 年龄大于该值视为高龄
pub const ELDERLY_AGE_THRESHOLD: u32 = 65;

/// 评分参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    pub duration_weight: f64,
    pub vulnerability_weight: f64,
    pub saturation_minutes: f64,
    pub elevated_vulnerability: f64,
    pub baseline_vulnerability: f64,
    pub elderly_age_threshold: u32,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            duration_weight: DURATION_WEIGHT,
            vulnerability_weight: VULNERABILITY_WEIGHT,
            saturation_minutes: SATURATION_MINUTES,
            elevated_vulnerability: ELEVATED_VULNERABILITY,
            baseline_vulnerability: BASELINE_VULNERABILITY,
            elderly_age_threshold: ELDERLY_AGE_THRESHOLD,
        }
    }
}

impl RiskWeights {
    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("duration_weight", self.duration_weight),
            ("vulnerability_weight", self.vulnerability_weight),
            ("elevated_vulnerability", self.elevated_vulnerability),
            ("baseline_vulnerability", self.baseline_vulnerability),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(HisError::Config(format!("{} must be a non-negative number", name)));
            }
        }
        if !self.saturation_minutes.is_finite() || self.saturation_minutes <= 0.0 {
            return Err(HisError::Config("saturation_minutes must be positive".to_string()));
        }
        Ok(())
    }
}

/// 风险评分器
#[derive(Debug, Clone, Default)]
pub struct RiskScorer {
    weights: RiskWeights,
}

impl RiskScorer {
    pub fn new(weights: RiskWeights) -> Self {
        Self { weights }
    }

    /// 二值易感性：高龄或免疫功能低下取高值
    pub fn vulnerability(&self, patient: &Patient, now: DateTime<Utc>) -> f64 {
        let elderly = patient
            .age_at(now)
            .map_or(false, |age| age > self.weights.elderly_age_threshold);
        if elderly || patient.immunocompromised {
            self.weights.elevated_vulnerability
        } else {
            self.weights.baseline_vulnerability
        }
    }

    pub fn score(&self, total_minutes: i64, vulnerability: f64) -> u8 {
        let w = &self.weights;
        let normalized = (total_minutes.max(0) as f64 / w.saturation_minutes).min(1.0);
        let raw = normalized * w.duration_weight + vulnerability * w.vulnerability_weight;
        (raw * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

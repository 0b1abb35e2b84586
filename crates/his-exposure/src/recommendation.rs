//! 处置建议
//!
//! 根据风险评分给出唯一的处置等级，边界值（75、50、25）归入较低等级。

use serde::Serialize;

/// 风险等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Medium,
    High,
    Critical,
}

/// 处置动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendedAction {
    Monitor,           // 观察
    PriorityScreening, // 优先筛查
    Isolate,           // 隔离
}

/// 处置建议
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub level: RiskLevel,
    pub action: RecommendedAction,
    pub message: String,
}

/// 评分 ≤ 25 时不给出建议
pub fn recommend(risk_score: u8) -> Option<Recommendation> {
    let (level, action, message) = match risk_score {
        s if s > 75 => (
            RiskLevel::Critical,
            RecommendedAction::Isolate,
            format!(
                "Critical exposure risk ({}): isolate immediately and start contact precautions",
                s
            ),
        ),
        s if s > 50 => (
            RiskLevel::High,
            RecommendedAction::PriorityScreening,
            format!("High exposure risk ({}): schedule priority MDR screening", s),
        ),
        s if s > 25 => (
            RiskLevel::Medium,
            RecommendedAction::Monitor,
            format!("Moderate exposure risk ({}): monitor for signs of infection", s),
        ),
        _ => return None,
    };

    Some(Recommendation { level, action, message })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries_fall_to_lower_tier() {
        assert_eq!(recommend(25), None);
        assert_eq!(recommend(26).unwrap().action, RecommendedAction::Monitor);
        assert_eq!(recommend(50).unwrap().action, RecommendedAction::Monitor);
        assert_eq!(recommend(51).unwrap().action, RecommendedAction::PriorityScreening);
        assert_eq!(recommend(75).unwrap().action, RecommendedAction::PriorityScreening);
        assert_eq!(recommend(76).unwrap().action, RecommendedAction::Isolate);
    }

    #[test]
    fn test_tiers_partition_score_range() {
        for score in 0..=100u8 {
            let tier = recommend(score).map(|r| r.action);
            let expected = if score > 75 {
                Some(RecommendedAction::Isolate)
            } else if score > 50 {
                Some(RecommendedAction::PriorityScreening)
            } else if score > 25 {
                Some(RecommendedAction::Monitor)
            } else {
                None
            };
            assert_eq!(tier, expected, "score {}", score);
        }
    }

    #[test]
    fn test_message_embeds_score() {
        let recommendation = recommend(85).unwrap();
        assert_eq!(recommendation.level, RiskLevel::Critical);
        assert!(recommendation.message.contains("85"));
    }
}

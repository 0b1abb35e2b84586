//! # HIS暴露追踪模块
//!
//! 多重耐药菌（MDR）接触者追踪：
//! - 重叠计算：两个住院区间的时间交集
//! - 候选人筛选：按追溯窗口和病区位置粗筛其他患者
//! - 暴露聚合：逐个候选人累加同病区重叠时长
//! - 风险评分与处置建议

pub mod aggregator;
pub mod candidate;
pub mod engine;
pub mod overlap;
pub mod recommendation;
pub mod scoring;

// 重新导出主要类型
pub use aggregator::{aggregate_exposures, AggregatedExposure, OverlapDetail};
pub use candidate::{select_candidates, CandidateSelection, TraceWindow, DEFAULT_WINDOW_DAYS};
pub use engine::{ExposureRecord, ExposureTracer};
pub use overlap::{movement_overlap, overlap, Overlap};
pub use recommendation::{recommend, Recommendation, RecommendedAction, RiskLevel};
pub use scoring::{RiskScorer, RiskWeights};

//! 暴露追踪引擎
//!
//! 协调候选人筛选、暴露聚合、风险评分和处置建议。每次请求都重新计算，
//! 不做缓存；与并发写入之间没有隔离保证，结果仅供临床分诊参考。

use chrono::{DateTime, Utc};
use his_core::{HisError, MovementStore, Movement, Patient, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::aggregator::{aggregate_exposures, OverlapDetail};
use crate::candidate::{select_candidates, TraceWindow, DEFAULT_WINDOW_DAYS};
use crate::recommendation::{recommend, Recommendation};
use crate::scoring::{RiskScorer, RiskWeights};

/// 单个接触者的暴露记录（按请求计算，不持久化）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposureRecord {
    pub abha_id: String,
    pub name: String,
    pub total_minutes: i64,
    pub risk_score: u8,
    pub vulnerability: f64,
    pub details: Vec<OverlapDetail>,
    pub recommendation: Option<Recommendation>,
}

/// 暴露追踪引擎
#[derive(Debug, Clone)]
pub struct ExposureTracer {
    scorer: RiskScorer,
    default_window_days: i64,
}

impl Default for ExposureTracer {
    fn default() -> Self {
        Self::new(RiskWeights::default(), DEFAULT_WINDOW_DAYS)
    }
}

impl ExposureTracer {
    pub fn new(weights: RiskWeights, default_window_days: i64) -> Self {
        Self {
            scorer: RiskScorer::new(weights),
            default_window_days,
        }
    }

    /// 按配置的默认天数解析窗口参数
    pub fn window(&self, param: Option<&str>) -> TraceWindow {
        TraceWindow::parse(param, self.default_window_days)
    }

    /// 追踪索引患者的接触者，按风险评分降序返回
    ///
    /// 索引患者不存在时返回 [`HisError::NotFound`]；窗口内没有轨迹时直接返回空列表，
    /// 不会查询候选人。
    pub async fn trace<S>(
        &self,
        store: &S,
        abha_id: &str,
        window: TraceWindow,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExposureRecord>>
    where
        S: MovementStore + ?Sized,
    {
        info!("Tracing MDR exposures for {} over {} days", abha_id, window.days());

        let index = store
            .get_patient(abha_id)
            .await?
            .ok_or_else(|| HisError::NotFound(format!("Patient {} not found", abha_id)))?;

        let Some(selection) = select_candidates(&index, window, now) else {
            info!("No movements of {} inside the trace window", abha_id);
            return Ok(Vec::new());
        };
        debug!(
            "{} recent movements across {} locations",
            selection.index_movements.len(),
            selection.query.locations.len()
        );

        let candidates = store.find_exposure_candidates(&selection.query).await?;
        debug!("{} candidate patients returned by pre-filter", candidates.len());

        let records = self.assess(&selection.index_movements, &candidates, now);
        info!("{} exposed patients found for {}", records.len(), abha_id);
        Ok(records)
    }

    /// 对已取回的数据计算暴露列表（纯函数）
    pub fn assess(
        &self,
        index_movements: &[Movement],
        candidates: &[Patient],
        now: DateTime<Utc>,
    ) -> Vec<ExposureRecord> {
        let mut records: Vec<ExposureRecord> = aggregate_exposures(index_movements, candidates, now)
            .into_iter()
            .map(|exposure| {
                let vulnerability = self.scorer.vulnerability(exposure.patient, now);
                let risk_score = self.scorer.score(exposure.total_minutes, vulnerability);
                ExposureRecord {
                    abha_id: exposure.patient.abha_id.clone(),
                    name: exposure.patient.name.clone(),
                    total_minutes: exposure.total_minutes,
                    risk_score,
                    vulnerability,
                    details: exposure.details,
                    recommendation: recommend(risk_score),
                }
            })
            .collect();

        // 稳定排序，同分保持插入顺序
        records.sort_by(|a, b| b.risk_score.cmp(&a.risk_score));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate, TimeZone};
    use his_core::{CandidateQuery, NewMovement, NewPatient, PatientRepository};
    use his_database::MemoryRepository;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::recommendation::{RecommendedAction, RiskLevel};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn days_ago(d: i64) -> DateTime<Utc> {
        now() - Duration::days(d)
    }

    /// 记录候选人查询次数
    struct CountingStore {
        inner: MemoryRepository,
        candidate_queries: AtomicUsize,
    }

    #[async_trait]
    impl MovementStore for CountingStore {
        async fn get_patient(&self, abha_id: &str) -> Result<Option<Patient>> {
            self.inner.get_patient(abha_id).await
        }

        async fn find_exposure_candidates(&self, query: &CandidateQuery) -> Result<Vec<Patient>> {
            self.candidate_queries.fetch_add(1, Ordering::SeqCst);
            self.inner.find_exposure_candidates(query).await
        }
    }

    async fn admit(
        repo: &MemoryRepository,
        abha_id: &str,
        stays: &[(&str, &str, DateTime<Utc>, Option<DateTime<Utc>>)],
    ) {
        repo.create_patient(NewPatient::new(abha_id, abha_id).unwrap()).await.unwrap();
        for (hospital, ward, start, end) in stays {
            let movement = NewMovement::new(Some(*hospital), Some(*ward), None, Some(*start), *end).unwrap();
            repo.append_movement(abha_id, movement).await.unwrap();
        }
    }

    fn counting(inner: MemoryRepository) -> CountingStore {
        CountingStore { inner, candidate_queries: AtomicUsize::new(0) }
    }

    #[tokio::test]
    async fn test_reference_scenario() {
        let repo = MemoryRepository::new();
        admit(&repo, "INDEX", &[("HospA", "WardX", days_ago(3), Some(days_ago(1)))]).await;
        admit(&repo, "CONTACT", &[("HospA", "WardX", days_ago(2), Some(now()))]).await;

        let tracer = ExposureTracer::default();
        let records = tracer.trace(&repo, "INDEX", TraceWindow::new(7), now()).await.unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.abha_id, "CONTACT");
        assert_eq!(record.total_minutes, 1440);
        assert_eq!(record.vulnerability, 0.5);
        assert_eq!(record.risk_score, 85);
        let recommendation = record.recommendation.as_ref().unwrap();
        assert_eq!(recommendation.level, RiskLevel::Critical);
        assert_eq!(recommendation.action, RecommendedAction::Isolate);
        assert_eq!(record.details[0].overlap_start, days_ago(2));
        assert_eq!(record.details[0].overlap_end, days_ago(1));
    }

    #[tokio::test]
    async fn test_future_end_is_capped_at_now() {
        let repo = MemoryRepository::new();
        let scheduled_end = Some(now() + Duration::hours(3));
        admit(&repo, "INDEX", &[("HospA", "ICU", now() - Duration::hours(1), scheduled_end)]).await;
        admit(&repo, "CONTACT", &[("HospA", "ICU", now() - Duration::hours(1), scheduled_end)]).await;
        admit(&repo, "OPEN", &[("HospA", "ICU", now() - Duration::hours(1), None)]).await;

        let records = ExposureTracer::default().trace(&repo, "INDEX", TraceWindow::default(), now()).await.unwrap();
        assert_eq!(records.len(), 2);
        for record in &records {
            assert_eq!(record.total_minutes, 60);
            assert_eq!(record.details[0].overlap_end, now());
            // 60/240*0.7 + 0.5*0.3
            assert_eq!(record.risk_score, 33);
            let recommendation = record.recommendation.as_ref().unwrap();
            assert_eq!(recommendation.level, RiskLevel::Medium);
            assert_eq!(recommendation.action, RecommendedAction::Monitor);
        }
        let order: Vec<_> = records.iter().map(|r| r.abha_id.as_str()).collect();
        assert_eq!(order, vec!["CONTACT", "OPEN"]);
    }

    #[tokio::test]
    async fn test_unknown_index_patient() {
        let repo = MemoryRepository::new();
        let result = ExposureTracer::default().trace(&repo, "MISSING", TraceWindow::default(), now()).await;
        assert!(matches!(result, Err(HisError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_short_circuit_skips_candidate_query() {
        let repo = MemoryRepository::new();
        admit(&repo, "INDEX", &[("HospA", "WardX", days_ago(12), Some(days_ago(10)))]).await;
        admit(&repo, "CONTACT", &[("HospA", "WardX", days_ago(12), None)]).await;
        let store = counting(repo);

        let records = ExposureTracer::default().trace(&store, "INDEX", TraceWindow::new(7), now()).await.unwrap();
        assert!(records.is_empty());
        assert_eq!(store.candidate_queries.load(Ordering::SeqCst), 0);

        let records = ExposureTracer::default().trace(&store, "INDEX", TraceWindow::new(14), now()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(store.candidate_queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ward_mismatch_returns_empty() {
        let repo = MemoryRepository::new();
        admit(&repo, "INDEX", &[("HospA", "WardA", days_ago(3), None)]).await;
        admit(&repo, "CONTACT", &[("HospA", "WardB", days_ago(3), None)]).await;

        let records = ExposureTracer::default().trace(&repo, "INDEX", TraceWindow::default(), now()).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_sorted_by_descending_risk() {
        let repo = MemoryRepository::new();
        admit(&repo, "INDEX", &[("HospA", "ICU", days_ago(2), None)]).await;
        // 30 分钟，基础易感性
        admit(&repo, "LOW", &[("HospA", "ICU", now() - Duration::minutes(30), None)]).await;
        // 2 小时，基础易感性
        admit(&repo, "MID", &[("HospA", "ICU", now() - Duration::hours(2), None)]).await;
        // 2 小时，免疫功能低下
        admit(&repo, "HIGH", &[("HospA", "ICU", now() - Duration::hours(2), None)]).await;
        repo.update_patient(
            "HIGH",
            &his_core::PatientUpdate { immunocompromised: Some(true), ..Default::default() },
        )
        .await
        .unwrap();

        let records = ExposureTracer::default().trace(&repo, "INDEX", TraceWindow::default(), now()).await.unwrap();
        let order: Vec<_> = records.iter().map(|r| r.abha_id.as_str()).collect();
        assert_eq!(order, vec!["HIGH", "MID", "LOW"]);
        assert!(records.windows(2).all(|w| w[0].risk_score > w[1].risk_score));
        assert_eq!(records[2].risk_score, 24);
        assert!(records[2].recommendation.is_none());
    }

    #[tokio::test]
    async fn test_elderly_contact_is_more_vulnerable() {
        let repo = MemoryRepository::new();
        admit(&repo, "INDEX", &[("HospA", "ICU", days_ago(1), None)]).await;
        admit(&repo, "ELDER", &[("HospA", "ICU", now() - Duration::hours(2), None)]).await;
        repo.update_patient(
            "ELDER",
            &his_core::PatientUpdate { birth_date: Some(NaiveDate::from_ymd_opt(1940, 1, 1)), ..Default::default() },
        )
        .await
        .unwrap();

        let records = ExposureTracer::default().trace(&repo, "INDEX", TraceWindow::default(), now()).await.unwrap();
        assert_eq!(records[0].vulnerability, 1.0);
        // 120/240*0.7 + 1.0*0.3
        assert_eq!(records[0].risk_score, 65);
    }

    #[test]
    fn test_record_json_shape() {
        let record = ExposureRecord {
            abha_id: "C1".into(),
            name: "Contact".into(),
            total_minutes: 30,
            risk_score: 24,
            vulnerability: 0.5,
            details: vec![],
            recommendation: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["abhaId"], "C1");
        assert_eq!(json["totalMinutes"], 30);
        assert_eq!(json["riskScore"], 24);
        assert!(json["recommendation"].is_null());
    }
}

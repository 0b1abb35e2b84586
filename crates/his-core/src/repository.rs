//! 存储接口
//!
//! 业务层只依赖这些 trait，不直接接触数据库连接。PostgreSQL 与内存实现见
//! `his-database`。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    MdrStatus, Movement, NewMovement, NewPatient, NewScreening, Patient, PatientFilter,
    PatientUpdate, Screening, WardKey,
};
use crate::records::{
    MedicalRecord, MedicalRecordUpdate, NewMedicalRecord, NewPrescription, NewUser, Prescription,
    PrescriptionStatus, User, UserUpdate,
};

/// 暴露候选人的粗筛条件
///
/// 返回的患者至少有一条轨迹位于 `locations` 之一，且 `start <= now` 并且
/// 尚未结束或结束时间不早于 `window_start`。允许误报，不允许漏报。
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub exclude_abha_id: String,
    pub locations: Vec<WardKey>,
    pub window_start: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

impl CandidateQuery {
    /// 单条轨迹是否满足粗筛条件
    pub fn matches_movement(&self, movement: &Movement) -> bool {
        let in_location = self
            .locations
            .iter()
            .any(|loc| loc.hospital_id == movement.hospital_id && loc.ward == movement.ward);
        let could_overlap =
            movement.start <= self.now && movement.effective_end(self.now) >= self.window_start;
        in_location && could_overlap
    }

    pub fn matches_patient(&self, patient: &Patient) -> bool {
        patient.abha_id != self.exclude_abha_id
            && patient.movements.iter().any(|m| self.matches_movement(m))
    }
}

/// 暴露追踪所需的最小读取接口
#[async_trait]
pub trait MovementStore: Send + Sync {
    /// 按外部健康ID加载患者（含全部轨迹与筛查）
    async fn get_patient(&self, abha_id: &str) -> Result<Option<Patient>>;

    /// 按粗筛条件查找其他患者，返回的患者携带全部轨迹
    async fn find_exposure_candidates(&self, query: &CandidateQuery) -> Result<Vec<Patient>>;
}

/// 患者、转科轨迹与筛查记录的存储
#[async_trait]
pub trait PatientRepository: MovementStore {
    async fn create_patient(&self, patient: NewPatient) -> Result<Patient>;

    async fn list_patients(&self, filter: &PatientFilter) -> Result<Vec<Patient>>;

    async fn update_patient(&self, abha_id: &str, update: &PatientUpdate) -> Result<Patient>;

    async fn set_mdr_status(&self, abha_id: &str, status: MdrStatus) -> Result<Patient>;

    /// 追加一条转科记录
    async fn append_movement(&self, abha_id: &str, movement: NewMovement) -> Result<Movement>;

    /// 关闭一条仍在院的转科记录
    async fn close_movement(
        &self,
        abha_id: &str,
        movement_id: Uuid,
        end: DateTime<Utc>,
    ) -> Result<Movement>;

    async fn add_screening(&self, abha_id: &str, screening: NewScreening) -> Result<Screening>;

    /// 存储连通性检查，内存存储始终可用
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// 病历与处方的存储
#[async_trait]
pub trait RecordRepository: Send + Sync {
    async fn create_record(&self, abha_id: &str, record: NewMedicalRecord) -> Result<MedicalRecord>;

    async fn list_records(&self, abha_id: &str) -> Result<Vec<MedicalRecord>>;

    async fn get_record(&self, id: Uuid) -> Result<Option<MedicalRecord>>;

    async fn update_record(&self, id: Uuid, update: &MedicalRecordUpdate) -> Result<MedicalRecord>;

    async fn delete_record(&self, id: Uuid) -> Result<()>;

    async fn create_prescription(
        &self,
        abha_id: &str,
        prescription: NewPrescription,
    ) -> Result<Prescription>;

    async fn list_prescriptions(&self, abha_id: &str) -> Result<Vec<Prescription>>;

    async fn update_prescription_status(
        &self,
        id: Uuid,
        status: PrescriptionStatus,
    ) -> Result<Prescription>;
}

/// 用户的存储
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<User>;

    async fn list_users(&self) -> Result<Vec<User>>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;

    async fn update_user(&self, id: Uuid, update: &UserUpdate) -> Result<User>;
}

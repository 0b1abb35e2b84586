//! 病历、处方与用户模型

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{HisError, Result};
use crate::utils::require_non_blank;

/// 病历类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Consultation,     // 门诊/会诊
    Diagnosis,        // 诊断
    LabResult,        // 检验结果
    Imaging,          // 影像
    DischargeSummary, // 出院小结
    Other,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Consultation => "consultation",
            RecordType::Diagnosis => "diagnosis",
            RecordType::LabResult => "lab_result",
            RecordType::Imaging => "imaging",
            RecordType::DischargeSummary => "discharge_summary",
            RecordType::Other => "other",
        }
    }
}

impl FromStr for RecordType {
    type Err = HisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "consultation" => Ok(RecordType::Consultation),
            "diagnosis" => Ok(RecordType::Diagnosis),
            "lab_result" => Ok(RecordType::LabResult),
            "imaging" => Ok(RecordType::Imaging),
            "discharge_summary" => Ok(RecordType::DischargeSummary),
            "other" => Ok(RecordType::Other),
            other => Err(HisError::Validation(format!("invalid record type '{}'", other))),
        }
    }
}

/// 病历
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub record_type: RecordType,
    pub title: String,
    pub description: String,
    pub diagnosis: Option<String>,
    pub recorded_by: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 新病历
#[derive(Debug, Clone)]
pub struct NewMedicalRecord {
    pub record_type: RecordType,
    pub title: String,
    pub description: String,
    pub diagnosis: Option<String>,
    pub recorded_by: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl NewMedicalRecord {
    pub fn new(record_type: &str, title: &str, recorded_at: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            record_type: record_type.parse()?,
            title: require_non_blank("title", title)?,
            description: String::new(),
            diagnosis: None,
            recorded_by: None,
            recorded_at,
        })
    }

    pub fn into_record(self, patient_id: Uuid, now: DateTime<Utc>) -> MedicalRecord {
        MedicalRecord {
            id: Uuid::new_v4(),
            patient_id,
            record_type: self.record_type,
            title: self.title,
            description: self.description,
            diagnosis: self.diagnosis,
            recorded_by: self.recorded_by,
            recorded_at: self.recorded_at,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 病历更新
#[derive(Debug, Clone, Default)]
pub struct MedicalRecordUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub diagnosis: Option<String>,
}

impl MedicalRecordUpdate {
    pub fn apply(&self, record: &mut MedicalRecord, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            record.title = title.clone();
        }
        if let Some(description) = &self.description {
            record.description = description.clone();
        }
        if self.diagnosis.is_some() {
            record.diagnosis = self.diagnosis.clone();
        }
        record.updated_at = now;
    }
}

/// 处方状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PrescriptionStatus {
    Active,
    Completed,
    Cancelled,
}

impl PrescriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrescriptionStatus::Active => "active",
            PrescriptionStatus::Completed => "completed",
            PrescriptionStatus::Cancelled => "cancelled",
        }
    }

    /// 只有进行中的处方可以结束或取消
    pub fn transition(&self, to: PrescriptionStatus) -> Result<PrescriptionStatus> {
        match (self, to) {
            (PrescriptionStatus::Active, PrescriptionStatus::Completed)
            | (PrescriptionStatus::Active, PrescriptionStatus::Cancelled) => Ok(to),
            _ => Err(HisError::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
            }),
        }
    }
}

impl FromStr for PrescriptionStatus {
    type Err = HisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "active" => Ok(PrescriptionStatus::Active),
            "completed" => Ok(PrescriptionStatus::Completed),
            "cancelled" => Ok(PrescriptionStatus::Cancelled),
            other => Err(HisError::Validation(format!("invalid prescription status '{}'", other))),
        }
    }
}

/// 处方
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub medication: String,
    pub dosage: String,
    pub frequency: String,
    pub duration_days: Option<i32>,
    pub prescribed_by: Option<String>,
    pub status: PrescriptionStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 新处方
#[derive(Debug, Clone)]
pub struct NewPrescription {
    pub medication: String,
    pub dosage: String,
    pub frequency: String,
    pub duration_days: Option<i32>,
    pub prescribed_by: Option<String>,
    pub notes: Option<String>,
}

impl NewPrescription {
    pub fn new(medication: &str, dosage: &str, frequency: &str) -> Result<Self> {
        Ok(Self {
            medication: require_non_blank("medication", medication)?,
            dosage: require_non_blank("dosage", dosage)?,
            frequency: require_non_blank("frequency", frequency)?,
            duration_days: None,
            prescribed_by: None,
            notes: None,
        })
    }

    pub fn with_duration(mut self, days: Option<i32>) -> Result<Self> {
        if let Some(d) = days {
            if d <= 0 {
                return Err(HisError::Validation("durationDays must be positive".to_string()));
            }
        }
        self.duration_days = days;
        Ok(self)
    }

    pub fn into_prescription(self, patient_id: Uuid, now: DateTime<Utc>) -> Prescription {
        Prescription {
            id: Uuid::new_v4(),
            patient_id,
            medication: self.medication,
            dosage: self.dosage,
            frequency: self.frequency,
            duration_days: self.duration_days,
            prescribed_by: self.prescribed_by,
            status: PrescriptionStatus::Active,
            notes: self.notes,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 用户角色
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Doctor,
    Nurse,
    Pharmacist,
    InfectionControl, // 院感科
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Doctor => "doctor",
            UserRole::Nurse => "nurse",
            UserRole::Pharmacist => "pharmacist",
            UserRole::InfectionControl => "infection_control",
        }
    }
}

impl FromStr for UserRole {
    type Err = HisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "admin" => Ok(UserRole::Admin),
            "doctor" => Ok(UserRole::Doctor),
            "nurse" => Ok(UserRole::Nurse),
            "pharmacist" => Ok(UserRole::Pharmacist),
            "infection_control" => Ok(UserRole::InfectionControl),
            other => Err(HisError::Validation(format!("invalid user role '{}'", other))),
        }
    }
}

/// 用户信息（不包含凭据）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub email: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// 新用户
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub name: String,
    pub email: Option<String>,
    pub role: UserRole,
}

impl NewUser {
    pub fn new(username: &str, name: &str, role: &str) -> Result<Self> {
        let username = require_non_blank("username", username)?;
        if username.chars().any(char::is_whitespace) {
            return Err(HisError::Validation("username must not contain whitespace".to_string()));
        }
        Ok(Self {
            username,
            name: require_non_blank("name", name)?,
            email: None,
            role: role.parse()?,
        })
    }

    pub fn into_user(self, now: DateTime<Utc>) -> User {
        User {
            id: Uuid::new_v4(),
            username: self.username,
            name: self.name,
            email: self.email,
            role: self.role,
            is_active: true,
            created_at: now,
        }
    }
}

/// 用户更新
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

impl UserUpdate {
    pub fn apply(&self, user: &mut User) {
        if let Some(name) = &self.name {
            user.name = name.clone();
        }
        if self.email.is_some() {
            user.email = self.email.clone();
        }
        if let Some(role) = self.role {
            user.role = role;
        }
        if let Some(active) = self.is_active {
            user.is_active = active;
        }
    }
}

//! 数据库模型

use chrono::{DateTime, NaiveDate, Utc};
use his_core::models::*;
use his_core::records::*;
use his_core::{HisError, Result};
use sqlx::FromRow;
use uuid::Uuid;

// 数据库表模型 - 使用FromRow trait用于SQL查询

/// 数据库患者表
#[derive(Debug, FromRow)]
pub struct DbPatient {
    pub id: Uuid,
    pub abha_id: String,
    pub name: String,
    pub sex: Option<String>, // 存储为单字符代码
    pub birth_date: Option<NaiveDate>,
    pub immunocompromised: bool,
    pub contact: Option<String>,
    pub mdr_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbPatient {
    /// 与轨迹、筛查记录组装成完整患者；无法识别的MDR状态视为数据损坏
    pub fn into_patient(self, movements: Vec<Movement>, screenings: Vec<Screening>) -> Result<Patient> {
        let mdr_status = self
            .mdr_status
            .parse()
            .map_err(|_| HisError::Database(format!("corrupt MDR status on patient {}", self.abha_id)))?;
        Ok(Patient {
            id: self.id,
            abha_id: self.abha_id,
            name: self.name,
            sex: self.sex.as_deref().and_then(Sex::from_code),
            birth_date: self.birth_date,
            immunocompromised: self.immunocompromised,
            contact: self.contact,
            mdr_status,
            movements,
            screenings,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// 数据库转科轨迹表
#[derive(Debug, FromRow)]
pub struct DbMovement {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub hospital_id: String,
    pub ward: String,
    pub bed: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
}

impl From<DbMovement> for Movement {
    fn from(db_movement: DbMovement) -> Self {
        Movement {
            id: db_movement.id,
            hospital_id: db_movement.hospital_id,
            ward: db_movement.ward,
            bed: db_movement.bed,
            start: db_movement.start_at,
            end: db_movement.end_at,
        }
    }
}

/// 数据库筛查表
#[derive(Debug, FromRow)]
pub struct DbScreening {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub pathogen: String,
    pub sample_type: Option<String>,
    pub result: String,
    pub collected_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl TryFrom<DbScreening> for Screening {
    type Error = HisError;

    fn try_from(db_screening: DbScreening) -> Result<Self> {
        let result = db_screening
            .result
            .parse()
            .map_err(|_| HisError::Database(format!("corrupt result on screening {}", db_screening.id)))?;
        Ok(Screening {
            id: db_screening.id,
            pathogen: db_screening.pathogen,
            sample_type: db_screening.sample_type,
            result,
            collected_at: db_screening.collected_at,
            notes: db_screening.notes,
        })
    }
}

/// 数据库病历表
#[derive(Debug, FromRow)]
pub struct DbMedicalRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub record_type: String,
    pub title: String,
    pub description: String,
    pub diagnosis: Option<String>,
    pub recorded_by: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbMedicalRecord> for MedicalRecord {
    fn from(db_record: DbMedicalRecord) -> Self {
        MedicalRecord {
            id: db_record.id,
            patient_id: db_record.patient_id,
            record_type: db_record.record_type.parse().unwrap_or(RecordType::Other),
            title: db_record.title,
            description: db_record.description,
            diagnosis: db_record.diagnosis,
            recorded_by: db_record.recorded_by,
            recorded_at: db_record.recorded_at,
            created_at: db_record.created_at,
            updated_at: db_record.updated_at,
        }
    }
}

/// 数据库处方表
#[derive(Debug, FromRow)]
pub struct DbPrescription {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub medication: String,
    pub dosage: String,
    pub frequency: String,
    pub duration_days: Option<i32>,
    pub prescribed_by: Option<String>,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbPrescription> for Prescription {
    type Error = HisError;

    fn try_from(db_rx: DbPrescription) -> Result<Self> {
        let status = db_rx
            .status
            .parse()
            .map_err(|_| HisError::Database(format!("corrupt status on prescription {}", db_rx.id)))?;
        Ok(Prescription {
            id: db_rx.id,
            patient_id: db_rx.patient_id,
            medication: db_rx.medication,
            dosage: db_rx.dosage,
            frequency: db_rx.frequency,
            duration_days: db_rx.duration_days,
            prescribed_by: db_rx.prescribed_by,
            status,
            notes: db_rx.notes,
            created_at: db_rx.created_at,
            updated_at: db_rx.updated_at,
        })
    }
}

/// 数据库用户表
#[derive(Debug, FromRow)]
pub struct DbUser {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub email: Option<String>,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbUser> for User {
    type Error = HisError;

    fn try_from(db_user: DbUser) -> Result<Self> {
        let role = db_user
            .role
            .parse()
            .map_err(|_| HisError::Database(format!("corrupt role on user {}", db_user.id)))?;
        Ok(User {
            id: db_user.id,
            username: db_user.username,
            name: db_user.name,
            email: db_user.email,
            role,
            is_active: db_user.is_active,
            created_at: db_user.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient_row(mdr_status: &str) -> DbPatient {
        let now = Utc::now();
        DbPatient {
            id: Uuid::new_v4(),
            abha_id: "ABHA-1".to_string(),
            name: "Asha".to_string(),
            sex: Some("F".to_string()),
            birth_date: None,
            immunocompromised: false,
            contact: None,
            mdr_status: mdr_status.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_patient_row_conversion() {
        let patient = patient_row("positive").into_patient(Vec::new(), Vec::new()).unwrap();
        assert_eq!(patient.mdr_status, MdrStatus::Positive);
        assert_eq!(patient.sex, Some(Sex::Female));
    }

    #[test]
    fn test_corrupt_mdr_status_is_surfaced() {
        let result = patient_row("infected").into_patient(Vec::new(), Vec::new());
        assert!(matches!(result, Err(HisError::Database(_))));
    }

    #[test]
    fn test_corrupt_screening_result_is_surfaced() {
        let row = DbScreening {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            pathogen: "CRE".to_string(),
            sample_type: None,
            result: "maybe".to_string(),
            collected_at: Utc::now(),
            notes: None,
        };
        assert!(matches!(Screening::try_from(row), Err(HisError::Database(_))));
    }
}

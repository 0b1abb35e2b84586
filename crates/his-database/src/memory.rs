//! 内存存储实现
//!
//! 用于开发环境和测试，进程退出即丢失。每个集合一把读写锁，返回结果按
//! 创建时间排序以保证输出确定。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use his_core::{
    CandidateQuery, HisError, MdrStatus, MedicalRecord, MedicalRecordUpdate, Movement,
    MovementStore, NewMedicalRecord, NewMovement, NewPatient, NewPrescription, NewScreening,
    NewUser, Patient, PatientFilter, PatientRepository, PatientUpdate, Prescription,
    PrescriptionStatus, RecordRepository, Result, Screening, User, UserRepository, UserUpdate,
};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MemoryRepository {
    patients: RwLock<HashMap<String, Patient>>, // 以 abha_id 为键
    records: RwLock<HashMap<Uuid, MedicalRecord>>,
    prescriptions: RwLock<HashMap<Uuid, Prescription>>,
    users: RwLock<HashMap<Uuid, User>>,
}

fn patient_not_found(abha_id: &str) -> HisError {
    HisError::NotFound(format!("Patient {} not found", abha_id))
}

fn sorted_patients<'a>(patients: impl Iterator<Item = &'a Patient>) -> Vec<&'a Patient> {
    let mut sorted: Vec<&Patient> = patients.collect();
    sorted.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.abha_id.cmp(&b.abha_id)));
    sorted
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn patient_id(&self, abha_id: &str) -> Result<Uuid> {
        self.patients
            .read()
            .await
            .get(abha_id)
            .map(|p| p.id)
            .ok_or_else(|| patient_not_found(abha_id))
    }
}

#[async_trait]
impl MovementStore for MemoryRepository {
    async fn get_patient(&self, abha_id: &str) -> Result<Option<Patient>> {
        Ok(self.patients.read().await.get(abha_id).cloned())
    }

    async fn find_exposure_candidates(&self, query: &CandidateQuery) -> Result<Vec<Patient>> {
        let patients = self.patients.read().await;
        let candidates: Vec<Patient> = sorted_patients(patients.values())
            .into_iter()
            .filter(|p| query.matches_patient(p))
            .cloned()
            .collect();
        debug!("Candidate pre-filter matched {} patients", candidates.len());
        Ok(candidates)
    }
}

#[async_trait]
impl PatientRepository for MemoryRepository {
    async fn create_patient(&self, patient: NewPatient) -> Result<Patient> {
        let mut patients = self.patients.write().await;
        if patients.contains_key(&patient.abha_id) {
            return Err(HisError::Conflict(format!("Patient {} already exists", patient.abha_id)));
        }
        let patient = patient.into_patient(Utc::now());
        patients.insert(patient.abha_id.clone(), patient.clone());
        info!("Created patient {}", patient.abha_id);
        Ok(patient)
    }

    async fn list_patients(&self, filter: &PatientFilter) -> Result<Vec<Patient>> {
        let patients = self.patients.read().await;
        Ok(sorted_patients(patients.values())
            .into_iter()
            .filter(|p| filter.matches(p))
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn update_patient(&self, abha_id: &str, update: &PatientUpdate) -> Result<Patient> {
        let mut patients = self.patients.write().await;
        let patient = patients.get_mut(abha_id).ok_or_else(|| patient_not_found(abha_id))?;
        update.apply(patient);
        patient.updated_at = Utc::now();
        Ok(patient.clone())
    }

    async fn set_mdr_status(&self, abha_id: &str, status: MdrStatus) -> Result<Patient> {
        let mut patients = self.patients.write().await;
        let patient = patients.get_mut(abha_id).ok_or_else(|| patient_not_found(abha_id))?;
        patient.mdr_status = status;
        patient.updated_at = Utc::now();
        info!("MDR status of {} set to {}", abha_id, status);
        Ok(patient.clone())
    }

    async fn append_movement(&self, abha_id: &str, movement: NewMovement) -> Result<Movement> {
        let mut patients = self.patients.write().await;
        let patient = patients.get_mut(abha_id).ok_or_else(|| patient_not_found(abha_id))?;
        let movement = movement.into_movement();

        // 保持按开始时间有序
        let pos = patient.movements.partition_point(|m| m.start <= movement.start);
        patient.movements.insert(pos, movement.clone());
        patient.updated_at = Utc::now();
        info!("Recorded movement of {} into {}/{}", abha_id, movement.hospital_id, movement.ward);
        Ok(movement)
    }

    async fn close_movement(
        &self,
        abha_id: &str,
        movement_id: Uuid,
        end: DateTime<Utc>,
    ) -> Result<Movement> {
        let mut patients = self.patients.write().await;
        let patient = patients.get_mut(abha_id).ok_or_else(|| patient_not_found(abha_id))?;
        let movement = patient
            .movements
            .iter_mut()
            .find(|m| m.id == movement_id)
            .ok_or_else(|| HisError::NotFound(format!("Movement {} not found", movement_id)))?;
        movement.close(end)?;
        let closed = movement.clone();
        patient.updated_at = Utc::now();
        Ok(closed)
    }

    async fn add_screening(&self, abha_id: &str, screening: NewScreening) -> Result<Screening> {
        let mut patients = self.patients.write().await;
        let patient = patients.get_mut(abha_id).ok_or_else(|| patient_not_found(abha_id))?;
        let screening = screening.into_screening();
        patient.screenings.push(screening.clone());
        patient.updated_at = Utc::now();
        Ok(screening)
    }
}

#[async_trait]
impl RecordRepository for MemoryRepository {
    async fn create_record(&self, abha_id: &str, record: NewMedicalRecord) -> Result<MedicalRecord> {
        let patient_id = self.patient_id(abha_id).await?;
        let record = record.into_record(patient_id, Utc::now());
        self.records.write().await.insert(record.id, record.clone());
        Ok(record)
    }

    async fn list_records(&self, abha_id: &str) -> Result<Vec<MedicalRecord>> {
        let patient_id = self.patient_id(abha_id).await?;
        let mut records: Vec<MedicalRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.patient_id == patient_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(records)
    }

    async fn get_record(&self, id: Uuid) -> Result<Option<MedicalRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn update_record(&self, id: Uuid, update: &MedicalRecordUpdate) -> Result<MedicalRecord> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&id)
            .ok_or_else(|| HisError::NotFound(format!("Medical record {} not found", id)))?;
        update.apply(record, Utc::now());
        Ok(record.clone())
    }

    async fn delete_record(&self, id: Uuid) -> Result<()> {
        self.records
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| HisError::NotFound(format!("Medical record {} not found", id)))
    }

    async fn create_prescription(
        &self,
        abha_id: &str,
        prescription: NewPrescription,
    ) -> Result<Prescription> {
        let patient_id = self.patient_id(abha_id).await?;
        let prescription = prescription.into_prescription(patient_id, Utc::now());
        self.prescriptions.write().await.insert(prescription.id, prescription.clone());
        Ok(prescription)
    }

    async fn list_prescriptions(&self, abha_id: &str) -> Result<Vec<Prescription>> {
        let patient_id = self.patient_id(abha_id).await?;
        let mut prescriptions: Vec<Prescription> = self
            .prescriptions
            .read()
            .await
            .values()
            .filter(|p| p.patient_id == patient_id)
            .cloned()
            .collect();
        prescriptions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(prescriptions)
    }

    async fn update_prescription_status(
        &self,
        id: Uuid,
        status: PrescriptionStatus,
    ) -> Result<Prescription> {
        let mut prescriptions = self.prescriptions.write().await;
        let prescription = prescriptions
            .get_mut(&id)
            .ok_or_else(|| HisError::NotFound(format!("Prescription {} not found", id)))?;
        prescription.status = prescription.status.transition(status)?;
        prescription.updated_at = Utc::now();
        Ok(prescription.clone())
    }
}

#[async_trait]
impl UserRepository for MemoryRepository {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.username == user.username) {
            return Err(HisError::Conflict(format!("User {} already exists", user.username)));
        }
        let user = user.into_user(Utc::now());
        users.insert(user.id, user.clone());
        info!("Created user {} ({})", user.username, user.role.as_str());
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn update_user(&self, id: Uuid, update: &UserUpdate) -> Result<User> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| HisError::NotFound(format!("User {} not found", id)))?;
        update.apply(user);
        Ok(user.clone())
    }
}

//! PostgreSQL 存储实现

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use his_core::{
    CandidateQuery, HisError, MdrStatus, MedicalRecord, MedicalRecordUpdate, Movement,
    MovementStore, NewMedicalRecord, NewMovement, NewPatient, NewPrescription, NewScreening,
    NewUser, Patient, PatientFilter, PatientRepository, PatientUpdate, Prescription,
    PrescriptionStatus, RecordRepository, Result, Screening, User, UserRepository, UserUpdate,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::connection::DatabasePool;
use crate::queries::DatabaseQueries;

/// 基于 [`DatabaseQueries`] 的仓储
#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: DatabasePool,
}

impl PgRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    fn queries(&self) -> DatabaseQueries<'_> {
        DatabaseQueries::new(&self.pool)
    }

    async fn require_patient(&self, abha_id: &str) -> Result<Patient> {
        self.queries()
            .load_patient(abha_id)
            .await?
            .ok_or_else(|| HisError::NotFound(format!("Patient {} not found", abha_id)))
    }
}

#[async_trait]
impl MovementStore for PgRepository {
    async fn get_patient(&self, abha_id: &str) -> Result<Option<Patient>> {
        self.queries().load_patient(abha_id).await
    }

    async fn find_exposure_candidates(&self, query: &CandidateQuery) -> Result<Vec<Patient>> {
        if query.locations.is_empty() {
            return Ok(Vec::new());
        }
        let queries = self.queries();
        let rows = queries.candidate_patient_rows(query).await?;
        debug!("Candidate pre-filter matched {} patients", rows.len());
        queries.hydrate(rows).await
    }
}

#[async_trait]
impl PatientRepository for PgRepository {
    async fn create_patient(&self, patient: NewPatient) -> Result<Patient> {
        let patient = patient.into_patient(Utc::now());
        self.queries().insert_patient(&patient).await?;
        info!("Created patient {}", patient.abha_id);
        Ok(patient)
    }

    async fn list_patients(&self, filter: &PatientFilter) -> Result<Vec<Patient>> {
        let queries = self.queries();
        let rows = queries.search_patients(filter).await?;
        queries.hydrate(rows).await
    }

    async fn update_patient(&self, abha_id: &str, update: &PatientUpdate) -> Result<Patient> {
        let mut patient = self.require_patient(abha_id).await?;
        update.apply(&mut patient);
        patient.updated_at = Utc::now();
        self.queries().update_patient(&patient).await?;
        Ok(patient)
    }

    async fn set_mdr_status(&self, abha_id: &str, status: MdrStatus) -> Result<Patient> {
        self.queries().set_mdr_status(abha_id, status).await?;
        info!("MDR status of {} set to {}", abha_id, status);
        self.require_patient(abha_id).await
    }

    async fn append_movement(&self, abha_id: &str, movement: NewMovement) -> Result<Movement> {
        let queries = self.queries();
        let patient_id = queries.require_patient_id(abha_id).await?;
        let movement = movement.into_movement();
        queries.insert_movement(patient_id, &movement).await?;
        info!("Recorded movement of {} into {}/{}", abha_id, movement.hospital_id, movement.ward);
        Ok(movement)
    }

    async fn close_movement(
        &self,
        abha_id: &str,
        movement_id: Uuid,
        end: DateTime<Utc>,
    ) -> Result<Movement> {
        let queries = self.queries();
        let patient_id = queries.require_patient_id(abha_id).await?;
        let mut movement = queries
            .get_movement(patient_id, movement_id)
            .await?
            .ok_or_else(|| HisError::NotFound(format!("Movement {} not found", movement_id)))?;
        movement.close(end)?;

        // 并发关闭时以先到者为准
        if !queries.close_movement(movement_id, end).await? {
            return Err(HisError::Conflict(format!("movement {} was closed concurrently", movement_id)));
        }
        Ok(movement)
    }

    async fn add_screening(&self, abha_id: &str, screening: NewScreening) -> Result<Screening> {
        let queries = self.queries();
        let patient_id = queries.require_patient_id(abha_id).await?;
        let screening = screening.into_screening();
        queries.insert_screening(patient_id, &screening).await?;
        Ok(screening)
    }

    async fn health_check(&self) -> Result<()> {
        self.pool.health_check().await
    }
}

#[async_trait]
impl RecordRepository for PgRepository {
    async fn create_record(&self, abha_id: &str, record: NewMedicalRecord) -> Result<MedicalRecord> {
        let queries = self.queries();
        let patient_id = queries.require_patient_id(abha_id).await?;
        let record = record.into_record(patient_id, Utc::now());
        queries.insert_record(&record).await?;
        Ok(record)
    }

    async fn list_records(&self, abha_id: &str) -> Result<Vec<MedicalRecord>> {
        let queries = self.queries();
        let patient_id = queries.require_patient_id(abha_id).await?;
        queries.records_for_patient(patient_id).await
    }

    async fn get_record(&self, id: Uuid) -> Result<Option<MedicalRecord>> {
        self.queries().get_record(id).await
    }

    async fn update_record(&self, id: Uuid, update: &MedicalRecordUpdate) -> Result<MedicalRecord> {
        let queries = self.queries();
        let mut record = queries
            .get_record(id)
            .await?
            .ok_or_else(|| HisError::NotFound(format!("Medical record {} not found", id)))?;
        update.apply(&mut record, Utc::now());
        queries.update_record(&record).await?;
        Ok(record)
    }

    async fn delete_record(&self, id: Uuid) -> Result<()> {
        if !self.queries().delete_record(id).await? {
            return Err(HisError::NotFound(format!("Medical record {} not found", id)));
        }
        Ok(())
    }

    async fn create_prescription(
        &self,
        abha_id: &str,
        prescription: NewPrescription,
    ) -> Result<Prescription> {
        let queries = self.queries();
        let patient_id = queries.require_patient_id(abha_id).await?;
        let prescription = prescription.into_prescription(patient_id, Utc::now());
        queries.insert_prescription(&prescription).await?;
        Ok(prescription)
    }

    async fn list_prescriptions(&self, abha_id: &str) -> Result<Vec<Prescription>> {
        let queries = self.queries();
        let patient_id = queries.require_patient_id(abha_id).await?;
        queries.prescriptions_for_patient(patient_id).await
    }

    async fn update_prescription_status(
        &self,
        id: Uuid,
        status: PrescriptionStatus,
    ) -> Result<Prescription> {
        let queries = self.queries();
        let mut prescription = queries
            .get_prescription(id)
            .await?
            .ok_or_else(|| HisError::NotFound(format!("Prescription {} not found", id)))?;
        prescription.status = prescription.status.transition(status)?;
        prescription.updated_at = Utc::now();
        queries.update_prescription_status(id, prescription.status).await?;
        Ok(prescription)
    }
}

#[async_trait]
impl UserRepository for PgRepository {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let user = user.into_user(Utc::now());
        self.queries().insert_user(&user).await?;
        info!("Created user {} ({})", user.username, user.role.as_str());
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.queries().list_users().await
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.queries().get_user(id).await
    }

    async fn update_user(&self, id: Uuid, update: &UserUpdate) -> Result<User> {
        let queries = self.queries();
        let mut user = queries
            .get_user(id)
            .await?
            .ok_or_else(|| HisError::NotFound(format!("User {} not found", id)))?;
        update.apply(&mut user);
        queries.update_user(&user).await?;
        Ok(user)
    }
}

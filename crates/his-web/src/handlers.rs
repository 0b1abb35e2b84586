//! HTTP处理器

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, NaiveDate, Utc};
use his_core::utils::{normalize_page, require_non_blank};
use his_core::{
    HisError, MedicalRecord, MedicalRecordUpdate, MovementStore, NewMedicalRecord, NewPatient,
    NewPrescription, NewUser, Patient, PatientFilter, PatientRepository, PatientUpdate,
    Prescription, PrescriptionStatus, RecordRepository, Sex, User, UserRepository, UserUpdate,
};
use serde::{Deserialize, Deserializer};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

/// API根路径处理器
pub async fn api_root() -> impl IntoResponse {
    Json(json!({
        "service": "HIS Web API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/health",
            "api": "/api/v1",
            "exposures": "/api/v1/patients/:abha_id/exposures",
            "mdr_board": "/api/v1/mdr/patients"
        }
    }))
}

/// 健康检查处理器，存储不可达时返回 503
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let (status, health) = match state.patients.health_check().await {
        Ok(()) => (StatusCode::OK, "healthy"),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
        }
    };
    (
        status,
        Json(json!({
            "status": health,
            "timestamp": Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

pub(crate) fn patient_not_found(abha_id: &str) -> ApiError {
    ApiError(HisError::NotFound(format!("Patient {} not found", abha_id)))
}

// ========== 患者 ==========

#[derive(Debug, Deserialize)]
pub struct PatientQueryParams {
    pub name: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePatientRequest {
    #[serde(default)]
    pub abha_id: String,
    #[serde(default)]
    pub name: String,
    pub sex: Option<Sex>,
    pub birth_date: Option<NaiveDate>,
    pub immunocompromised: Option<bool>,
    pub contact: Option<String>,
}

/// 缺省字段为 `None`，显式 `null` 为 `Some(None)`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePatientRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub sex: Option<Option<Sex>>,
    #[serde(default, deserialize_with = "nullable")]
    pub birth_date: Option<Option<NaiveDate>>,
    pub immunocompromised: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub contact: Option<Option<String>>,
}

fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// 患者查询处理器
pub async fn list_patients(
    State(state): State<AppState>,
    Query(params): Query<PatientQueryParams>,
) -> ApiResult<Json<Vec<Patient>>> {
    info!("Getting patients with query: {:?}", params);

    let (limit, offset) = normalize_page(params.limit, params.offset);
    let filter = PatientFilter {
        name: params.name.filter(|n| !n.trim().is_empty()),
        mdr_status: None,
        limit,
        offset,
    };
    Ok(Json(state.patients.list_patients(&filter).await?))
}

pub async fn create_patient(
    State(state): State<AppState>,
    payload: Result<Json<CreatePatientRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;

    let mut patient = NewPatient::new(&req.abha_id, &req.name)?;
    patient.sex = req.sex;
    patient.birth_date = req.birth_date;
    patient.immunocompromised = req.immunocompromised.unwrap_or(false);
    patient.contact = req.contact;

    let created = state.patients.create_patient(patient).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_patient(
    State(state): State<AppState>,
    Path(abha_id): Path<String>,
) -> ApiResult<Json<Patient>> {
    state
        .patients
        .get_patient(&abha_id)
        .await?
        .map(Json)
        .ok_or_else(|| patient_not_found(&abha_id))
}

pub async fn update_patient(
    State(state): State<AppState>,
    Path(abha_id): Path<String>,
    payload: Result<Json<UpdatePatientRequest>, JsonRejection>,
) -> ApiResult<Json<Patient>> {
    let Json(req) = payload?;

    let name = match req.name {
        Some(name) => Some(require_non_blank("name", &name)?),
        None => None,
    };
    let update = PatientUpdate {
        name,
        sex: req.sex,
        birth_date: req.birth_date,
        immunocompromised: req.immunocompromised,
        contact: req.contact,
    };
    Ok(Json(state.patients.update_patient(&abha_id, &update).await?))
}

// ========== 病历 ==========

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordRequest {
    #[serde(default)]
    pub record_type: String,
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    pub diagnosis: Option<String>,
    pub recorded_by: Option<String>,
    pub recorded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRecordRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub diagnosis: Option<String>,
}

pub async fn list_records(
    State(state): State<AppState>,
    Path(abha_id): Path<String>,
) -> ApiResult<Json<Vec<MedicalRecord>>> {
    Ok(Json(state.records.list_records(&abha_id).await?))
}

pub async fn create_record(
    State(state): State<AppState>,
    Path(abha_id): Path<String>,
    payload: Result<Json<CreateRecordRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;

    let mut record = NewMedicalRecord::new(
        &req.record_type,
        &req.title,
        req.recorded_at.unwrap_or_else(Utc::now),
    )?;
    record.description = req.description.unwrap_or_default();
    record.diagnosis = req.diagnosis;
    record.recorded_by = req.recorded_by;

    let created = state.records.create_record(&abha_id, record).await?;
    info!("Medical record {} created for {}", created.id, abha_id);
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MedicalRecord>> {
    state
        .records
        .get_record(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError(HisError::NotFound(format!("Medical record {} not found", id))))
}

pub async fn update_record(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateRecordRequest>, JsonRejection>,
) -> ApiResult<Json<MedicalRecord>> {
    let Json(req) = payload?;

    let title = match req.title {
        Some(title) => Some(require_non_blank("title", &title)?),
        None => None,
    };
    let update = MedicalRecordUpdate {
        title,
        description: req.description,
        diagnosis: req.diagnosis,
    };
    Ok(Json(state.records.update_record(id, &update).await?))
}

pub async fn delete_record(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.records.delete_record(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ========== 处方 ==========

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePrescriptionRequest {
    #[serde(default)]
    pub medication: String,
    #[serde(default)]
    pub dosage: String,
    #[serde(default)]
    pub frequency: String,
    pub duration_days: Option<i32>,
    pub prescribed_by: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    #[serde(default)]
    pub status: String,
}

pub async fn list_prescriptions(
    State(state): State<AppState>,
    Path(abha_id): Path<String>,
) -> ApiResult<Json<Vec<Prescription>>> {
    Ok(Json(state.records.list_prescriptions(&abha_id).await?))
}

pub async fn create_prescription(
    State(state): State<AppState>,
    Path(abha_id): Path<String>,
    payload: Result<Json<CreatePrescriptionRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;

    let mut prescription = NewPrescription::new(&req.medication, &req.dosage, &req.frequency)?
        .with_duration(req.duration_days)?;
    prescription.prescribed_by = req.prescribed_by;
    prescription.notes = req.notes;

    let created = state.records.create_prescription(&abha_id, prescription).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_prescription_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> ApiResult<Json<Prescription>> {
    let Json(req) = payload?;
    let status: PrescriptionStatus = req.status.parse()?;

    let updated = state.records.update_prescription_status(id, status).await?;
    info!("Prescription {} is now {}", id, updated.status.as_str());
    Ok(Json(updated))
}

// ========== 用户 ==========

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub name: String,
    pub email: Option<String>,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
}

pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(state.users.list_users().await?))
}

pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;

    let mut user = NewUser::new(&req.username, &req.name, &req.role)?;
    user.email = req.email;

    let created = state.users.create_user(user).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_user(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<User>> {
    state
        .users
        .get_user(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError(HisError::NotFound(format!("User {} not found", id))))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> ApiResult<Json<User>> {
    let Json(req) = payload?;

    let update = UserUpdate {
        name: req.name,
        email: req.email,
        role: req.role.as_deref().map(str::parse).transpose()?,
        is_active: req.is_active,
    };
    Ok(Json(state.users.update_user(id, &update).await?))
}

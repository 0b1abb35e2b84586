//! MDR 暴露追踪与感控相关处理器
//!
//! 写接口在调用存储之前完成全部校验，校验失败返回 400。

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use his_core::utils::normalize_page;
use his_core::{
    MdrStatus, Movement, MovementStore, NewMovement, NewScreening, Patient, PatientFilter,
    PatientRepository, Screening,
};
use his_exposure::ExposureRecord;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::handlers::{patient_not_found, StatusRequest};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct ExposureParams {
    pub days: Option<String>,
}

/// 暴露追踪：返回按风险评分降序排列的接触者列表
pub async fn get_exposures(
    State(state): State<AppState>,
    Path(abha_id): Path<String>,
    Query(params): Query<ExposureParams>,
) -> ApiResult<Json<Vec<ExposureRecord>>> {
    let window = state.tracer.window(params.days.as_deref());
    let records = state
        .tracer
        .trace(state.patients.as_ref(), &abha_id, window, Utc::now())
        .await?;
    Ok(Json(records))
}

pub async fn set_mdr_status(
    State(state): State<AppState>,
    Path(abha_id): Path<String>,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> ApiResult<Json<Patient>> {
    let Json(req) = payload?;
    let status: MdrStatus = req.status.parse()?;

    Ok(Json(state.patients.set_mdr_status(&abha_id, status).await?))
}

// ========== 转科轨迹 ==========

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMovementRequest {
    pub hospital_id: Option<String>,
    pub ward: Option<String>,
    pub bed: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CloseMovementRequest {
    pub end: Option<DateTime<Utc>>,
}

pub async fn create_movement(
    State(state): State<AppState>,
    Path(abha_id): Path<String>,
    payload: Result<Json<CreateMovementRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;
    let movement = NewMovement::new(
        req.hospital_id.as_deref(),
        req.ward.as_deref(),
        req.bed,
        req.start,
        req.end,
    )?;

    let created = state.patients.append_movement(&abha_id, movement).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_movements(
    State(state): State<AppState>,
    Path(abha_id): Path<String>,
) -> ApiResult<Json<Vec<Movement>>> {
    let patient = state
        .patients
        .get_patient(&abha_id)
        .await?
        .ok_or_else(|| patient_not_found(&abha_id))?;
    Ok(Json(patient.movements))
}

/// 关闭转科记录，未提供结束时间时取当前时间
pub async fn close_movement(
    State(state): State<AppState>,
    Path((abha_id, movement_id)): Path<(String, Uuid)>,
    payload: Result<Json<CloseMovementRequest>, JsonRejection>,
) -> ApiResult<Json<Movement>> {
    let req = match payload {
        Ok(Json(req)) => req,
        // 允许空请求体
        Err(JsonRejection::MissingJsonContentType(_)) => CloseMovementRequest::default(),
        Err(rejection) => return Err(rejection.into()),
    };
    let end = req.end.unwrap_or_else(Utc::now);

    let closed = state.patients.close_movement(&abha_id, movement_id, end).await?;
    info!("Closed movement {} of {}", movement_id, abha_id);
    Ok(Json(closed))
}

// ========== 筛查 ==========

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScreeningRequest {
    #[serde(default)]
    pub pathogen: String,
    #[serde(default)]
    pub result: String,
    pub sample_type: Option<String>,
    pub collected_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

pub async fn create_screening(
    State(state): State<AppState>,
    Path(abha_id): Path<String>,
    payload: Result<Json<CreateScreeningRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;
    let mut screening = NewScreening::new(
        &req.pathogen,
        &req.result,
        req.collected_at.unwrap_or_else(Utc::now),
    )?;
    screening.sample_type = req.sample_type;
    screening.notes = req.notes;

    let created = state.patients.add_screening(&abha_id, screening).await?;
    info!("Screening for {} recorded on {}", created.pathogen, abha_id);
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_screenings(
    State(state): State<AppState>,
    Path(abha_id): Path<String>,
) -> ApiResult<Json<Vec<Screening>>> {
    let patient = state
        .patients
        .get_patient(&abha_id)
        .await?
        .ok_or_else(|| patient_not_found(&abha_id))?;
    Ok(Json(patient.screenings))
}

// ========== 感控看板 ==========

#[derive(Debug, Deserialize)]
pub struct MdrBoardParams {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// 按 MDR 状态列出患者，默认列出阳性患者
pub async fn mdr_board(
    State(state): State<AppState>,
    Query(params): Query<MdrBoardParams>,
) -> ApiResult<Json<Vec<Patient>>> {
    let status = match params.status.as_deref() {
        Some(raw) => raw.parse()?,
        None => MdrStatus::Positive,
    };
    let (limit, offset) = normalize_page(params.limit, params.offset);
    let filter = PatientFilter {
        name: None,
        mdr_status: Some(status),
        limit,
        offset,
    };
    Ok(Json(state.patients.list_patients(&filter).await?))
}

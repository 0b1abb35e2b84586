//! HTTP 错误映射

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use his_core::HisError;
use serde_json::json;
use tracing::error;

/// 处理器统一错误类型
#[derive(Debug)]
pub struct ApiError(pub HisError);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<HisError> for ApiError {
    fn from(err: HisError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(HisError::Validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0 {
            HisError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            HisError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            HisError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            err @ HisError::InvalidStateTransition { .. } => (StatusCode::CONFLICT, err.to_string()),
            // 其余错误只记录日志，不向调用方暴露细节
            err => {
                error!("Request failed: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

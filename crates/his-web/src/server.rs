//! Web服务器

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::HeaderValue,
    routing::{get, put},
    Router,
};
use his_core::{PatientRepository, RecordRepository, UserRepository};
use his_exposure::ExposureTracer;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::handlers::{
    api_root, create_patient, create_prescription, create_record, create_user, delete_record,
    get_patient, get_record, get_user, health, list_patients, list_prescriptions, list_records,
    list_users, update_patient, update_prescription_status, update_record, update_user,
};
use crate::mdr::{
    close_movement, create_movement, create_screening, get_exposures, list_movements,
    list_screenings, mdr_board, set_mdr_status,
};

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub patients: Arc<dyn PatientRepository>,
    pub records: Arc<dyn RecordRepository>,
    pub users: Arc<dyn UserRepository>,
    pub tracer: Arc<ExposureTracer>,
}

impl AppState {
    /// 以同一个存储实现承载全部仓储接口
    pub fn new<R>(repository: Arc<R>, tracer: ExposureTracer) -> Self
    where
        R: PatientRepository + RecordRepository + UserRepository + 'static,
    {
        Self {
            patients: repository.clone(),
            records: repository.clone(),
            users: repository,
            tracer: Arc::new(tracer),
        }
    }
}

/// 跨域设置
#[derive(Debug, Clone)]
pub struct CorsSettings {
    pub enabled: bool,
    pub allowed_origins: Vec<String>,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
        }
    }
}

impl CorsSettings {
    fn layer(&self) -> CorsLayer {
        let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
        if self.allowed_origins.is_empty() || self.allowed_origins.iter().any(|o| o == "*") {
            return layer.allow_origin(Any);
        }

        let origins: Vec<HeaderValue> = self
            .allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin: {}", origin);
                    None
                }
            })
            .collect();
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: AppState, cors: &CorsSettings) -> Self {
        let app = create_app(state, cors);
        Self { addr, app }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to start web server: {}", e))?;

        Ok(())
    }
}

/// 组装完整路由
pub fn create_app(state: AppState, cors: &CorsSettings) -> Router {
    let app = Router::new()
        // 根路径
        .route("/", get(api_root))
        // 健康检查
        .route("/health", get(health))
        // API路由
        .nest("/api/v1", api_routes())
        .with_state(state);

    let middleware = ServiceBuilder::new().layer(TraceLayer::new_for_http());
    if cors.enabled {
        app.layer(middleware.layer(cors.layer()))
    } else {
        app.layer(middleware)
    }
}

/// API v1 路由
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(api_root))
        .route("/patients", get(list_patients).post(create_patient))
        .route("/patients/:abha_id", get(get_patient).put(update_patient))
        .route("/patients/:abha_id/exposures", get(get_exposures))
        .route("/patients/:abha_id/mdr-status", put(set_mdr_status))
        .route("/patients/:abha_id/movements", get(list_movements).post(create_movement))
        .route("/patients/:abha_id/movements/:movement_id/close", put(close_movement))
        .route("/patients/:abha_id/screenings", get(list_screenings).post(create_screening))
        .route("/patients/:abha_id/records", get(list_records).post(create_record))
        .route("/patients/:abha_id/prescriptions", get(list_prescriptions).post(create_prescription))
        .route("/records/:id", get(get_record).put(update_record).delete(delete_record))
        .route("/prescriptions/:id/status", put(update_prescription_status))
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id", get(get_user).put(update_user))
        .route("/mdr/patients", get(mdr_board))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
    };
    use chrono::{Duration, Utc};
    use his_core::{
        CandidateQuery, HisError, MdrStatus, Movement, MovementStore, NewMovement, NewPatient,
        NewScreening, Patient, PatientFilter, PatientUpdate, Result, Screening,
    };
    use his_database::MemoryRepository;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    fn app() -> Router {
        let state = AppState::new(Arc::new(MemoryRepository::new()), ExposureTracer::default());
        create_app(state, &CorsSettings::default())
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    async fn admit(app: &Router, abha_id: &str, ward: &str, start: chrono::DateTime<Utc>, end: Option<chrono::DateTime<Utc>>) -> Value {
        let (status, _) = send(app, Method::POST, "/api/v1/patients", Some(json!({ "abhaId": abha_id, "name": abha_id }))).await;
        assert!(status == StatusCode::CREATED || status == StatusCode::CONFLICT);
        let (status, movement) = send(
            app,
            Method::POST,
            &format!("/api/v1/patients/{}/movements", abha_id),
            Some(json!({ "hospitalId": "HospA", "ward": ward, "start": start, "end": end })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        movement
    }

    #[tokio::test]
    async fn test_exposure_trace_over_http() {
        let app = app();
        let now = Utc::now();
        admit(&app, "INDEX", "WardX", now - Duration::days(3), Some(now - Duration::days(1))).await;
        admit(&app, "CONTACT", "WardX", now - Duration::days(2), None).await;

        let (status, body) = send(&app, Method::GET, "/api/v1/patients/INDEX/exposures?days=7", None).await;
        assert_eq!(status, StatusCode::OK);
        let records = body.as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["abhaId"], "CONTACT");
        assert_eq!(records[0]["totalMinutes"], 1440);
        assert_eq!(records[0]["riskScore"], 85);
        assert_eq!(records[0]["recommendation"]["level"], "CRITICAL");
        assert_eq!(records[0]["recommendation"]["action"], "ISOLATE");
        assert_eq!(records[0]["details"][0]["hospitalId"], "HospA");
    }

    #[tokio::test]
    async fn test_unknown_index_is_404() {
        let (status, body) = send(&app(), Method::GET, "/api/v1/patients/NOBODY/exposures", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("NOBODY"));
    }

    #[tokio::test]
    async fn test_bad_window_falls_back_to_default() {
        let app = app();
        let now = Utc::now();
        admit(&app, "INDEX", "WardX", now - Duration::days(3), None).await;

        for days in ["abc", "0", "-3"] {
            let uri = format!("/api/v1/patients/INDEX/exposures?days={}", days);
            let (status, body) = send(&app, Method::GET, &uri, None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, json!([]));
        }
    }

    #[tokio::test]
    async fn test_movement_validation() {
        let app = app();
        send(&app, Method::POST, "/api/v1/patients", Some(json!({ "abhaId": "P1", "name": "P1" }))).await;
        let now = Utc::now();

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/patients/P1/movements",
            Some(json!({ "hospitalId": "HospA", "start": now })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/patients/P1/movements",
            Some(json!({ "hospitalId": "HospA", "ward": "ICU", "start": now, "end": now - Duration::hours(1) })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, Method::POST, "/api/v1/patients/P1/movements", Some(json!({ "start": "yesterday" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_close_movement_twice() {
        let app = app();
        let movement = admit(&app, "P1", "ICU", Utc::now() - Duration::hours(5), None).await;
        let uri = format!("/api/v1/patients/P1/movements/{}/close", movement["id"].as_str().unwrap());

        let (status, closed) = send(&app, Method::PUT, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!closed["end"].is_null());

        let (status, _) = send(&app, Method::PUT, &uri, Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_patient_clears_nullable_fields() {
        let app = app();
        let body = json!({ "abhaId": "P1", "name": "P1", "sex": "female", "contact": "ward desk", "birthDate": "1950-01-01" });
        send(&app, Method::POST, "/api/v1/patients", Some(body)).await;

        let (status, patient) = send(&app, Method::PUT, "/api/v1/patients/P1", Some(json!({ "contact": null }))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(patient["contact"].is_null());
        assert_eq!(patient["sex"], "female");
        assert_eq!(patient["birthDate"], "1950-01-01");

        let (_, patient) = send(&app, Method::PUT, "/api/v1/patients/P1", Some(json!({ "immunocompromised": true }))).await;
        assert_eq!(patient["sex"], "female");
        assert_eq!(patient["immunocompromised"], true);
    }

    #[tokio::test]
    async fn test_mdr_status_and_board() {
        let app = app();
        send(&app, Method::POST, "/api/v1/patients", Some(json!({ "abhaId": "P1", "name": "P1" }))).await;
        send(&app, Method::POST, "/api/v1/patients", Some(json!({ "abhaId": "P2", "name": "P2" }))).await;

        let (status, _) = send(&app, Method::PUT, "/api/v1/patients/P1/mdr-status", Some(json!({ "status": "contagious" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, patient) = send(&app, Method::PUT, "/api/v1/patients/P1/mdr-status", Some(json!({ "status": "positive" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(patient["mdrStatus"], "positive");

        let (_, board) = send(&app, Method::GET, "/api/v1/mdr/patients", None).await;
        let ids: Vec<_> = board.as_array().unwrap().iter().map(|p| p["abhaId"].clone()).collect();
        assert_eq!(ids, vec![json!("P1")]);

        let (status, screening) = send(
            &app,
            Method::POST,
            "/api/v1/patients/P1/screenings",
            Some(json!({ "pathogen": "CRE", "result": "positive", "sampleType": "rectal swab" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(screening["result"], "positive");
    }

    #[tokio::test]
    async fn test_duplicate_keys_conflict() {
        let app = app();
        let patient = json!({ "abhaId": "P1", "name": "Asha" });
        let (status, _) = send(&app, Method::POST, "/api/v1/patients", Some(patient.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = send(&app, Method::POST, "/api/v1/patients", Some(patient)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].is_string());

        let user = json!({ "username": "nurse.joy", "name": "Joy", "role": "nurse" });
        send(&app, Method::POST, "/api/v1/users", Some(user.clone())).await;
        let (status, _) = send(&app, Method::POST, "/api/v1/users", Some(user)).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_prescription_status_flow() {
        let app = app();
        send(&app, Method::POST, "/api/v1/patients", Some(json!({ "abhaId": "P1", "name": "P1" }))).await;
        let (status, rx) = send(
            &app,
            Method::POST,
            "/api/v1/patients/P1/prescriptions",
            Some(json!({ "medication": "Colistin", "dosage": "9 MIU", "frequency": "daily", "durationDays": 7 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let uri = format!("/api/v1/prescriptions/{}/status", rx["id"].as_str().unwrap());

        let (status, done) = send(&app, Method::PUT, &uri, Some(json!({ "status": "completed" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(done["status"], "completed");

        let (status, _) = send(&app, Method::PUT, &uri, Some(json!({ "status": "active" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_record_crud() {
        let app = app();
        send(&app, Method::POST, "/api/v1/patients", Some(json!({ "abhaId": "P1", "name": "P1" }))).await;
        let (status, record) = send(
            &app,
            Method::POST,
            "/api/v1/patients/P1/records",
            Some(json!({ "recordType": "diagnosis", "title": "Pneumonia", "diagnosis": "VAP" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let uri = format!("/api/v1/records/{}", record["id"].as_str().unwrap());

        let (status, updated) = send(&app, Method::PUT, &uri, Some(json!({ "title": "Pneumonia, resolving" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["title"], "Pneumonia, resolving");

        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    /// 所有操作都失败的存储
    struct BrokenStore;

    fn broken<T>() -> Result<T> {
        Err(HisError::Database("connection refused".to_string()))
    }

    #[async_trait]
    impl MovementStore for BrokenStore {
        async fn get_patient(&self, _: &str) -> Result<Option<Patient>> {
            broken()
        }
        async fn find_exposure_candidates(&self, _: &CandidateQuery) -> Result<Vec<Patient>> {
            broken()
        }
    }

    #[async_trait]
    impl PatientRepository for BrokenStore {
        async fn create_patient(&self, _: NewPatient) -> Result<Patient> {
            broken()
        }
        async fn list_patients(&self, _: &PatientFilter) -> Result<Vec<Patient>> {
            broken()
        }
        async fn update_patient(&self, _: &str, _: &PatientUpdate) -> Result<Patient> {
            broken()
        }
        async fn set_mdr_status(&self, _: &str, _: MdrStatus) -> Result<Patient> {
            broken()
        }
        async fn append_movement(&self, _: &str, _: NewMovement) -> Result<Movement> {
            broken()
        }
        async fn close_movement(&self, _: &str, _: Uuid, _: chrono::DateTime<Utc>) -> Result<Movement> {
            broken()
        }
        async fn add_screening(&self, _: &str, _: NewScreening) -> Result<Screening> {
            broken()
        }
        async fn health_check(&self) -> Result<()> {
            broken()
        }
    }

    fn broken_app() -> Router {
        let memory = Arc::new(MemoryRepository::new());
        let state = AppState {
            patients: Arc::new(BrokenStore),
            records: memory.clone(),
            users: memory,
            tracer: Arc::new(ExposureTracer::default()),
        };
        create_app(state, &CorsSettings::default())
    }

    #[tokio::test]
    async fn test_store_failure_hides_details() {
        let app = broken_app();

        let (status, body) = send(&app, Method::GET, "/api/v1/patients/P1/exposures", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&app(), Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_health_reports_unreachable_store() {
        let (status, body) = send(&broken_app(), Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unhealthy");
    }
}

//! # HIS Web服务模块
//!
//! 基于axum的REST API：患者档案、病历处方、用户管理，以及MDR接触者追踪接口。

pub mod error;
pub mod handlers;
pub mod mdr;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use server::{create_app, AppState, CorsSettings, WebServer};

//! # HIS管理模块
//!
//! 配置加载与校验、日志初始化等运维功能

pub mod config;
pub mod logging;

pub use config::{
    ConfigManager, ConfigValidator, DatabaseBackend, DatabaseConfig, ExposureConfig, HisConfig,
    LogFormat, LoggingConfig, ServerConfig, WebConfig,
};
pub use logging::init_tracing;

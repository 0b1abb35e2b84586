//! 错误定义模块

use thiserror::Error;

/// HIS系统统一错误类型
#[derive(Error, Debug)]
pub enum HisError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("数据库错误: {0}")]
    Database(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("资源冲突: {0}")]
    Conflict(String),

    #[error("系统内部错误: {0}")]
    Internal(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("无效状态转换: 从 {from} 到 {to}")]
    InvalidStateTransition { from: String, to: String },
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for HisError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => HisError::NotFound(err.to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                HisError::Conflict(db_err.message().to_string())
            }
            _ => HisError::Database(err.to_string()),
        }
    }
}

/// HIS系统统一结果类型
pub type Result<T> = std::result::Result<T, HisError>;

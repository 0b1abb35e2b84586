//! # HIS Core
//!
//! 医院信息系统的核心模块，提供基础数据结构、错误定义、存储接口和通用工具。

pub mod error;
pub mod models;
pub mod records;
pub mod repository;
pub mod utils;

pub use error::{HisError, Result};
pub use models::*;
pub use records::*;
pub use repository::{CandidateQuery, MovementStore, PatientRepository, RecordRepository, UserRepository};

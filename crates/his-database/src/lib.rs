//! # HIS数据库模块
//!
//! 负责患者、转科轨迹、筛查、病历、处方和用户数据的存储，提供PostgreSQL连接池、
//! 完整的CRUD操作，以及用于开发和测试的内存实现。

pub mod connection;
pub mod memory;
pub mod models;
pub mod queries;
pub mod repository;

// 重新导出主要类型
pub use connection::DatabasePool;
pub use memory::MemoryRepository;
pub use models::*;
pub use queries::DatabaseQueries;
pub use repository::PgRepository;

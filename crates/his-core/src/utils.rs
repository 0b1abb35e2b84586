//! 通用工具函数

use crate::error::{HisError, Result};

/// 默认分页大小
pub const DEFAULT_PAGE_SIZE: i64 = 50;
/// 最大分页大小
pub const MAX_PAGE_SIZE: i64 = 200;

/// 去除首尾空白，空字符串视为缺失
pub fn require_non_blank(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(HisError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

/// 规范化分页参数
pub fn normalize_page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit
        .filter(|l| *l > 0)
        .map(|l| l.min(MAX_PAGE_SIZE))
        .unwrap_or(DEFAULT_PAGE_SIZE);
    let offset = offset.filter(|o| *o >= 0).unwrap_or(0);
    (limit, offset)
}

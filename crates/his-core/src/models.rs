//! 核心数据模型定义
//!
//! 患者拥有其全部转科轨迹（[`Movement`]）和筛查记录（[`Screening`]），
//! 两者都以值集合的形式随患者一起加载。

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{HisError, Result};
use crate::utils::require_non_blank;

/// 患者基本信息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: Uuid,
    pub abha_id: String,                // 全局唯一的外部健康ID
    pub name: String,
    pub sex: Option<Sex>,
    pub birth_date: Option<NaiveDate>,
    pub immunocompromised: bool,         // 免疫功能低下
    pub contact: Option<String>,
    pub mdr_status: MdrStatus,
    pub movements: Vec<Movement>,
    pub screenings: Vec<Screening>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    /// 指定时刻的周岁年龄，出生日期未知时返回 `None`
    pub fn age_at(&self, now: DateTime<Utc>) -> Option<u32> {
        self.birth_date
            .and_then(|birth_date| now.date_naive().years_since(birth_date))
    }
}

/// 性别枚举
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
    Other,
}

impl Sex {
    pub fn as_code(&self) -> &'static str {
        match self {
            Sex::Male => "M",
            Sex::Female => "F",
            Sex::Other => "O",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "M" => Some(Sex::Male),
            "F" => Some(Sex::Female),
            "O" => Some(Sex::Other),
            _ => None,
        }
    }
}

/// 多重耐药菌（MDR）状态，由临床人员设置，不做推导
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MdrStatus {
    #[default]
    Unknown,
    Suspected,
    Positive,
    Negative,
}

impl MdrStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MdrStatus::Unknown => "unknown",
            MdrStatus::Suspected => "suspected",
            MdrStatus::Positive => "positive",
            MdrStatus::Negative => "negative",
        }
    }
}

impl fmt::Display for MdrStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MdrStatus {
    type Err = HisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "unknown" => Ok(MdrStatus::Unknown),
            "suspected" => Ok(MdrStatus::Suspected),
            "positive" => Ok(MdrStatus::Positive),
            "negative" => Ok(MdrStatus::Negative),
            other => Err(HisError::Validation(format!(
                "invalid MDR status '{}', expected one of unknown, suspected, positive, negative",
                other
            ))),
        }
    }
}

/// 病区位置：同名病区在不同医院属于不同位置
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WardKey {
    pub hospital_id: String,
    pub ward: String,
}

/// 转科/住院轨迹，结束后不再修改，也不会删除
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Movement {
    pub id: Uuid,
    pub hospital_id: String,
    pub ward: String,
    pub bed: Option<String>,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>, // None 表示仍在院
}

/// 有效结束时间：没有结束时间或结束时间晚于 `now` 都视为仍在院，以 `now` 计
pub fn effective_end(end: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    end.map_or(now, |end| end.min(now))
}

impl Movement {
    /// 在 `now` 时刻是否仍在院
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.end.map_or(true, |end| end > now)
    }

    pub fn effective_end(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        effective_end(self.end, now)
    }

    /// 结束时间不早于开始时间
    pub fn is_well_formed(&self) -> bool {
        self.end.map_or(true, |end| end >= self.start)
    }

    pub fn location(&self) -> WardKey {
        WardKey {
            hospital_id: self.hospital_id.clone(),
            ward: self.ward.clone(),
        }
    }

    pub fn same_location(&self, other: &Movement) -> bool {
        self.ward == other.ward && self.hospital_id == other.hospital_id
    }

    /// 校验并关闭一条仍在院的记录
    pub fn close(&mut self, end: DateTime<Utc>) -> Result<()> {
        if let Some(existing) = self.end {
            return Err(HisError::Validation(format!(
                "movement {} already closed at {}",
                self.id,
                existing.to_rfc3339()
            )));
        }
        if end < self.start {
            return Err(HisError::Validation(format!(
                "movement end {} is before start {}",
                end.to_rfc3339(),
                self.start.to_rfc3339()
            )));
        }
        self.end = Some(end);
        Ok(())
    }
}

/// 病原体筛查结果
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScreeningResult {
    #[default]
    Pending,
    Negative,
    Positive,
}

impl ScreeningResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScreeningResult::Pending => "pending",
            ScreeningResult::Negative => "negative",
            ScreeningResult::Positive => "positive",
        }
    }
}

impl FromStr for ScreeningResult {
    type Err = HisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "pending" => Ok(ScreeningResult::Pending),
            "negative" => Ok(ScreeningResult::Negative),
            "positive" => Ok(ScreeningResult::Positive),
            other => Err(HisError::Validation(format!(
                "invalid screening result '{}', expected one of pending, negative, positive",
                other
            ))),
        }
    }
}

/// 病原体筛查记录
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Screening {
    pub id: Uuid,
    pub pathogen: String,
    pub sample_type: Option<String>,
    pub result: ScreeningResult,
    pub collected_at: DateTime<Utc>,
    pub notes: Option<String>,
}

// 写入模型 - 用于创建新记录，构造时完成校验

/// 新患者
#[derive(Debug, Clone)]
pub struct NewPatient {
    pub abha_id: String,
    pub name: String,
    pub sex: Option<Sex>,
    pub birth_date: Option<NaiveDate>,
    pub immunocompromised: bool,
    pub contact: Option<String>,
}

impl NewPatient {
    pub fn new(abha_id: &str, name: &str) -> Result<Self> {
        Ok(Self {
            abha_id: require_non_blank("abhaId", abha_id)?,
            name: require_non_blank("name", name)?,
            sex: None,
            birth_date: None,
            immunocompromised: false,
            contact: None,
        })
    }

    pub fn into_patient(self, now: DateTime<Utc>) -> Patient {
        Patient {
            id: Uuid::new_v4(),
            abha_id: self.abha_id,
            name: self.name,
            sex: self.sex,
            birth_date: self.birth_date,
            immunocompromised: self.immunocompromised,
            contact: self.contact,
            mdr_status: MdrStatus::Unknown,
            movements: Vec::new(),
            screenings: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// 患者资料更新
///
/// 外层 `None` 保持不变；可空字段的 `Some(None)` 表示清空。
#[derive(Debug, Clone, Default)]
pub struct PatientUpdate {
    pub name: Option<String>,
    pub sex: Option<Option<Sex>>,
    pub birth_date: Option<Option<NaiveDate>>,
    pub immunocompromised: Option<bool>,
    pub contact: Option<Option<String>>,
}

impl PatientUpdate {
    pub fn apply(&self, patient: &mut Patient) {
        if let Some(name) = &self.name {
            patient.name = name.clone();
        }
        if let Some(sex) = self.sex {
            patient.sex = sex;
        }
        if let Some(birth_date) = self.birth_date {
            patient.birth_date = birth_date;
        }
        if let Some(flag) = self.immunocompromised {
            patient.immunocompromised = flag;
        }
        if let Some(contact) = &self.contact {
            patient.contact = contact.clone();
        }
    }
}

/// 新转科记录
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub hospital_id: String,
    pub ward: String,
    pub bed: Option<String>,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl NewMovement {
    /// 医院、病区、入科时间必填；结束时间不得早于开始时间
    pub fn new(
        hospital_id: Option<&str>,
        ward: Option<&str>,
        bed: Option<String>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let hospital_id = require_non_blank("hospitalId", hospital_id.unwrap_or_default())?;
        let ward = require_non_blank("ward", ward.unwrap_or_default())?;
        let start = start.ok_or_else(|| HisError::Validation("start is required".to_string()))?;
        if let Some(end) = end {
            if end < start {
                return Err(HisError::Validation(format!(
                    "end {} is before start {}",
                    end.to_rfc3339(),
                    start.to_rfc3339()
                )));
            }
        }
        let bed = bed.map(|b| b.trim().to_string()).filter(|b| !b.is_empty());

        Ok(Self { hospital_id, ward, bed, start, end })
    }

    pub fn into_movement(self) -> Movement {
        Movement {
            id: Uuid::new_v4(),
            hospital_id: self.hospital_id,
            ward: self.ward,
            bed: self.bed,
            start: self.start,
            end: self.end,
        }
    }
}

/// 新筛查记录
#[derive(Debug, Clone)]
pub struct NewScreening {
    pub pathogen: String,
    pub sample_type: Option<String>,
    pub result: ScreeningResult,
    pub collected_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl NewScreening {
    pub fn new(pathogen: &str, result: &str, collected_at: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            pathogen: require_non_blank("pathogen", pathogen)?,
            sample_type: None,
            result: result.parse()?,
            collected_at,
            notes: None,
        })
    }

    pub fn into_screening(self) -> Screening {
        Screening {
            id: Uuid::new_v4(),
            pathogen: self.pathogen,
            sample_type: self.sample_type,
            result: self.result,
            collected_at: self.collected_at,
            notes: self.notes,
        }
    }
}

/// 患者列表过滤器
#[derive(Debug, Clone)]
pub struct PatientFilter {
    pub name: Option<String>,
    pub mdr_status: Option<MdrStatus>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for PatientFilter {
    fn default() -> Self {
        Self {
            name: None,
            mdr_status: None,
            limit: 50,
            offset: 0,
        }
    }
}

impl PatientFilter {
    pub fn matches(&self, patient: &Patient) -> bool {
        let name_ok = self.name.as_ref().map_or(true, |needle| {
            patient.name.to_lowercase().contains(&needle.to_lowercase())
        });
        let status_ok = self.mdr_status.map_or(true, |s| patient.mdr_status == s);
        name_ok && status_ok
    }
}

//! 数据库查询操作

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use his_core::{
    CandidateQuery, HisError, MdrStatus, MedicalRecord, Movement, Patient, PatientFilter,
    Prescription, PrescriptionStatus, Result, Screening, User,
};
use sqlx::Row;
use uuid::Uuid;

use crate::connection::DatabasePool;
use crate::models::*;

/// 数据库查询操作接口
pub struct DatabaseQueries<'a> {
    pool: &'a DatabasePool,
}

impl<'a> DatabaseQueries<'a> {
    pub fn new(pool: &'a DatabasePool) -> Self {
        Self { pool }
    }

    /// 创建数据库表
    pub async fn create_tables(&self) -> Result<()> {
        let pool = self.pool.pool();

        // 创建患者表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS patients (
                id UUID PRIMARY KEY,
                abha_id VARCHAR(64) UNIQUE NOT NULL,
                name VARCHAR(255) NOT NULL,
                sex CHAR(1),
                birth_date DATE,
                immunocompromised BOOLEAN NOT NULL DEFAULT FALSE,
                contact VARCHAR(64),
                mdr_status VARCHAR(16) NOT NULL DEFAULT 'unknown',
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
        "#).execute(pool).await?;

        // 创建转科轨迹表（只追加，不删除）
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS movements (
                id UUID PRIMARY KEY,
                patient_id UUID NOT NULL REFERENCES patients(id),
                hospital_id VARCHAR(64) NOT NULL,
                ward VARCHAR(64) NOT NULL,
                bed VARCHAR(32),
                start_at TIMESTAMP WITH TIME ZONE NOT NULL,
                end_at TIMESTAMP WITH TIME ZONE,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                CHECK (end_at IS NULL OR end_at >= start_at)
            )
        "#).execute(pool).await?;

        // 创建筛查表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS screenings (
                id UUID PRIMARY KEY,
                patient_id UUID NOT NULL REFERENCES patients(id),
                pathogen VARCHAR(64) NOT NULL,
                sample_type VARCHAR(64),
                result VARCHAR(16) NOT NULL DEFAULT 'pending',
                collected_at TIMESTAMP WITH TIME ZONE NOT NULL,
                notes TEXT,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
        "#).execute(pool).await?;

        // 创建病历表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS medical_records (
                id UUID PRIMARY KEY,
                patient_id UUID NOT NULL REFERENCES patients(id),
                record_type VARCHAR(32) NOT NULL,
                title VARCHAR(255) NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                diagnosis TEXT,
                recorded_by VARCHAR(255),
                recorded_at TIMESTAMP WITH TIME ZONE NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
        "#).execute(pool).await?;

        // 创建处方表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS prescriptions (
                id UUID PRIMARY KEY,
                patient_id UUID NOT NULL REFERENCES patients(id),
                medication VARCHAR(255) NOT NULL,
                dosage VARCHAR(64) NOT NULL,
                frequency VARCHAR(64) NOT NULL,
                duration_days INTEGER,
                prescribed_by VARCHAR(255),
                status VARCHAR(16) NOT NULL DEFAULT 'active',
                notes TEXT,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
        "#).execute(pool).await?;

        // 创建用户表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                username VARCHAR(64) UNIQUE NOT NULL,
                name VARCHAR(255) NOT NULL,
                email VARCHAR(255),
                role VARCHAR(32) NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
        "#).execute(pool).await?;

        // 创建索引以优化查询性能
        self.create_indexes().await?;

        tracing::info!("Database tables created successfully");
        Ok(())
    }

    /// 创建数据库索引
    async fn create_indexes(&self) -> Result<()> {
        let pool = self.pool.pool();

        let indexes = vec![
            "CREATE INDEX IF NOT EXISTS idx_patients_name ON patients(name)",
            "CREATE INDEX IF NOT EXISTS idx_patients_mdr_status ON patients(mdr_status)",
            "CREATE INDEX IF NOT EXISTS idx_movements_patient_id ON movements(patient_id)",
            "CREATE INDEX IF NOT EXISTS idx_movements_location ON movements(hospital_id, ward, start_at)",
            "CREATE INDEX IF NOT EXISTS idx_screenings_patient_id ON screenings(patient_id)",
            "CREATE INDEX IF NOT EXISTS idx_medical_records_patient_id ON medical_records(patient_id)",
            "CREATE INDEX IF NOT EXISTS idx_prescriptions_patient_id ON prescriptions(patient_id)",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql).execute(pool).await?;
        }

        tracing::info!("Database indexes created successfully");
        Ok(())
    }

    // ========== 患者相关操作 ==========

    /// 创建新患者
    pub async fn insert_patient(&self, patient: &Patient) -> Result<()> {
        sqlx::query(r#"
            INSERT INTO patients (id, abha_id, name, sex, birth_date, immunocompromised, contact, mdr_status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#)
        .bind(patient.id)
        .bind(&patient.abha_id)
        .bind(&patient.name)
        .bind(patient.sex.map(|s| s.as_code()))
        .bind(patient.birth_date)
        .bind(patient.immunocompromised)
        .bind(&patient.contact)
        .bind(patient.mdr_status.as_str())
        .bind(patient.created_at)
        .bind(patient.updated_at)
        .execute(self.pool.pool())
        .await?;

        Ok(())
    }

    /// 根据外部健康ID查找患者行
    pub async fn get_patient_row(&self, abha_id: &str) -> Result<Option<DbPatient>> {
        let row = sqlx::query_as::<_, DbPatient>("SELECT * FROM patients WHERE abha_id = $1")
            .bind(abha_id)
            .fetch_optional(self.pool.pool())
            .await?;

        Ok(row)
    }

    /// 根据外部健康ID查找患者ID，不存在时返回NotFound
    pub async fn require_patient_id(&self, abha_id: &str) -> Result<Uuid> {
        let row = sqlx::query("SELECT id FROM patients WHERE abha_id = $1")
            .bind(abha_id)
            .fetch_optional(self.pool.pool())
            .await?;

        row.map(|r| r.get::<Uuid, _>("id"))
            .ok_or_else(|| HisError::NotFound(format!("Patient {} not found", abha_id)))
    }

    /// 加载完整患者（含轨迹与筛查）
    pub async fn load_patient(&self, abha_id: &str) -> Result<Option<Patient>> {
        let Some(row) = self.get_patient_row(abha_id).await? else {
            return Ok(None);
        };
        let mut patients = self.hydrate(vec![row]).await?;
        Ok(patients.pop())
    }

    /// 搜索患者
    pub async fn search_patients(&self, filter: &PatientFilter) -> Result<Vec<DbPatient>> {
        let rows = sqlx::query_as::<_, DbPatient>(r#"
            SELECT * FROM patients
            WHERE ($1::TEXT IS NULL OR name ILIKE $1 ESCAPE '\')
              AND ($2::TEXT IS NULL OR mdr_status = $2)
            ORDER BY created_at, abha_id
            LIMIT $3 OFFSET $4
        "#)
        .bind(filter.name.as_deref().map(contains_pattern))
        .bind(filter.mdr_status.map(|s| s.as_str()))
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(rows)
    }

    /// 更新患者资料
    pub async fn update_patient(&self, patient: &Patient) -> Result<()> {
        sqlx::query(r#"
            UPDATE patients
            SET name = $2, sex = $3, birth_date = $4, immunocompromised = $5, contact = $6, updated_at = $7
            WHERE id = $1
        "#)
        .bind(patient.id)
        .bind(&patient.name)
        .bind(patient.sex.map(|s| s.as_code()))
        .bind(patient.birth_date)
        .bind(patient.immunocompromised)
        .bind(&patient.contact)
        .bind(patient.updated_at)
        .execute(self.pool.pool())
        .await?;

        Ok(())
    }

    /// 设置MDR状态
    pub async fn set_mdr_status(&self, abha_id: &str, status: MdrStatus) -> Result<()> {
        let result = sqlx::query("UPDATE patients SET mdr_status = $2, updated_at = NOW() WHERE abha_id = $1")
            .bind(abha_id)
            .bind(status.as_str())
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(HisError::NotFound(format!("Patient {} not found", abha_id)));
        }
        Ok(())
    }

    /// 为一批患者行加载轨迹与筛查
    pub async fn hydrate(&self, rows: Vec<DbPatient>) -> Result<Vec<Patient>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut movements = self.movements_for_patients(&ids).await?;
        let mut screenings = self.screenings_for_patients(&ids).await?;

        rows.into_iter()
            .map(|row| {
                let id = row.id;
                row.into_patient(
                    movements.remove(&id).unwrap_or_default(),
                    screenings.remove(&id).unwrap_or_default(),
                )
            })
            .collect()
    }

    // ========== 转科轨迹相关操作 ==========

    /// 追加转科记录
    pub async fn insert_movement(&self, patient_id: Uuid, movement: &Movement) -> Result<()> {
        sqlx::query(r#"
            INSERT INTO movements (id, patient_id, hospital_id, ward, bed, start_at, end_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#)
        .bind(movement.id)
        .bind(patient_id)
        .bind(&movement.hospital_id)
        .bind(&movement.ward)
        .bind(&movement.bed)
        .bind(movement.start)
        .bind(movement.end)
        .execute(self.pool.pool())
        .await?;

        Ok(())
    }

    /// 查找某患者的一条转科记录
    pub async fn get_movement(&self, patient_id: Uuid, movement_id: Uuid) -> Result<Option<Movement>> {
        let row = sqlx::query_as::<_, DbMovement>(
            "SELECT * FROM movements WHERE id = $1 AND patient_id = $2"
        )
        .bind(movement_id)
        .bind(patient_id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(row.map(Movement::from))
    }

    /// 关闭转科记录；仅当记录仍未结束时生效，返回是否更新
    pub async fn close_movement(&self, movement_id: Uuid, end: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query("UPDATE movements SET end_at = $2 WHERE id = $1 AND end_at IS NULL")
            .bind(movement_id)
            .bind(end)
            .execute(self.pool.pool())
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// 批量加载转科记录，按开始时间排序
    pub async fn movements_for_patients(&self, patient_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<Movement>>> {
        let rows = sqlx::query_as::<_, DbMovement>(
            "SELECT * FROM movements WHERE patient_id = ANY($1) ORDER BY start_at"
        )
        .bind(patient_ids)
        .fetch_all(self.pool.pool())
        .await?;

        let mut grouped: HashMap<Uuid, Vec<Movement>> = HashMap::new();
        for row in rows {
            grouped.entry(row.patient_id).or_default().push(Movement::from(row));
        }
        Ok(grouped)
    }

    /// 暴露候选人粗筛
    ///
    /// "无结束时间" 与 "结束时间在未来" 同样视为仍在院。
    pub async fn candidate_patient_rows(&self, query: &CandidateQuery) -> Result<Vec<DbPatient>> {
        let hospitals: Vec<String> = query.locations.iter().map(|l| l.hospital_id.clone()).collect();
        let wards: Vec<String> = query.locations.iter().map(|l| l.ward.clone()).collect();

        let rows = sqlx::query_as::<_, DbPatient>(r#"
            SELECT p.* FROM patients p
            WHERE p.abha_id <> $1
              AND EXISTS (
                SELECT 1 FROM movements m
                JOIN UNNEST($2::TEXT[], $3::TEXT[]) AS loc(hospital_id, ward)
                  ON m.hospital_id = loc.hospital_id AND m.ward = loc.ward
                WHERE m.patient_id = p.id
                  AND m.start_at <= $4
                  AND (m.end_at IS NULL OR m.end_at >= $5)
              )
            ORDER BY p.created_at, p.abha_id
        "#)
        .bind(&query.exclude_abha_id)
        .bind(&hospitals)
        .bind(&wards)
        .bind(query.now)
        .bind(query.window_start)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(rows)
    }

    // ========== 筛查相关操作 ==========

    /// 新增筛查记录
    pub async fn insert_screening(&self, patient_id: Uuid, screening: &Screening) -> Result<()> {
        sqlx::query(r#"
            INSERT INTO screenings (id, patient_id, pathogen, sample_type, result, collected_at, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#)
        .bind(screening.id)
        .bind(patient_id)
        .bind(&screening.pathogen)
        .bind(&screening.sample_type)
        .bind(screening.result.as_str())
        .bind(screening.collected_at)
        .bind(&screening.notes)
        .execute(self.pool.pool())
        .await?;

        Ok(())
    }

    /// 批量加载筛查记录
    pub async fn screenings_for_patients(&self, patient_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<Screening>>> {
        let rows = sqlx::query_as::<_, DbScreening>(
            "SELECT * FROM screenings WHERE patient_id = ANY($1) ORDER BY collected_at"
        )
        .bind(patient_ids)
        .fetch_all(self.pool.pool())
        .await?;

        let mut grouped: HashMap<Uuid, Vec<Screening>> = HashMap::new();
        for row in rows {
            let patient_id = row.patient_id;
            grouped.entry(patient_id).or_default().push(Screening::try_from(row)?);
        }
        Ok(grouped)
    }

    // ========== 病历相关操作 ==========

    /// 新增病历
    pub async fn insert_record(&self, record: &MedicalRecord) -> Result<()> {
        sqlx::query(r#"
            INSERT INTO medical_records (id, patient_id, record_type, title, description, diagnosis, recorded_by, recorded_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#)
        .bind(record.id)
        .bind(record.patient_id)
        .bind(record.record_type.as_str())
        .bind(&record.title)
        .bind(&record.description)
        .bind(&record.diagnosis)
        .bind(&record.recorded_by)
        .bind(record.recorded_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(self.pool.pool())
        .await?;

        Ok(())
    }

    /// 根据患者ID获取所有病历
    pub async fn records_for_patient(&self, patient_id: Uuid) -> Result<Vec<MedicalRecord>> {
        let rows = sqlx::query_as::<_, DbMedicalRecord>(
            "SELECT * FROM medical_records WHERE patient_id = $1 ORDER BY recorded_at DESC"
        )
        .bind(patient_id)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(rows.into_iter().map(MedicalRecord::from).collect())
    }

    pub async fn get_record(&self, id: Uuid) -> Result<Option<MedicalRecord>> {
        let row = sqlx::query_as::<_, DbMedicalRecord>("SELECT * FROM medical_records WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await?;

        Ok(row.map(MedicalRecord::from))
    }

    pub async fn update_record(&self, record: &MedicalRecord) -> Result<()> {
        sqlx::query(r#"
            UPDATE medical_records SET title = $2, description = $3, diagnosis = $4, updated_at = $5
            WHERE id = $1
        "#)
        .bind(record.id)
        .bind(&record.title)
        .bind(&record.description)
        .bind(&record.diagnosis)
        .bind(record.updated_at)
        .execute(self.pool.pool())
        .await?;

        Ok(())
    }

    /// 删除病历，返回是否存在
    pub async fn delete_record(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM medical_records WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ========== 处方相关操作 ==========

    /// 新增处方
    pub async fn insert_prescription(&self, rx: &Prescription) -> Result<()> {
        sqlx::query(r#"
            INSERT INTO prescriptions (id, patient_id, medication, dosage, frequency, duration_days, prescribed_by, status, notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#)
        .bind(rx.id)
        .bind(rx.patient_id)
        .bind(&rx.medication)
        .bind(&rx.dosage)
        .bind(&rx.frequency)
        .bind(rx.duration_days)
        .bind(&rx.prescribed_by)
        .bind(rx.status.as_str())
        .bind(&rx.notes)
        .bind(rx.created_at)
        .bind(rx.updated_at)
        .execute(self.pool.pool())
        .await?;

        Ok(())
    }

    pub async fn prescriptions_for_patient(&self, patient_id: Uuid) -> Result<Vec<Prescription>> {
        let rows = sqlx::query_as::<_, DbPrescription>(
            "SELECT * FROM prescriptions WHERE patient_id = $1 ORDER BY created_at DESC"
        )
        .bind(patient_id)
        .fetch_all(self.pool.pool())
        .await?;

        rows.into_iter().map(Prescription::try_from).collect()
    }

    pub async fn get_prescription(&self, id: Uuid) -> Result<Option<Prescription>> {
        let row = sqlx::query_as::<_, DbPrescription>("SELECT * FROM prescriptions WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await?;

        row.map(Prescription::try_from).transpose()
    }

    /// 更新处方状态
    pub async fn update_prescription_status(&self, id: Uuid, status: PrescriptionStatus) -> Result<()> {
        sqlx::query("UPDATE prescriptions SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(self.pool.pool())
            .await?;

        Ok(())
    }

    // ========== 用户相关操作 ==========

    /// 新增用户
    pub async fn insert_user(&self, user: &User) -> Result<()> {
        sqlx::query(r#"
            INSERT INTO users (id, username, name, email, role, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#)
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(user.created_at)
        .execute(self.pool.pool())
        .await?;

        Ok(())
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, DbUser>("SELECT * FROM users ORDER BY username")
            .fetch_all(self.pool.pool())
            .await?;

        rows.into_iter().map(User::try_from).collect()
    }

    pub async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, DbUser>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await?;

        row.map(User::try_from).transpose()
    }

    pub async fn update_user(&self, user: &User) -> Result<()> {
        sqlx::query("UPDATE users SET name = $2, email = $3, role = $4, is_active = $5 WHERE id = $1")
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(user.role.as_str())
            .bind(user.is_active)
            .execute(self.pool.pool())
            .await?;

        Ok(())
    }
}

/// 子串匹配的 LIKE 模式，转义用户输入中的通配符
fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("asha"), "%asha%");
        assert_eq!(contains_pattern("_"), "%\\_%");
        assert_eq!(contains_pattern("50%"), "%50\\%%");
        assert_eq!(contains_pattern("a\\b"), "%a\\\\b%");
    }
}

use anyhow::Context;
use uuid::Uuid;

use crate::domain::reading::AuditReadingRecord;
use crate::storage::AuditLog;

#[derive(Debug, Clone)]
pub struct PgAuditLog {
    pool: sqlx::PgPool,
}

impl PgAuditLog {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AuditLog for PgAuditLog {
    async fn append(&self, record: &AuditReadingRecord) -> anyhow::Result<()> {
        let result = serde_json::to_value(&record.result).context("serialize reading result failed")?;
        let image_bytes = i64::try_from(record.image_bytes).context("image size overflow")?;

        sqlx::query(
            "INSERT INTO reading_audit (id, user_id, image_ref, image_bytes, zodiac_sign, gender, \
                                        focus_area, reading_mode, is_valid_cup, reason, result, \
                                        created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .persistent(false)
        .bind(Uuid::new_v4())
        .bind(&record.user_id)
        .bind(&record.image_ref)
        .bind(image_bytes)
        .bind(record.context.zodiac_sign())
        .bind(record.context.gender())
        .bind(record.context.focus_area())
        .bind(record.mode.as_str())
        .bind(record.result.is_valid_cup)
        .bind(&record.result.reason)
        .bind(result)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .context("insert reading_audit failed")?;

        Ok(())
    }
}

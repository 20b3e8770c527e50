pub mod audit;
pub mod daily_readings;

use anyhow::Context;
use chrono::NaiveDate;

use crate::domain::reading::{AuditReadingRecord, DailyReading};

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Write-once store of daily readings keyed by (user, date).
#[async_trait::async_trait]
pub trait DailyReadingStore: Send + Sync {
    async fn find(&self, user_id: &str, date: NaiveDate) -> anyhow::Result<Option<DailyReading>>;

    /// Stores `reading` unless its (user, date) key is taken, and returns whichever record is
    /// stored for that key afterwards. Concurrent writers all observe the same winner.
    async fn insert_if_absent(&self, reading: &DailyReading) -> anyhow::Result<DailyReading>;
}

/// Append-only audit trail of finished readings.
#[async_trait::async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, record: &AuditReadingRecord) -> anyhow::Result<()>;
}

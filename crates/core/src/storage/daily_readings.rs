use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::reading::DailyReading;
use crate::storage::DailyReadingStore;

type DailyReadingRow = (
    String,
    NaiveDate,
    String,
    String,
    String,
    String,
    String,
    Vec<String>,
    Vec<i32>,
    i32,
    String,
    i32,
    DateTime<Utc>,
);

fn from_row(row: DailyReadingRow) -> DailyReading {
    let (
        user_id,
        date,
        main_text,
        love,
        work,
        money,
        health,
        symbols,
        lucky_numbers,
        luck_score,
        mantra,
        energy_score,
        created_at,
    ) = row;
    DailyReading {
        user_id,
        date,
        main_text,
        love,
        work,
        money,
        health,
        symbols,
        lucky_numbers,
        luck_score,
        mantra,
        energy_score,
        created_at,
    }
}

#[derive(Debug, Clone)]
pub struct PgDailyReadingStore {
    pool: sqlx::PgPool,
}

impl PgDailyReadingStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DailyReadingStore for PgDailyReadingStore {
    async fn find(&self, user_id: &str, date: NaiveDate) -> anyhow::Result<Option<DailyReading>> {
        let row = sqlx::query_as::<_, DailyReadingRow>(
            "SELECT user_id, reading_date, main_text, love, work, money, health, symbols, \
                    lucky_numbers, luck_score, mantra, energy_score, created_at \
             FROM daily_readings \
             WHERE user_id = $1 AND reading_date = $2",
        )
        .bind(user_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("select daily_readings failed (date={date})"))?;

        Ok(row.map(from_row))
    }

    async fn insert_if_absent(&self, reading: &DailyReading) -> anyhow::Result<DailyReading> {
        let inserted = sqlx::query_as::<_, DailyReadingRow>(
            "INSERT INTO daily_readings (id, user_id, reading_date, main_text, love, work, money, \
                                         health, symbols, lucky_numbers, luck_score, mantra, \
                                         energy_score, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (user_id, reading_date) DO NOTHING \
             RETURNING user_id, reading_date, main_text, love, work, money, health, symbols, \
                       lucky_numbers, luck_score, mantra, energy_score, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&reading.user_id)
        .bind(reading.date)
        .bind(&reading.main_text)
        .bind(&reading.love)
        .bind(&reading.work)
        .bind(&reading.money)
        .bind(&reading.health)
        .bind(&reading.symbols)
        .bind(&reading.lucky_numbers)
        .bind(reading.luck_score)
        .bind(&reading.mantra)
        .bind(reading.energy_score)
        .bind(reading.created_at)
        .fetch_optional(&self.pool)
        .await
        .context("insert daily_readings failed")?;

        if let Some(row) = inserted {
            return Ok(from_row(row));
        }

        // Lost the race for this (user, date); the stored record wins.
        tracing::info!(date = %reading.date, "daily reading already stored by a concurrent request");
        self.find(&reading.user_id, reading.date)
            .await?
            .with_context(|| {
                format!(
                    "daily reading conflict but no stored row (date={})",
                    reading.date
                )
            })
    }
}

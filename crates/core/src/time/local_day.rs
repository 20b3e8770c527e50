use anyhow::Context;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

// Real-world offsets span UTC-12:00 to UTC+14:00; accept the symmetric envelope.
pub const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

pub fn validate_utc_offset(offset_minutes: i32) -> anyhow::Result<FixedOffset> {
    anyhow::ensure!(
        (-MAX_UTC_OFFSET_MINUTES..=MAX_UTC_OFFSET_MINUTES).contains(&offset_minutes),
        "utcOffsetMinutes must be within ±{MAX_UTC_OFFSET_MINUTES} (got {offset_minutes})"
    );
    FixedOffset::east_opt(offset_minutes * 60)
        .with_context(|| format!("invalid UTC offset: {offset_minutes} minutes"))
}

/// The caller's calendar date: a new day starts at local midnight.
pub fn resolve_local_date(now_utc: DateTime<Utc>, offset_minutes: i32) -> anyhow::Result<NaiveDate> {
    let offset = validate_utc_offset(offset_minutes)?;
    Ok(now_utc.with_timezone(&offset).date_naive())
}

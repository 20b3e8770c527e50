use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::reading::{DailyReading, Identity, ReadingContext};
use crate::llm::json::{self, MantraFallback};
use crate::llm::{truncate_for_log, ReadingModel};
use crate::prompt;
use crate::reading::ReadingError;
use crate::storage::DailyReadingStore;
use crate::time::local_day;

#[derive(Debug, Clone, Default)]
pub struct DailyRequest {
    pub zodiac_sign: Option<String>,
    pub gender: Option<String>,
    /// Caller's offset from UTC; the server default applies when absent.
    pub utc_offset_minutes: Option<i32>,
}

/// The "getDailyReading" use case: at most one generated reading per user per local day.
pub struct DailyReadings {
    model: Arc<dyn ReadingModel>,
    store: Arc<dyn DailyReadingStore>,
    default_utc_offset_minutes: i32,
}

impl DailyReadings {
    pub fn new(
        model: Arc<dyn ReadingModel>,
        store: Arc<dyn DailyReadingStore>,
        default_utc_offset_minutes: i32,
    ) -> Self {
        Self {
            model,
            store,
            default_utc_offset_minutes,
        }
    }

    pub async fn execute(
        &self,
        request: DailyRequest,
        identity: Option<&Identity>,
        now: DateTime<Utc>,
    ) -> Result<DailyReading, ReadingError> {
        let identity = identity.ok_or(ReadingError::Unauthenticated)?;

        let offset = request
            .utc_offset_minutes
            .unwrap_or(self.default_utc_offset_minutes);
        let date = local_day::resolve_local_date(now, offset)
            .map_err(|err| ReadingError::InvalidArgument(err.to_string()))?;

        if let Some(existing) = self
            .store
            .find(identity.user_id(), date)
            .await
            .map_err(internal("daily reading lookup failed"))?
        {
            tracing::debug!(%date, "daily reading already generated");
            return Ok(existing);
        }

        let context = ReadingContext {
            zodiac_sign: request.zodiac_sign,
            gender: request.gender,
            focus_area: None,
        };
        let prompt = prompt::build_daily_prompt(&context, date);

        let raw = self
            .model
            .generate(&prompt, None)
            .await
            .map_err(internal("daily reading generation failed"))?;

        let parsed = json::parse_reading(&raw, MantraFallback::DailyPool).map_err(|err| {
            tracing::error!(
                error = %err,
                raw = %truncate_for_log(&raw, 500),
                "daily model output could not be parsed"
            );
            ReadingError::Internal(anyhow::Error::new(err))
        })?;

        // Cup validity has no meaning for a daily reading; a refusal is a generation failure.
        if !parsed.is_valid_cup {
            return Err(internal("daily reading refused by model")(anyhow::anyhow!(
                "model returned is_valid_cup=false (reason={})",
                parsed.reason
            )));
        }

        let reading = DailyReading::from_result(identity.user_id(), date, now, parsed);
        let stored = self
            .store
            .insert_if_absent(&reading)
            .await
            .map_err(internal("daily reading write failed"))?;

        tracing::info!(%date, luck_score = stored.luck_score, "daily reading generated");
        Ok(stored)
    }
}

fn internal(stage: &'static str) -> impl Fn(anyhow::Error) -> ReadingError {
    move |err| {
        tracing::error!(error = %format!("{err:#}"), "{stage}");
        ReadingError::Internal(err.context(stage))
    }
}

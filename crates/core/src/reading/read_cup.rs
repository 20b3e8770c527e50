use std::sync::Arc;

use chrono::Utc;

use crate::domain::reading::{
    AuditReadingRecord, Identity, ImageInput, ReadingMode, ReadingRequest, ReadingResult,
    SafetyLevel,
};
use crate::domain::reason;
use crate::gate;
use crate::llm::json::{self, MantraFallback};
use crate::llm::{truncate_for_log, ReadingModel};
use crate::photo::{self, ImageFetcher, INLINE_IMAGE_REF};
use crate::prompt;
use crate::reading::ReadingError;
use crate::storage::AuditLog;

/// The "readCup" use case: photo in, sanitized reading out.
pub struct ReadCup {
    model: Arc<dyn ReadingModel>,
    fetcher: Arc<dyn ImageFetcher>,
    audit: Option<Arc<dyn AuditLog>>,
    max_image_bytes: usize,
}

struct ResolvedImage {
    bytes: Vec<u8>,
    image_ref: String,
}

impl ReadCup {
    pub fn new(
        model: Arc<dyn ReadingModel>,
        fetcher: Arc<dyn ImageFetcher>,
        audit: Option<Arc<dyn AuditLog>>,
        max_image_bytes: usize,
    ) -> Self {
        Self {
            model,
            fetcher,
            audit,
            max_image_bytes,
        }
    }

    pub async fn execute(
        &self,
        request: ReadingRequest,
        identity: Option<&Identity>,
    ) -> Result<ReadingResult, ReadingError> {
        let identity = identity.ok_or(ReadingError::Unauthenticated)?;

        let input = request
            .image_input()
            .map_err(|msg| ReadingError::InvalidArgument(msg.to_string()))?;
        let image = self.resolve_image(&input).await?;

        // Applies to URL images as well as uploads.
        let outcome = gate::validate(&image.bytes);
        if !outcome.is_valid {
            tracing::info!(
                reason = outcome.reason,
                bytes = image.bytes.len(),
                "image rejected by quality gate"
            );
            return Ok(ReadingResult::rejected(
                outcome.safety_level,
                outcome.reason,
            ));
        }

        let result = self.interpret(&request, &image.bytes).await?;
        self.record_audit(identity, &request, &image, &result).await;

        tracing::info!(
            mode = request.mode.as_str(),
            is_valid_cup = result.is_valid_cup,
            reason = %result.reason,
            symbols = result.symbols.len(),
            "cup reading finished"
        );
        Ok(result)
    }

    async fn resolve_image(&self, input: &ImageInput) -> Result<ResolvedImage, ReadingError> {
        match input {
            ImageInput::Base64(encoded) => {
                let bytes = photo::decode_base64(encoded, self.max_image_bytes).map_err(|err| {
                    ReadingError::InvalidArgument(format!("imageBase64 is not usable: {err}"))
                })?;
                Ok(ResolvedImage {
                    bytes,
                    image_ref: INLINE_IMAGE_REF.to_string(),
                })
            }
            ImageInput::Url(url) => {
                let bytes = self.fetcher.fetch(url).await.map_err(|err| {
                    tracing::warn!(error = %format!("{err:#}"), "image URL fetch failed");
                    ReadingError::InvalidArgument("imageUrl could not be downloaded".to_string())
                })?;
                Ok(ResolvedImage {
                    bytes,
                    image_ref: url.clone(),
                })
            }
        }
    }

    async fn interpret(
        &self,
        request: &ReadingRequest,
        bytes: &[u8],
    ) -> Result<ReadingResult, ReadingError> {
        let prompt = prompt::build_reading_prompt(request.mode, &request.context);

        let raw = self
            .model
            .generate(&prompt, Some(bytes))
            .await
            .map_err(|err| {
                tracing::error!(
                    provider = self.model.provider().as_str(),
                    error = %format!("{err:#}"),
                    "reading generation failed"
                );
                ReadingError::Internal(err.context("reading generation failed"))
            })?;

        let parsed = json::parse_reading(&raw, MantraFallback::Fixed).map_err(|err| {
            tracing::error!(
                error = %err,
                raw = %truncate_for_log(&raw, 500),
                "model output could not be parsed"
            );
            ReadingError::Internal(anyhow::Error::new(err))
        })?;

        Ok(finalize(parsed, request.mode))
    }

    /// Best effort: a failed write is logged and never reaches the caller.
    async fn record_audit(
        &self,
        identity: &Identity,
        request: &ReadingRequest,
        image: &ResolvedImage,
        result: &ReadingResult,
    ) {
        let Some(audit) = &self.audit else {
            tracing::debug!("audit log not configured; skipping");
            return;
        };

        let record = AuditReadingRecord {
            user_id: identity.user_id().to_string(),
            image_ref: image.image_ref.clone(),
            image_bytes: image.bytes.len(),
            context: request.context.clone(),
            mode: request.mode,
            result: result.clone(),
            created_at: Utc::now(),
        };

        if let Err(err) = audit.append(&record).await {
            tracing::warn!(error = %format!("{err:#}"), "audit write failed; continuing");
        }
    }
}

/// NSFW wins over anything else the model said; valid readings are capped to the mode's
/// symbol budget.
fn finalize(parsed: ReadingResult, mode: ReadingMode) -> ReadingResult {
    if parsed.is_nsfw() {
        return ReadingResult::rejected(SafetyLevel::Nsfw, reason::NSFW_DETECTED);
    }
    if !parsed.is_valid_cup {
        return parsed;
    }

    let mut result = parsed;
    result.symbols.truncate(mode.max_symbols());
    result
}

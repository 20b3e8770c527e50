//! Cheap pre-inference checks on raw image bytes.
//!
//! Runs before any model call so unusable photos never cost an inference. Pure and
//! deterministic: identical bytes always yield the identical outcome.

use anyhow::Context;
use image::ImageReader;
use std::io::Cursor;

use crate::domain::reading::SafetyLevel;
use crate::domain::reason;

pub const MIN_IMAGE_BYTES: usize = 10_000;
pub const MIN_DIMENSION_PX: u32 = 100;

// Luminance buckets 0..=5 count as "very dark".
const DARK_BUCKETS: usize = 6;
const MAX_DARK_RATIO: f64 = 0.99;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub safety_level: SafetyLevel,
    pub reason: &'static str,
}

impl ValidationOutcome {
    fn accept() -> Self {
        Self {
            is_valid: true,
            safety_level: SafetyLevel::Ok,
            reason: reason::OK,
        }
    }

    fn reject(reason: &'static str) -> Self {
        Self {
            is_valid: false,
            safety_level: SafetyLevel::Unknown,
            reason,
        }
    }
}

/// Checks in order, stopping at the first failure: byte length, pixel dimensions, darkness.
pub fn validate(bytes: &[u8]) -> ValidationOutcome {
    if bytes.len() < MIN_IMAGE_BYTES {
        return ValidationOutcome::reject(reason::IMAGE_TOO_SMALL);
    }

    match inspect(bytes) {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::debug!(error = %err, bytes = bytes.len(), "image could not be decoded");
            ValidationOutcome::reject(reason::VALIDATION_ERROR)
        }
    }
}

fn inspect(bytes: &[u8]) -> anyhow::Result<ValidationOutcome> {
    let (width, height) = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .context("failed to sniff image format")?
        .into_dimensions()
        .context("failed to read image dimensions")?;

    if width < MIN_DIMENSION_PX || height < MIN_DIMENSION_PX {
        return Ok(ValidationOutcome::reject(
            reason::IMAGE_TOO_SMALL_DIMENSIONS,
        ));
    }

    let grey = image::load_from_memory(bytes)
        .context("failed to decode image")?
        .to_luma8();

    let mut histogram = [0u64; 256];
    for pixel in grey.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }

    let total = u64::from(grey.width()) * u64::from(grey.height());
    anyhow::ensure!(total > 0, "decoded image has no pixels");

    let very_dark: u64 = histogram[..DARK_BUCKETS].iter().sum();
    let dark_ratio = very_dark as f64 / total as f64;
    if dark_ratio > MAX_DARK_RATIO {
        return Ok(ValidationOutcome::reject(reason::TOO_DARK));
    }

    Ok(ValidationOutcome::accept())
}

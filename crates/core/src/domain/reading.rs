use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::reason;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingMode {
    #[default]
    Instant,
    Mystic,
    Deep,
}

impl ReadingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReadingMode::Instant => "instant",
            ReadingMode::Mystic => "mystic",
            ReadingMode::Deep => "deep",
        }
    }

    /// Upper bound on symbols kept for this mode. Models over-deliver; nothing is padded.
    pub fn max_symbols(self) -> usize {
        match self {
            ReadingMode::Instant => 3,
            ReadingMode::Mystic => 5,
            ReadingMode::Deep => 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyLevel {
    Ok,
    Nsfw,
    Unknown,
}

impl SafetyLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            SafetyLevel::Ok => "ok",
            SafetyLevel::Nsfw => "nsfw",
            SafetyLevel::Unknown => "unknown",
        }
    }
}

/// An already-authenticated caller. Never read from ambient state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    user_id: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Option<Self> {
        let user_id = user_id.into().trim().to_string();
        if user_id.is_empty() {
            return None;
        }
        Some(Self { user_id })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

/// Optional personalisation shared by both reading flavours.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingContext {
    pub zodiac_sign: Option<String>,
    pub gender: Option<String>,
    pub focus_area: Option<String>,
}

impl ReadingContext {
    pub fn is_empty(&self) -> bool {
        self.zodiac_sign().is_none() && self.gender().is_none() && self.focus_area().is_none()
    }

    pub fn zodiac_sign(&self) -> Option<&str> {
        non_blank(&self.zodiac_sign)
    }

    pub fn gender(&self) -> Option<&str> {
        non_blank(&self.gender)
    }

    pub fn focus_area(&self) -> Option<&str> {
        non_blank(&self.focus_area)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageInput {
    Base64(String),
    Url(String),
}

#[derive(Debug, Clone)]
pub struct ReadingRequest {
    pub image_base64: Option<String>,
    pub image_url: Option<String>,
    pub context: ReadingContext,
    pub mode: ReadingMode,
}

impl ReadingRequest {
    /// Exactly one image source must be present.
    pub fn image_input(&self) -> Result<ImageInput, &'static str> {
        let inline = self
            .image_base64
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let url = self
            .image_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match (inline, url) {
            (Some(b64), None) => Ok(ImageInput::Base64(b64.to_string())),
            (None, Some(url)) => Ok(ImageInput::Url(url.to_string())),
            (None, None) => Err("an image is required (imageBase64 or imageUrl)"),
            (Some(_), Some(_)) => Err("provide exactly one of imageBase64 or imageUrl"),
        }
    }
}

/// The typed reading contract returned to clients.
///
/// When `is_valid_cup` is false every text field is empty and every number is zero; build such
/// values through [`ReadingResult::rejected`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingResult {
    pub main_text: String,
    pub love: String,
    pub work: String,
    pub money: String,
    pub health: String,
    pub symbols: Vec<String>,
    pub lucky_numbers: Vec<i32>,
    pub luck_score: i32,
    pub mantra: String,
    pub energy_score: i32,
    pub is_valid_cup: bool,
    pub safety_level: SafetyLevel,
    pub reason: String,
}

impl ReadingResult {
    pub fn rejected(safety_level: SafetyLevel, reason: impl Into<String>) -> Self {
        Self {
            main_text: String::new(),
            love: String::new(),
            work: String::new(),
            money: String::new(),
            health: String::new(),
            symbols: Vec::new(),
            lucky_numbers: Vec::new(),
            luck_score: 0,
            mantra: String::new(),
            energy_score: 0,
            is_valid_cup: false,
            safety_level,
            reason: reason.into(),
        }
    }

    pub fn is_nsfw(&self) -> bool {
        self.safety_level == SafetyLevel::Nsfw || self.reason == reason::NSFW_DETECTED
    }
}

/// One generated daily reading per (user, date). Write-once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyReading {
    pub user_id: String,
    pub date: NaiveDate,
    pub main_text: String,
    pub love: String,
    pub work: String,
    pub money: String,
    pub health: String,
    pub symbols: Vec<String>,
    pub lucky_numbers: Vec<i32>,
    pub luck_score: i32,
    pub mantra: String,
    pub energy_score: i32,
    pub created_at: DateTime<Utc>,
}

impl DailyReading {
    pub fn from_result(
        user_id: &str,
        date: NaiveDate,
        created_at: DateTime<Utc>,
        result: ReadingResult,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            date,
            main_text: result.main_text,
            love: result.love,
            work: result.work,
            money: result.money,
            health: result.health,
            symbols: result.symbols,
            lucky_numbers: result.lucky_numbers,
            luck_score: result.luck_score,
            mantra: result.mantra,
            energy_score: result.energy_score,
            created_at,
        }
    }
}

/// Denormalized audit copy of a finished reading.
#[derive(Debug, Clone, Serialize)]
pub struct AuditReadingRecord {
    pub user_id: String,
    pub image_ref: String,
    pub image_bytes: usize,
    pub context: ReadingContext,
    pub mode: ReadingMode,
    pub result: ReadingResult,
    pub created_at: DateTime<Utc>,
}

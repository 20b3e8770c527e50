use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;

use fildzan_core::domain::reading::{
    DailyReading, Identity, ReadingContext, ReadingMode, ReadingRequest, ReadingResult,
};
use fildzan_core::domain::reason;
use fildzan_core::reading::daily::{DailyReadings, DailyRequest};
use fildzan_core::reading::read_cup::ReadCup;
use fildzan_core::reading::ReadingError;

use crate::auth::{bearer_token, SupabaseAuth};

/// Why an operation could not be wired at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    ModelCredential,
    Database,
}

pub type Wired<T> = Result<Arc<T>, Missing>;

#[derive(Clone)]
pub struct AppState {
    pub auth: Option<SupabaseAuth>,
    pub read_cup: Wired<ReadCup>,
    pub daily: Wired<DailyReadings>,
    pub max_body_bytes: usize,
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.max_body_bytes;
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/readings/cup", post(read_cup))
        .route("/v1/readings/daily", post(daily_reading))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadCupBody {
    image_base64: Option<String>,
    image_url: Option<String>,
    zodiac_sign: Option<String>,
    gender: Option<String>,
    focus_area: Option<String>,
    reading_mode: Option<ReadingMode>,
}

impl From<ReadCupBody> for ReadingRequest {
    fn from(body: ReadCupBody) -> Self {
        ReadingRequest {
            image_base64: body.image_base64,
            image_url: body.image_url,
            context: ReadingContext {
                zodiac_sign: body.zodiac_sign,
                gender: body.gender,
                focus_area: body.focus_area,
            },
            mode: body.reading_mode.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DailyBody {
    zodiac_sign: Option<String>,
    gender: Option<String>,
    utc_offset_minutes: Option<i32>,
}

/// The reading as produced, plus the user-facing message for a rejection.
#[derive(Debug, Serialize)]
struct CupReadingBody {
    #[serde(flatten)]
    result: ReadingResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
}

impl From<ReadingResult> for CupReadingBody {
    fn from(result: ReadingResult) -> Self {
        let message = (!result.is_valid_cup).then(|| reason::user_message(&result.reason));
        Self { result, message }
    }
}

#[derive(Debug, Serialize)]
struct DailyReadingBody {
    main_text: String,
    love: String,
    work: String,
    money: String,
    health: String,
    symbols: Vec<String>,
    lucky_numbers: Vec<i32>,
    luck_score: i32,
    mantra: String,
    energy_score: i32,
    date: NaiveDate,
}

impl From<DailyReading> for DailyReadingBody {
    fn from(r: DailyReading) -> Self {
        Self {
            main_text: r.main_text,
            love: r.love,
            work: r.work,
            money: r.money,
            health: r.health,
            symbols: r.symbols,
            lucky_numbers: r.lucky_numbers,
            luck_score: r.luck_score,
            mantra: r.mantra,
            energy_score: r.energy_score,
            date: r.date,
        }
    }
}

async fn read_cup(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ReadCupBody>, JsonRejection>,
) -> Result<Json<CupReadingBody>, ApiError> {
    let identity = caller_identity(&state, &headers).await?;
    if identity.is_none() {
        return Err(ReadingError::Unauthenticated.into());
    }
    let Json(body) = body.map_err(invalid_body)?;
    let service = wired(&state.read_cup)?;

    let result = service.execute(body.into(), identity.as_ref()).await?;
    Ok(Json(result.into()))
}

async fn daily_reading(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<DailyBody>, JsonRejection>,
) -> Result<Json<DailyReadingBody>, ApiError> {
    let identity = caller_identity(&state, &headers).await?;
    if identity.is_none() {
        return Err(ReadingError::Unauthenticated.into());
    }
    let Json(body) = body.map_err(invalid_body)?;
    let service = wired(&state.daily)?;

    let request = DailyRequest {
        zodiac_sign: body.zodiac_sign,
        gender: body.gender,
        utc_offset_minutes: body.utc_offset_minutes,
    };
    let reading = service
        .execute(request, identity.as_ref(), chrono::Utc::now())
        .await?;
    Ok(Json(reading.into()))
}

async fn caller_identity(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<Identity>, ApiError> {
    let (Some(auth), Some(token)) = (&state.auth, bearer_token(headers)) else {
        return Ok(None);
    };
    auth.resolve(token)
        .await
        .map_err(|err| ReadingError::Internal(err.context("identity lookup failed")).into())
}

fn wired<T>(service: &Wired<T>) -> Result<Arc<T>, ApiError> {
    match service {
        Ok(service) => Ok(service.clone()),
        Err(Missing::ModelCredential) => Err(ReadingError::Internal(anyhow::anyhow!(
            "ANTHROPIC_API_KEY is not configured"
        ))
        .into()),
        Err(Missing::Database) => Err(ApiError::Unavailable),
    }
}

fn invalid_body(rejection: JsonRejection) -> ApiError {
    ReadingError::InvalidArgument(rejection.body_text()).into()
}

#[derive(Debug)]
pub enum ApiError {
    Reading(ReadingError),
    Unavailable,
}

impl From<ReadingError> for ApiError {
    fn from(err: ReadingError) -> Self {
        ApiError::Reading(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({"error": {
                    "code": "unavailable",
                    "message": reason::user_message(reason::ANALYSIS_FAILED),
                }}),
            ),
            ApiError::Reading(err) => {
                let code = err.code();
                match err {
                    ReadingError::Unauthenticated => (
                        StatusCode::UNAUTHORIZED,
                        json!({"error": {"code": code, "message": "Potrebna je prijava."}}),
                    ),
                    ReadingError::InvalidArgument(message) => (
                        StatusCode::BAD_REQUEST,
                        json!({"error": {"code": code, "message": message}}),
                    ),
                    ReadingError::Internal(detail) => {
                        sentry_anyhow::capture_anyhow(&detail);
                        tracing::error!(error = %format!("{detail:#}"), "request failed");
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            json!({"error": {
                                "code": code,
                                "reason": reason::ANALYSIS_FAILED,
                                "message": reason::user_message(reason::ANALYSIS_FAILED),
                            }}),
                        )
                    }
                }
            }
        };
        (status, Json(body)).into_response()
    }
}

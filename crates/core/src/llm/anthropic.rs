use crate::config::Settings;
use crate::llm::error::ModelCallError;
use crate::llm::{truncate_for_log, Provider, ReadingModel};
use anyhow::Context;
use base64::{engine::general_purpose, Engine as _};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const DEFAULT_MAX_TOKENS: u32 = 2048;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_RETRIES: u32 = 2;
const RETRY_BASE_DELAY_MS: u64 = 900;

const FALLBACK_MEDIA_TYPE: &str = "image/jpeg";

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
    /// Extra attempts on transient failures; the caller still sees one call.
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl AnthropicConfig {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_anthropic_api_key()?.to_string();
        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_tokens = std::env::var("ANTHROPIC_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let timeout_secs = std::env::var("ANTHROPIC_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let max_retries = std::env::var("ANTHROPIC_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_RETRIES);

        Ok(Self {
            api_key,
            base_url,
            model,
            max_tokens,
            timeout: Duration::from_secs(timeout_secs),
            max_retries,
            retry_base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
        })
    }
}

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    config: AnthropicConfig,
}

impl AnthropicClient {
    pub fn new(config: AnthropicConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self { http, config })
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Self::new(AnthropicConfig::from_settings(settings)?)
    }

    async fn create_message(
        &self,
        req: &CreateMessageRequest,
    ) -> anyhow::Result<CreateMessageResponse> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.config.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let sent = self
                .http
                .post(&url)
                .headers(headers.clone())
                .json(req)
                .send()
                .await;

            let res = match sent {
                Ok(res) => res,
                Err(err) if should_retry_error(&err) && attempt <= self.config.max_retries => {
                    tracing::warn!(attempt, error = %err, "Anthropic request failed; retrying");
                    tokio::time::sleep(self.retry_delay(attempt)).await;
                    continue;
                }
                Err(err) => return Err(anyhow::Error::new(err).context("Anthropic request failed")),
            };

            let status = res.status();
            let text = res
                .text()
                .await
                .context("failed to read Anthropic response body")?;

            if !status.is_success() {
                if should_retry_status(status) && attempt <= self.config.max_retries {
                    tracing::warn!(attempt, %status, "Anthropic returned a transient error; retrying");
                    tokio::time::sleep(self.retry_delay(attempt)).await;
                    continue;
                }
                return Err(
                    ModelCallError::rejected(Provider::Anthropic, status.as_u16(), &text).into(),
                );
            }

            return serde_json::from_str::<CreateMessageResponse>(&text).with_context(|| {
                format!(
                    "failed to decode Anthropic response: {}",
                    truncate_for_log(&text, 500)
                )
            });
        }
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        self.config.retry_base_delay.saturating_mul(attempt.max(1))
    }

    fn system_prompt() -> &'static str {
        "You interpret photos and write readings. Reply with exactly one JSON object and nothing else."
    }

    fn user_content(prompt: &str, image: Option<&[u8]>) -> Vec<RequestBlock> {
        let mut content = Vec::with_capacity(2);
        if let Some(bytes) = image {
            let media_type = image::guess_format(bytes)
                .map(|format| format.to_mime_type())
                .unwrap_or(FALLBACK_MEDIA_TYPE);
            content.push(RequestBlock::Image {
                source: ImageSource {
                    kind: "base64",
                    media_type: media_type.to_string(),
                    data: general_purpose::STANDARD.encode(bytes),
                },
            });
        }
        content.push(RequestBlock::Text {
            text: prompt.to_string(),
        });
        content
    }

    fn response_text(res: &CreateMessageResponse) -> String {
        let mut out = String::new();
        for block in &res.content {
            match block {
                ContentBlock::Text { text } => {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(text);
                }
                ContentBlock::Unknown => {
                    // Ignore non-text blocks.
                }
            }
        }
        out
    }
}

#[async_trait::async_trait]
impl ReadingModel for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    /// `config.timeout` bounds the whole call: every retry and the max_tokens bump share it.
    async fn generate(&self, prompt: &str, image: Option<&[u8]>) -> anyhow::Result<String> {
        let limit = self.config.timeout;
        match tokio::time::timeout(limit, self.generate_attempts(prompt, image)).await {
            Ok(result) => result,
            Err(_) => Err(ModelCallError::DeadlineExceeded {
                provider: Provider::Anthropic,
                limit,
            }
            .into()),
        }
    }
}

impl AnthropicClient {
    async fn generate_attempts(&self, prompt: &str, image: Option<&[u8]>) -> anyhow::Result<String> {
        let content = Self::user_content(prompt, image);
        let make_req = |max_tokens: u32| CreateMessageRequest {
            model: self.config.model.clone(),
            max_tokens,
            system: Some(Self::system_prompt().to_string()),
            messages: vec![Message {
                role: "user",
                content: content.clone(),
            }],
        };

        let mut res = self.create_message(&make_req(self.config.max_tokens)).await?;

        // A truncated JSON object never parses; retry once with a higher ceiling.
        if matches!(res.stop_reason.as_deref(), Some("max_tokens")) {
            let bumped = self.config.max_tokens.saturating_mul(2).max(4096);
            tracing::warn!(
                from = self.config.max_tokens,
                to = bumped,
                "Anthropic stop_reason=max_tokens; retrying once with higher max_tokens"
            );
            res = self.create_message(&make_req(bumped)).await?;
        }

        let text = Self::response_text(&res);
        if text.trim().is_empty() {
            return Err(ModelCallError::EmptyOutput {
                provider: Provider::Anthropic,
                stop_reason: res.stop_reason.clone(),
            }
            .into());
        }

        tracing::debug!(
            model = %self.config.model,
            chars = text.chars().count(),
            preview = %truncate_for_log(&text, 200),
            "Anthropic reading generated"
        );
        Ok(text)
    }
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

#[derive(Debug, Clone, Serialize)]
struct CreateMessageRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<RequestBlock>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RequestBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Clone, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: String,
    data: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlock>,

    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(other)]
    Unknown,
}

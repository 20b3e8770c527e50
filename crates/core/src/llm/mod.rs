pub mod anthropic;
pub mod error;
pub mod json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
        }
    }
}

/// One logical call to a multimodal model: prompt plus optional image in, raw text out.
///
/// Errors mean generation failed (network, timeout, quota, empty output). Callers translate them,
/// they are never shown to end users as-is.
#[async_trait::async_trait]
pub trait ReadingModel: Send + Sync {
    fn provider(&self) -> Provider;

    async fn generate(&self, prompt: &str, image: Option<&[u8]>) -> anyhow::Result<String>;
}

pub(crate) fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

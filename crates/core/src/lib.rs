pub mod domain;
pub mod gate;
pub mod llm;
pub mod photo;
pub mod prompt;
pub mod reading;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;

    const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
    const DEFAULT_IMAGE_FETCH_TIMEOUT_SECS: u64 = 15;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub supabase_url: Option<String>,
        pub supabase_service_role_key: Option<String>,
        pub anthropic_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub max_image_bytes: usize,
        pub image_fetch_timeout_secs: u64,
        /// Offset used to find the caller's "today" when the request carries none.
        pub daily_utc_offset_minutes: i32,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                supabase_url: std::env::var("SUPABASE_URL").ok(),
                supabase_service_role_key: std::env::var("SUPABASE_SERVICE_ROLE_KEY").ok(),
                anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                max_image_bytes: parse_env("MAX_IMAGE_BYTES")?.unwrap_or(DEFAULT_MAX_IMAGE_BYTES),
                image_fetch_timeout_secs: parse_env("IMAGE_FETCH_TIMEOUT_SECS")?
                    .unwrap_or(DEFAULT_IMAGE_FETCH_TIMEOUT_SECS),
                daily_utc_offset_minutes: parse_env("DAILY_UTC_OFFSET_MINUTES")?.unwrap_or(0),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }

        pub fn require_supabase_url(&self) -> anyhow::Result<&str> {
            self.supabase_url
                .as_deref()
                .context("SUPABASE_URL is required")
        }

        pub fn require_supabase_service_role_key(&self) -> anyhow::Result<&str> {
            self.supabase_service_role_key
                .as_deref()
                .context("SUPABASE_SERVICE_ROLE_KEY is required")
        }
    }

    fn parse_env<T>(key: &str) -> anyhow::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match std::env::var(key) {
            Ok(raw) if !raw.trim().is_empty() => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .with_context(|| format!("{key} is not valid: {raw}")),
            _ => Ok(None),
        }
    }
}

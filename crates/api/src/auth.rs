use anyhow::Context;
use axum::http::{header, HeaderMap, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use fildzan_core::config::Settings;
use fildzan_core::domain::reading::Identity;

const AUTH_TIMEOUT_SECS: u64 = 10;

/// Turns a Supabase access token into the caller's user id.
#[derive(Debug, Clone)]
pub struct SupabaseAuth {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SupabaseUser {
    id: String,
}

impl SupabaseAuth {
    pub fn new(base_url: &str, api_key: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(AUTH_TIMEOUT_SECS))
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Self::new(
            settings.require_supabase_url()?,
            settings.require_supabase_service_role_key()?,
        )
    }

    /// `Ok(None)` when the token is rejected; `Err` when the provider itself fails.
    pub async fn resolve(&self, access_token: &str) -> anyhow::Result<Option<Identity>> {
        let res = self
            .http
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .context("Supabase auth request failed")?;

        let status = res.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Ok(None);
        }
        anyhow::ensure!(status.is_success(), "Supabase auth returned status={status}");

        let user = res
            .json::<SupabaseUser>()
            .await
            .context("failed to decode Supabase user")?;
        Ok(Identity::new(user.id))
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

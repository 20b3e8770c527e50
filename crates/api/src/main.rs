use std::sync::Arc;

use sqlx::PgPool;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fildzan_core::config::Settings;
use fildzan_core::llm::anthropic::AnthropicClient;
use fildzan_core::llm::ReadingModel;
use fildzan_core::photo::HttpImageFetcher;
use fildzan_core::reading::daily::DailyReadings;
use fildzan_core::reading::read_cup::ReadCup;
use fildzan_core::storage::audit::PgAuditLog;
use fildzan_core::storage::daily_readings::PgDailyReadingStore;
use fildzan_core::storage::AuditLog;

mod auth;
mod routes;

use routes::{AppState, Missing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let pool = connect_db(&settings).await;

    let auth = match auth::SupabaseAuth::from_settings(&settings) {
        Ok(auth) => Some(auth),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "Supabase auth not configured; every call is unauthenticated");
            None
        }
    };

    let model: Option<Arc<dyn ReadingModel>> = match AnthropicClient::from_settings(&settings) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "model client not configured; readings will fail");
            None
        }
    };

    let fetcher = Arc::new(HttpImageFetcher::from_settings(&settings)?);
    let audit: Option<Arc<dyn AuditLog>> = pool
        .clone()
        .map(|pool| Arc::new(PgAuditLog::new(pool)) as Arc<dyn AuditLog>);

    let read_cup = match &model {
        Some(model) => Ok(Arc::new(ReadCup::new(
            model.clone(),
            fetcher,
            audit,
            settings.max_image_bytes,
        ))),
        None => Err(Missing::ModelCredential),
    };
    let daily = match (&model, &pool) {
        (None, _) => Err(Missing::ModelCredential),
        (Some(_), None) => Err(Missing::Database),
        (Some(model), Some(pool)) => Ok(Arc::new(DailyReadings::new(
            model.clone(),
            Arc::new(PgDailyReadingStore::new(pool.clone())),
            settings.daily_utc_offset_minutes,
        ))),
    };

    let state = AppState {
        auth,
        read_cup,
        daily,
        // base64 inflates by 4/3; leave room for the JSON around it.
        max_body_bytes: settings.max_image_bytes / 3 * 4 + 64 * 1024,
    };
    let app = routes::router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn connect_db(settings: &Settings) -> Option<PgPool> {
    match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match fildzan_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

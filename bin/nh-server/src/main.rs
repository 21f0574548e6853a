//! Notification dispatcher API server.
//!
//! Runs the HTTP control plane (`nh-api`) and the embedded worker pool
//! (`nh-dispatcher`) in one process. Probes the database before accepting
//! traffic and drains in-flight jobs on shutdown.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PORT` | `3001` | HTTP API port |
//! | `METRICS_PORT` | `9101` | Metrics/health port |
//! | `DATABASE_URL` | `postgres://localhost:5432/notifyd` | Postgres connection URL |
//! | `QUEUE_DB_PATH` | `sqlite://./data/queue.db` | SQLite file backing the embedded queue |
//! | `LOG_FORMAT` | `text` | `json` for structured production logs |
//! | `RUST_LOG` | `info` | Log level |

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use nh_api::state::AppState;
use nh_channels::{ChannelAdapter, EmailAdapter, PushAdapter, SlackAdapter, SmsAdapter, TelegramAdapter};
use nh_config::AppConfig;
use nh_dispatcher::Dispatcher;
use nh_queue::SqliteQueue;
use nh_store::PostgresStore;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<()> {
    nh_common::logging::init_default_logging();
    info!("starting notification dispatcher server");

    let mut config = AppConfig::load().unwrap_or_else(|err| {
        tracing::warn!(%err, "failed to load config file/env overrides, using defaults");
        AppConfig::default()
    });

    let api_port: u16 = env_or_parse("PORT", config.http.port);
    let metrics_port: u16 = env_or_parse("METRICS_PORT", 9101);
    let database_url = env_or("DATABASE_URL", &config.database.url);
    let queue_db_path = env_or("QUEUE_DB_PATH", "sqlite://./data/queue.db");
    config.http.port = api_port;
    config.database.url = database_url.clone();

    info!(url = %database_url, "connecting to notification store");
    let pg_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&database_url)
        .await
        .context("failed to connect to database")?;
    let store = Arc::new(PostgresStore::new(pg_pool));
    store.init_schema().await.context("failed to initialize notification schema")?;
    let notification_repo: Arc<dyn nh_store::NotificationRepository> = store.clone();
    let log_repo: Arc<dyn nh_store::NotificationLogRepository> = store.clone();

    info!(path = %queue_db_path, "opening embedded queue");
    let queue_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&queue_db_path)
        .await
        .context("failed to open queue database")?;
    let queue = Arc::new(SqliteQueue::new(queue_pool, "notifications".to_string(), 300));
    queue.init_schema().await.context("failed to initialize queue schema")?;

    let metrics_handle = PrometheusBuilder::new().install_recorder().context("failed to install metrics recorder")?;

    let email = Arc::new(EmailAdapter::new(&config.smtp));
    let sms = Arc::new(SmsAdapter::new(config.sms.clone()));
    let push = Arc::new(PushAdapter::new(config.push.clone()));
    let slack = Arc::new(SlackAdapter::new(config.slack.clone()));
    let telegram = Arc::new(TelegramAdapter::new(config.telegram.clone()));

    let mut adapters: HashMap<nh_common::Channel, Arc<dyn ChannelAdapter>> = HashMap::new();
    adapters.insert(nh_common::Channel::Email, email.clone());
    adapters.insert(nh_common::Channel::Sms, sms.clone());
    adapters.insert(nh_common::Channel::Push, push.clone());
    adapters.insert(nh_common::Channel::Slack, slack.clone());
    adapters.insert(nh_common::Channel::Telegram, telegram.clone());

    let dispatcher = Arc::new(Dispatcher::new(
        &config.dispatcher,
        queue.clone(),
        notification_repo.clone(),
        log_repo.clone(),
        adapters,
    ));
    dispatcher.start();

    let state = AppState {
        store: notification_repo,
        logs: log_repo,
        queue: queue.clone(),
        dispatcher: dispatcher.clone(),
        email,
        sms,
        push,
        slack,
        telegram,
        metrics_handle: metrics_handle.clone(),
    };

    let app = nh_api::router(state);

    let api_listener = TcpListener::bind((config.http.host.as_str(), api_port))
        .await
        .with_context(|| format!("failed to bind API port {api_port}"))?;
    info!(port = api_port, "API listening");

    // Metrics live on a separate, narrower port so scraping doesn't share the
    // public API's network exposure.
    let metrics_router: Router = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(move || render_metrics(metrics_handle.clone())));
    let metrics_listener = TcpListener::bind(("0.0.0.0", metrics_port))
        .await
        .with_context(|| format!("failed to bind metrics port {metrics_port}"))?;
    info!(port = metrics_port, "metrics listening");

    let metrics_server = tokio::spawn(async move {
        axum::serve(metrics_listener, metrics_router).await.expect("metrics server failed");
    });

    axum::serve(api_listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server failed")?;

    metrics_server.abort();
    dispatcher.shutdown_with_grace(Duration::from_secs(30)).await;
    info!("shutdown complete");
    Ok(())
}

async fn render_metrics(handle: metrics_exporter_prometheus::PrometheusHandle) -> String {
    handle.render()
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "UP", "version": env!("CARGO_PKG_VERSION") }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

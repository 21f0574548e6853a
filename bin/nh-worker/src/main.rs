//! Standalone notification dispatch worker.
//!
//! Runs only the queue pump (`nh-dispatcher`'s worker pool and stall sweeper) —
//! no HTTP control plane. Exposes a small metrics/health sub-server and
//! self-probes its own health every 30 seconds, logging when the queue or
//! worker pool looks unhealthy so an external supervisor can act on it.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `DATABASE_URL` | `postgres://localhost:5432/notifyd` | Postgres connection URL |
//! | `QUEUE_DB_PATH` | `sqlite://./data/queue.db` | SQLite file backing the embedded queue |
//! | `METRICS_PORT` | `9102` | Metrics/health port |
//! | `LOG_FORMAT` | `text` | `json` for structured production logs |
//! | `RUST_LOG` | `info` | Log level |

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{Json, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

use nh_channels::{ChannelAdapter, EmailAdapter, PushAdapter, SlackAdapter, SmsAdapter, TelegramAdapter};
use nh_config::AppConfig;
use nh_dispatcher::Dispatcher;
use nh_queue::SqliteQueue;
use nh_store::PostgresStore;

const HEALTH_PROBE_INTERVAL: Duration = Duration::from_secs(30);

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<()> {
    nh_common::logging::init_default_logging();
    info!("starting standalone notification worker");

    let config = AppConfig::load().unwrap_or_else(|err| {
        tracing::warn!(%err, "failed to load config file/env overrides, using defaults");
        AppConfig::default()
    });

    let database_url = env_or("DATABASE_URL", &config.database.url);
    let queue_db_path = env_or("QUEUE_DB_PATH", "sqlite://./data/queue.db");
    let metrics_port: u16 = env_or_parse("METRICS_PORT", 9102);

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

    let prometheus_handle = PrometheusBuilder::new().install_recorder().context("failed to install metrics recorder")?;

    let mut adapters: HashMap<nh_common::Channel, Arc<dyn ChannelAdapter>> = HashMap::new();
    adapters.insert(nh_common::Channel::Email, Arc::new(EmailAdapter::new(&config.smtp)));
    adapters.insert(nh_common::Channel::Sms, Arc::new(SmsAdapter::new(config.sms.clone())));
    adapters.insert(nh_common::Channel::Push, Arc::new(PushAdapter::new(config.push.clone())));
    adapters.insert(nh_common::Channel::Slack, Arc::new(SlackAdapter::new(config.slack.clone())));
    adapters.insert(nh_common::Channel::Telegram, Arc::new(TelegramAdapter::new(config.telegram.clone())));

    let dispatcher = Arc::new(Dispatcher::new(
        &config.dispatcher,
        queue.clone(),
        notification_repo,
        log_repo,
        adapters,
    ));
    dispatcher.start();
    info!("worker pool and stall sweeper started");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let health_probe_handle = {
        let dispatcher = dispatcher.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEALTH_PROBE_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let health = dispatcher.admin.system_health().await;
                        if health.healthy {
                            info!("self health probe: OK");
                        } else {
                            warn!(?health, "self health probe: unhealthy");
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        })
    };

    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], metrics_port));
    let metrics_app = Router::new()
        .route("/health", axum::routing::get(health_handler))
        .route("/metrics", axum::routing::get(move || render_metrics(prometheus_handle.clone())));
    let metrics_listener = tokio::net::TcpListener::bind(metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics port {metrics_port}"))?;
    info!(%metrics_addr, "metrics listening");

    let metrics_task_handle = {
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            axum::serve(metrics_listener, metrics_app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .ok();
        })
    };

    shutdown_signal().await;
    info!("shutdown signal received, draining worker pool");
    let _ = shutdown_tx.send(());

    dispatcher.shutdown_with_grace(Duration::from_secs(30)).await;
    let _ = tokio::time::timeout(Duration::from_secs(30), async {
        let _ = health_probe_handle.await;
        let _ = metrics_task_handle.await;
    })
    .await;

    info!("worker shutdown complete");
    Ok(())
}

async fn render_metrics(handle: PrometheusHandle) -> String {
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

//! Background stall recovery: jobs held by a worker that crashed mid-send are
//! the sole failure mode this sweeper exists to catch, via `list_stale` plus
//! `QueuePublisher::publish`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nh_common::log_tag;
use nh_queue::{QueueConsumer, QueueJob, QueuePublisher};
use nh_store::{NewNotificationLog, NotificationLogRepository, NotificationRepository};
use tracing::{debug, error, info, warn};

pub struct StallSweeperConfig {
    pub interval: Duration,
    pub stall_threshold_minutes: i64,
}

pub struct StallSweeper<Q> {
    config: StallSweeperConfig,
    store: Arc<dyn NotificationRepository>,
    logs: Arc<dyn NotificationLogRepository>,
    queue: Arc<Q>,
    running: Arc<AtomicBool>,
}

impl<Q> StallSweeper<Q>
where
    Q: QueueConsumer + QueuePublisher + 'static,
{
    pub fn new(
        config: StallSweeperConfig,
        store: Arc<dyn NotificationRepository>,
        logs: Arc<dyn NotificationLogRepository>,
        queue: Arc<Q>,
    ) -> Self {
        Self { config, store, logs, queue, running: Arc::new(AtomicBool::new(false)) }
    }

    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("stall sweeper already running");
            return;
        }

        info!(
            interval_secs = self.config.interval.as_secs(),
            threshold_minutes = self.config.stall_threshold_minutes,
            "starting stall sweeper"
        );

        let store = self.store.clone();
        let logs = self.logs.clone();
        let queue = self.queue.clone();
        let running = self.running.clone();
        let interval = self.config.interval;
        let threshold_minutes = self.config.stall_threshold_minutes;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(e) = sweep_once(&*store, &*logs, &*queue, threshold_minutes).await {
                    error!(error = %e, "stall sweep pass failed");
                }
            }
        });
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

async fn sweep_once<Q>(
    store: &dyn NotificationRepository,
    logs: &dyn NotificationLogRepository,
    queue: &Q,
    threshold_minutes: i64,
) -> nh_store::Result<()>
where
    Q: QueueConsumer + QueuePublisher,
{
    let stale = store.list_stale(threshold_minutes).await?;
    metrics::gauge!("dispatcher.stall_sweep.stale_found").set(stale.len() as f64);
    if stale.is_empty() {
        debug!("no stale notifications found");
        return Ok(());
    }

    let mut recovered = 0u32;
    for notification in stale {
        let has_job = queue.has_job(notification.id).await.unwrap_or(true);
        if has_job {
            // Still tracked by the broker (in flight or awaiting its visibility
            // timeout); it will either complete or be reclaimed by another
            // worker on its own. Nothing to do.
            continue;
        }

        if let Err(e) = queue
            .publish(QueueJob {
                notification_id: notification.id,
                channel: notification.channel,
                priority: notification.priority,
                delay_ms: None,
            })
            .await
        {
            error!(notification_id = notification.id, error = %e, "failed to re-enqueue stalled notification");
            continue;
        }

        let _ = logs
            .append(NewNotificationLog {
                notification_id: notification.id,
                status: log_tag::STALL_RECOVERED.to_string(),
                message: Some(format!(
                    "worker holding this job went silent past the {threshold_minutes}-minute stall threshold"
                )),
                provider_response: None,
                error_details: None,
            })
            .await;

        recovered += 1;
    }

    if recovered > 0 {
        info!(recovered, "recovered stalled notifications");
        metrics::counter!("dispatcher.stall_sweep.recovered_total").increment(recovered as u64);
    }

    Ok(())
}


//! Admin surface operations (§4.6): pause/resume proxy straight to the broker;
//! `clear_failed`/`retry_failed` are broker housekeeping; the DB-driven retry
//! path is for rows whose broker-side job was lost entirely.

use std::sync::Arc;

use nh_common::{HealthReport, QueueStats};
use nh_queue::{QueueConsumer, QueueJob, QueuePublisher};
use nh_store::{NotificationRepository, Result as StoreResult};

use crate::pool::WorkerPool;

/// How far back `clear_failed` looks when cleaning up orphaned queue entries.
/// The embedded broker has no separate dead-letter bucket (§9 open question (b):
/// this system ships one queue engine, not the source's two near-duplicates),
/// so "clear failed broker jobs" here means sweeping entries that have sat
/// unclaimed far longer than any real visibility timeout or retry delay would
/// explain.
pub const CLEAR_FAILED_STUCK_MINUTES: u32 = 60;

pub struct AdminOps<Q> {
    queue: Arc<Q>,
    store: Arc<dyn NotificationRepository>,
    pool: Arc<WorkerPool>,
}

impl<Q> AdminOps<Q>
where
    Q: QueueConsumer + QueuePublisher + nh_queue::EmbeddedQueue,
{
    pub fn new(queue: Arc<Q>, store: Arc<dyn NotificationRepository>, pool: Arc<WorkerPool>) -> Self {
        Self { queue, store, pool }
    }

    pub async fn pause(&self) {
        self.queue.pause().await;
    }

    pub async fn resume(&self) {
        self.queue.resume().await;
    }

    /// Cleans orphaned broker entries; notification rows are left untouched so
    /// operators can audit them afterwards (§4.6).
    pub async fn clear_failed(&self) -> nh_queue::Result<u64> {
        self.queue.clean_stuck(CLEAR_FAILED_STUCK_MINUTES).await
    }

    /// Re-enqueues every row whose broker state was lost but whose relational
    /// row is still eligible for retry (`list_retryable`): `status=failed`,
    /// `retry_count < max_retries`.
    pub async fn retry_failed(&self) -> StoreResult<u32> {
        let retryable = self.store.list_retryable().await?;
        let mut requeued = 0u32;
        for notification in retryable {
            let job = QueueJob {
                notification_id: notification.id,
                channel: notification.channel,
                priority: notification.priority,
                delay_ms: None,
            };
            if self.queue.publish(job).await.is_ok() {
                requeued += 1;
            }
        }
        Ok(requeued)
    }

    /// Re-enqueue one specific row regardless of its current broker state
    /// (`POST /api/notifications/:id/retry`). `reset_retry_count` zeroes the
    /// row's `retry_count` first, giving it a fresh backoff schedule instead
    /// of continuing the one already in progress.
    pub async fn retry_one(&self, notification_id: i64, reset_retry_count: bool) -> StoreResult<bool> {
        let Some(notification) = self.store.find_by_id(notification_id).await? else {
            return Ok(false);
        };
        if reset_retry_count {
            self.store.reset_retry_count(notification.id).await?;
        }
        let job = QueueJob {
            notification_id: notification.id,
            channel: notification.channel,
            priority: notification.priority,
            delay_ms: None,
        };
        Ok(self.queue.publish(job).await.is_ok())
    }

    pub async fn queue_stats(&self) -> QueueStats {
        let metrics = self.queue.get_metrics().await.ok().flatten();
        match metrics {
            Some(m) => QueueStats {
                waiting: m.pending_jobs,
                active: m.in_flight_jobs,
                // The embedded broker retains no completed/failed/delayed
                // buckets once a job is acked — those live in the relational
                // store's status counts instead, surfaced via /api/analytics.
                completed: 0,
                failed: 0,
                delayed: 0,
            },
            None => QueueStats::default(),
        }
    }

    pub async fn system_health(&self) -> HealthReport {
        let healthy = self.queue.is_healthy();
        HealthReport {
            healthy,
            broker_connected: healthy,
            worker_pool_running: self.pool.is_running(),
            queue: self.queue_stats().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CLEAR_FAILED_STUCK_MINUTES;

    #[test]
    fn stuck_threshold_exceeds_any_channel_backoff_cap() {
        // Every retry policy caps its delay well under an hour (§4.5); if a
        // queue entry is still unclaimed after this long, it is orphaned, not
        // mid-backoff.
        assert!(CLEAR_FAILED_STUCK_MINUTES as u64 * 60_000 > 600_000);
    }
}

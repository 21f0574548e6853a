//! Dispatch engine: claims queued jobs, invokes channel adapters, applies
//! per-channel retry/backoff, recovers stalled jobs, and exposes the admin and
//! analytics surfaces `nh-api` sits in front of.
//!
//! `Dispatcher` is the single composition root: it owns the worker pool, the
//! stall sweeper, admin operations, and analytics, and gives them one
//! `start`/`shutdown` lifecycle, built as a composition of a poller, a
//! stale-job recovery task, and a process pool, running against a relational
//! store and an embedded queue.

pub mod admin;
pub mod analytics;
pub mod pool;
pub mod processor;
pub mod retry;
pub mod stall;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use nh_channels::ChannelAdapter;
use nh_common::Channel;
use nh_config::DispatcherConfig;
use nh_queue::{EmbeddedQueue, QueueConsumer, QueuePublisher};
use nh_store::{NotificationLogRepository, NotificationRepository};

pub use admin::AdminOps;
pub use analytics::{Analytics, AnalyticsSummary};
pub use pool::{WorkerPool, WorkerPoolConfig};
pub use processor::JobProcessor;
pub use retry::{policy_for, BackoffType, RetryPolicy};
pub use stall::{StallSweeper, StallSweeperConfig};

/// How long `Dispatcher::shutdown` waits for in-flight sends to finish before
/// giving up on a clean drain (§5).
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Ties the worker pool, stall sweeper, admin operations, and analytics to one
/// queue and store, so a binary entry point only has to construct one thing.
pub struct Dispatcher<Q> {
    pub pool: Arc<WorkerPool>,
    pub stall_sweeper: Arc<StallSweeper<Q>>,
    pub admin: Arc<AdminOps<Q>>,
    pub analytics: Arc<Analytics>,
}

impl<Q> Dispatcher<Q>
where
    Q: QueueConsumer + QueuePublisher + EmbeddedQueue + 'static,
{
    pub fn new(
        config: &DispatcherConfig,
        queue: Arc<Q>,
        store: Arc<dyn NotificationRepository>,
        logs: Arc<dyn NotificationLogRepository>,
        adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
    ) -> Self {
        let processor = Arc::new(JobProcessor::new(store.clone(), logs.clone(), adapters));

        let pool_config = WorkerPoolConfig {
            concurrency: config.worker_concurrency as usize,
            rate_limit_per_minute: Some(config.rate_limit_per_minute),
            ..WorkerPoolConfig::default()
        };
        let pool = Arc::new(WorkerPool::new(pool_config, queue.clone(), processor));

        let stall_sweeper = Arc::new(StallSweeper::new(
            StallSweeperConfig {
                interval: Duration::from_secs(config.stall_sweep_interval_secs),
                stall_threshold_minutes: config.stall_threshold_minutes,
            },
            store.clone(),
            logs.clone(),
            queue.clone(),
        ));

        let admin = Arc::new(AdminOps::new(queue, store.clone(), pool.clone()));
        let analytics = Arc::new(Analytics::new(store, logs));

        Self { pool, stall_sweeper, admin, analytics }
    }

    /// Start the worker pool's claim loop and the stall sweeper's background tick.
    pub fn start(&self) {
        self.pool.start();
        self.stall_sweeper.start();
    }

    /// Stop the stall sweeper immediately and drain the worker pool with the
    /// default grace period.
    pub async fn shutdown(&self) {
        self.shutdown_with_grace(DEFAULT_SHUTDOWN_GRACE).await;
    }

    pub async fn shutdown_with_grace(&self, grace_period: Duration) {
        self.stall_sweeper.stop();
        self.pool.shutdown(grace_period).await;
    }
}

#[cfg(test)]
mod tests {
    use super::DEFAULT_SHUTDOWN_GRACE;
    use std::time::Duration;

    #[test]
    fn default_shutdown_grace_is_generous_enough_to_drain_a_single_send() {
        // A single adapter HTTP call almost never takes longer than this; if it
        // does, the stall sweeper picks the job back up on the next boot anyway.
        assert!(DEFAULT_SHUTDOWN_GRACE >= Duration::from_secs(10));
    }
}

//! Worker pool: a semaphore bounds concurrency, an optional governor rate
//! limiter throttles adapter calls, and a single claim loop polls the queue and
//! fans claimed jobs out to the processor. No per-message-group FIFO queues or
//! dynamic reconfiguration — this system has no message-group concept, and pool
//! sizing is read once at startup from `DispatcherConfig`.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use governor::{clock::DefaultClock, state::{InMemoryState, NotKeyed}, Quota, RateLimiter};
use nh_queue::QueueConsumer;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::processor::JobProcessor;

pub struct WorkerPoolConfig {
    pub concurrency: usize,
    pub rate_limit_per_minute: Option<u32>,
    pub poll_batch_size: u32,
    /// How long the claim loop sleeps after an empty poll before trying again.
    pub idle_poll_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            rate_limit_per_minute: Some(100),
            poll_batch_size: 10,
            idle_poll_interval: Duration::from_millis(500),
        }
    }
}

pub struct WorkerPool {
    config: WorkerPoolConfig,
    queue: Arc<dyn QueueConsumer>,
    processor: Arc<JobProcessor>,
    semaphore: Arc<Semaphore>,
    rate_limiter: Option<Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>>,
    running: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig, queue: Arc<dyn QueueConsumer>, processor: Arc<JobProcessor>) -> Self {
        let rate_limiter = config
            .rate_limit_per_minute
            .and_then(NonZeroU32::new)
            .map(|nz| Arc::new(RateLimiter::direct(Quota::per_minute(nz))));

        Self {
            semaphore: Arc::new(Semaphore::new(config.concurrency)),
            rate_limiter,
            running: Arc::new(AtomicBool::new(false)),
            config,
            queue,
            processor,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the claim loop as a background task. Idempotent.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("worker pool already running");
            return;
        }

        info!(
            concurrency = self.config.concurrency,
            rate_limit_per_minute = ?self.config.rate_limit_per_minute,
            "starting worker pool claim loop"
        );
        metrics::gauge!("dispatcher.pool.concurrency").set(self.config.concurrency as f64);

        let queue = self.queue.clone();
        let processor = self.processor.clone();
        let semaphore = self.semaphore.clone();
        let rate_limiter = self.rate_limiter.clone();
        let running = self.running.clone();
        let batch_size = self.config.poll_batch_size;
        let idle_poll_interval = self.config.idle_poll_interval;

        tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                let jobs = match queue.poll(batch_size).await {
                    Ok(jobs) => jobs,
                    Err(e) => {
                        error!(error = %e, "queue poll failed");
                        tokio::time::sleep(idle_poll_interval).await;
                        continue;
                    }
                };

                if jobs.is_empty() {
                    tokio::time::sleep(idle_poll_interval).await;
                    continue;
                }

                metrics::counter!("dispatcher.jobs.claimed_total").increment(jobs.len() as u64);

                for job in jobs {
                    if let Some(ref limiter) = rate_limiter {
                        while limiter.check().is_err() {
                            if !running.load(Ordering::SeqCst) {
                                return;
                            }
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    }

                    let permit = match semaphore.clone().acquire_owned().await {
                        Ok(p) => p,
                        Err(_) => return, // semaphore closed, pool is shutting down
                    };

                    let processor = processor.clone();
                    let queue = queue.clone();

                    tokio::spawn(async move {
                        processor.process(queue.as_ref(), job).await;
                        drop(permit);
                    });
                }
            }
            debug!("worker pool claim loop exited");
        });
    }

    /// Stop accepting new jobs. Does not wait for in-flight jobs; see `shutdown`.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Stop the claim loop, then wait up to `grace_period` for in-flight jobs to
    /// release their semaphore permits (§5: "waits up to a grace period for
    /// in-flight jobs to drain"). Jobs still running past the grace period are
    /// left for the stall sweeper on the next boot.
    pub async fn shutdown(&self, grace_period: Duration) {
        self.stop();
        let deadline = tokio::time::Instant::now() + grace_period;

        while self.semaphore.available_permits() < self.config.concurrency {
            if tokio::time::Instant::now() >= deadline {
                warn!("shutdown grace period elapsed with jobs still in flight");
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

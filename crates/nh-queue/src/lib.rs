//! Durable, priority-ordered work queue sitting between notification submission and
//! the worker pool. Queue rows are pointers (`notification_id`, `channel`, `priority`)
//! rather than full payloads — the notification store remains the source of truth for
//! content, so a queue entry can be reconstructed or re-derived if ever lost.

use async_trait::async_trait;
use nh_common::{Channel, Priority};
use serde::{Deserialize, Serialize};

pub mod error;
pub mod sqlite;

pub use error::QueueError;
pub use sqlite::SqliteQueue;

pub type Result<T> = std::result::Result<T, QueueError>;

/// A unit of work placed on the queue: "go dispatch this notification".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueJob {
    pub notification_id: i64,
    pub channel: Channel,
    pub priority: Priority,
    /// Delay before the job becomes eligible for polling, e.g. to honor a
    /// notification's `scheduled_at`. `None`/`Some(0)` means immediately eligible.
    pub delay_ms: Option<u64>,
}

/// A job handed back by `poll`, carrying the opaque receipt handle needed to ack/nack it.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub job: QueueJob,
    pub receipt_handle: String,
}

#[derive(Debug, Clone, Default)]
pub struct QueueMetrics {
    pub pending_jobs: u64,
    pub in_flight_jobs: u64,
    pub queue_identifier: String,
}

/// Consumer side of the queue: poll, ack, nack, extend visibility (§4.3, §4.4).
#[async_trait]
pub trait QueueConsumer: Send + Sync {
    fn identifier(&self) -> &str;

    /// Poll for jobs, ordered by priority descending then FIFO within a priority tier.
    /// Returns an empty vec while paused, without affecting `is_healthy`.
    async fn poll(&self, max_jobs: u32) -> Result<Vec<QueuedJob>>;

    /// Whether a job for this notification is still tracked by the queue,
    /// visible or not — used by the stall sweeper to tell "worker crashed but
    /// the job will reappear on its own once the visibility timeout lapses"
    /// apart from "the job fell off the queue entirely and needs re-enqueuing"
    /// (§4.4 stall recovery).
    async fn has_job(&self, notification_id: i64) -> Result<bool>;

    async fn ack(&self, receipt_handle: &str) -> Result<()>;

    /// Make the job visible again after `delay_seconds` (used for retry backoff).
    async fn nack(&self, receipt_handle: &str, delay_seconds: Option<u32>) -> Result<()>;

    async fn extend_visibility(&self, receipt_handle: &str, seconds: u32) -> Result<()>;

    fn is_healthy(&self) -> bool;

    async fn stop(&self);

    async fn get_metrics(&self) -> Result<Option<QueueMetrics>> {
        Ok(None)
    }

    /// Stop handing out new jobs without tearing the consumer down (§4.3 lifecycle control).
    async fn pause(&self);

    async fn resume(&self);

    fn is_paused(&self) -> bool;
}

/// Publisher side of the queue: enqueue work (§4.2 after a notification is created,
/// §4.5 after an admin retry).
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    fn identifier(&self) -> &str;

    async fn publish(&self, job: QueueJob) -> Result<()>;

    async fn publish_batch(&self, jobs: Vec<QueueJob>) -> Result<()>;
}

/// Combined consumer + publisher for the embedded SQLite-backed deployment mode.
#[async_trait]
pub trait EmbeddedQueue: QueueConsumer + QueuePublisher {
    async fn init_schema(&self) -> Result<()>;

    /// Remove entries that have sat unclaimed (never successfully polled and acked)
    /// for longer than `older_than_minutes`. The embedded broker has no separate
    /// "failed job" bucket the way an external broker's dead-letter queue would —
    /// the dispatcher acks a job the moment its notification reaches a terminal
    /// status (§4.4) — so this is best-effort housekeeping for orphaned rows, not
    /// the primary failure-recovery path (that's `list_retryable` on the store).
    async fn clean_stuck(&self, older_than_minutes: u32) -> Result<u64>;
}

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use crate::{QueueConsumer, QueueError, QueueJob, QueueMetrics, QueuePublisher, QueuedJob, Result};
use nh_common::{Channel, Priority};

/// SQLite-backed embedded queue. Polling orders by `priority DESC, created_at ASC`
/// (§4.3) and hides a polled row behind a visibility timeout until it is acked or
/// nacked, mirroring SQS's poll/ack/nack contract without a network broker.
pub struct SqliteQueue {
    pool: Pool<Sqlite>,
    queue_name: String,
    visibility_timeout_seconds: u32,
    running: AtomicBool,
    paused: AtomicBool,
}

impl SqliteQueue {
    pub fn new(pool: Pool<Sqlite>, queue_name: String, visibility_timeout_seconds: u32) -> Self {
        Self {
            pool,
            queue_name,
            visibility_timeout_seconds,
            running: AtomicBool::new(true),
            paused: AtomicBool::new(false),
        }
    }

    async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS queue_jobs (
                notification_id INTEGER PRIMARY KEY,
                queue_name TEXT NOT NULL,
                channel TEXT NOT NULL,
                priority INTEGER NOT NULL,
                receipt_handle TEXT,
                visible_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_queue_jobs_poll
            ON queue_jobs (queue_name, visible_at, priority DESC, created_at ASC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!(queue = %self.queue_name, "sqlite queue schema initialized");
        Ok(())
    }

    fn generate_receipt_handle(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

#[async_trait]
impl QueueConsumer for SqliteQueue {
    fn identifier(&self) -> &str {
        &self.queue_name
    }

    async fn poll(&self, max_jobs: u32) -> Result<Vec<QueuedJob>> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(QueueError::Stopped);
        }
        if self.paused.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }

        let now = Utc::now().timestamp();
        let new_visible_at = now + self.visibility_timeout_seconds as i64;

        let rows = sqlx::query(
            r#"
            SELECT notification_id, channel, priority
            FROM queue_jobs
            WHERE queue_name = ? AND visible_at <= ?
            ORDER BY priority DESC, created_at ASC
            LIMIT ?
            "#,
        )
        .bind(&self.queue_name)
        .bind(now)
        .bind(max_jobs as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut jobs = Vec::with_capacity(rows.len());

        for row in rows {
            let notification_id: i64 = row.get("notification_id");
            let channel_str: String = row.get("channel");
            let priority_i: i64 = row.get("priority");

            let receipt_handle = self.generate_receipt_handle();

            let updated = sqlx::query(
                r#"
                UPDATE queue_jobs
                SET receipt_handle = ?, visible_at = ?
                WHERE notification_id = ? AND queue_name = ? AND visible_at <= ?
                "#,
            )
            .bind(&receipt_handle)
            .bind(new_visible_at)
            .bind(notification_id)
            .bind(&self.queue_name)
            .bind(now)
            .execute(&self.pool)
            .await?;

            if updated.rows_affected() == 0 {
                continue; // another consumer grabbed it first
            }

            let channel: Channel = channel_str.parse().map_err(|e| QueueError::Database(format!("{e}")))?;
            let priority = priority_from_score(priority_i);

            jobs.push(QueuedJob {
                job: QueueJob { notification_id, channel, priority, delay_ms: None },
                receipt_handle,
            });
        }

        if !jobs.is_empty() {
            debug!(queue = %self.queue_name, count = jobs.len(), "polled jobs from sqlite queue");
        }

        Ok(jobs)
    }

    async fn has_job(&self, notification_id: i64) -> Result<bool> {
        let row = sqlx::query("SELECT 1 as present FROM queue_jobs WHERE notification_id = ? AND queue_name = ?")
            .bind(notification_id)
            .bind(&self.queue_name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn ack(&self, receipt_handle: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM queue_jobs WHERE receipt_handle = ? AND queue_name = ?")
            .bind(receipt_handle)
            .bind(&self.queue_name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            warn!(receipt_handle, queue = %self.queue_name, "ack failed, job not found");
            return Err(QueueError::NotFound(receipt_handle.to_string()));
        }

        Ok(())
    }

    async fn nack(&self, receipt_handle: &str, delay_seconds: Option<u32>) -> Result<()> {
        let delay = delay_seconds.unwrap_or(0) as i64;
        let new_visible_at = Utc::now().timestamp() + delay;

        let result = sqlx::query(
            r#"
            UPDATE queue_jobs
            SET visible_at = ?, receipt_handle = NULL
            WHERE receipt_handle = ? AND queue_name = ?
            "#,
        )
        .bind(new_visible_at)
        .bind(receipt_handle)
        .bind(&self.queue_name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!(receipt_handle, queue = %self.queue_name, "nack failed, job not found");
            return Err(QueueError::NotFound(receipt_handle.to_string()));
        }

        Ok(())
    }

    async fn extend_visibility(&self, receipt_handle: &str, seconds: u32) -> Result<()> {
        let new_visible_at = Utc::now().timestamp() + seconds as i64;

        let result = sqlx::query("UPDATE queue_jobs SET visible_at = ? WHERE receipt_handle = ? AND queue_name = ?")
            .bind(new_visible_at)
            .bind(receipt_handle)
            .bind(&self.queue_name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::NotFound(receipt_handle.to_string()));
        }

        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        info!(queue = %self.queue_name, "sqlite queue consumer stopped");
    }

    async fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        info!(queue = %self.queue_name, "sqlite queue paused");
    }

    async fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        info!(queue = %self.queue_name, "sqlite queue resumed");
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    async fn get_metrics(&self) -> Result<Option<QueueMetrics>> {
        let now = Utc::now().timestamp();

        let pending_row = sqlx::query(
            "SELECT COUNT(*) as count FROM queue_jobs WHERE queue_name = ? AND visible_at <= ? AND receipt_handle IS NULL",
        )
        .bind(&self.queue_name)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        let pending_jobs: i64 = pending_row.get("count");

        let in_flight_row = sqlx::query(
            "SELECT COUNT(*) as count FROM queue_jobs WHERE queue_name = ? AND receipt_handle IS NOT NULL",
        )
        .bind(&self.queue_name)
        .fetch_one(&self.pool)
        .await?;
        let in_flight_jobs: i64 = in_flight_row.get("count");

        Ok(Some(QueueMetrics {
            pending_jobs: pending_jobs as u64,
            in_flight_jobs: in_flight_jobs as u64,
            queue_identifier: self.queue_name.clone(),
        }))
    }
}

#[async_trait]
impl QueuePublisher for SqliteQueue {
    fn identifier(&self) -> &str {
        &self.queue_name
    }

    async fn publish(&self, job: QueueJob) -> Result<()> {
        let now = Utc::now().timestamp();
        let delay_seconds = job.delay_ms.unwrap_or(0).div_ceil(1000) as i64;
        let visible_at = now + delay_seconds;

        let existing = sqlx::query("SELECT notification_id FROM queue_jobs WHERE notification_id = ? AND queue_name = ?")
            .bind(job.notification_id)
            .bind(&self.queue_name)
            .fetch_optional(&self.pool)
            .await?;

        if existing.is_some() {
            debug!(notification_id = job.notification_id, queue = %self.queue_name, "duplicate job, skipping");
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO queue_jobs (notification_id, queue_name, channel, priority, visible_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.notification_id)
        .bind(&self.queue_name)
        .bind(job.channel.as_str())
        .bind(job.priority.score())
        .bind(visible_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn publish_batch(&self, jobs: Vec<QueueJob>) -> Result<()> {
        for job in jobs {
            self.publish(job).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl crate::EmbeddedQueue for SqliteQueue {
    async fn init_schema(&self) -> Result<()> {
        self.create_schema().await
    }

    async fn clean_stuck(&self, older_than_minutes: u32) -> Result<u64> {
        let cutoff = Utc::now().timestamp() - (older_than_minutes as i64 * 60);

        let result = sqlx::query(
            "DELETE FROM queue_jobs WHERE queue_name = ? AND created_at < ? AND visible_at < ?",
        )
        .bind(&self.queue_name)
        .bind(cutoff)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            info!(queue = %self.queue_name, removed, "cleaned stuck queue entries");
        }
        Ok(removed)
    }
}

fn priority_from_score(score: i64) -> Priority {
    match score {
        s if s >= 10 => Priority::Urgent,
        s if s >= 5 => Priority::High,
        s if s >= 0 => Priority::Normal,
        _ => Priority::Low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EmbeddedQueue;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_queue() -> SqliteQueue {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        let queue = SqliteQueue::new(pool, "test-queue".to_string(), 30);
        queue.init_schema().await.unwrap();
        queue
    }

    #[tokio::test]
    async fn publish_and_poll_roundtrip() {
        let queue = create_test_queue().await;
        let job = QueueJob { notification_id: 1, channel: Channel::Email, priority: Priority::Normal, delay_ms: None };
        queue.publish(job).await.unwrap();

        let polled = queue.poll(10).await.unwrap();
        assert_eq!(polled.len(), 1);
        assert_eq!(polled[0].job.notification_id, 1);

        queue.ack(&polled[0].receipt_handle).await.unwrap();
        let polled = queue.poll(10).await.unwrap();
        assert!(polled.is_empty());
    }

    #[tokio::test]
    async fn nack_with_delay_hides_job() {
        let queue = create_test_queue().await;
        let job = QueueJob { notification_id: 2, channel: Channel::Sms, priority: Priority::Normal, delay_ms: None };
        queue.publish(job).await.unwrap();

        let polled = queue.poll(10).await.unwrap();
        queue.nack(&polled[0].receipt_handle, Some(60)).await.unwrap();

        let polled = queue.poll(10).await.unwrap();
        assert!(polled.is_empty());
    }

    #[tokio::test]
    async fn delayed_publish_is_not_eligible_until_visible_at() {
        let queue = create_test_queue().await;
        let job = QueueJob {
            notification_id: 4,
            channel: Channel::Email,
            priority: Priority::Normal,
            delay_ms: Some(3_600_000),
        };
        queue.publish(job).await.unwrap();

        let polled = queue.poll(10).await.unwrap();
        assert!(polled.is_empty());
        assert!(queue.has_job(4).await.unwrap());
    }

    #[tokio::test]
    async fn higher_priority_polls_first() {
        let queue = create_test_queue().await;
        queue
            .publish(QueueJob { notification_id: 10, channel: Channel::Email, priority: Priority::Low, delay_ms: None })
            .await
            .unwrap();
        queue
            .publish(QueueJob { notification_id: 11, channel: Channel::Email, priority: Priority::Urgent, delay_ms: None })
            .await
            .unwrap();
        queue
            .publish(QueueJob { notification_id: 12, channel: Channel::Email, priority: Priority::Normal, delay_ms: None })
            .await
            .unwrap();

        let polled = queue.poll(10).await.unwrap();
        let ids: Vec<i64> = polled.iter().map(|j| j.job.notification_id).collect();
        assert_eq!(ids, vec![11, 12, 10]);
    }

    #[tokio::test]
    async fn paused_queue_polls_empty() {
        let queue = create_test_queue().await;
        queue
            .publish(QueueJob { notification_id: 20, channel: Channel::Email, priority: Priority::Normal, delay_ms: None })
            .await
            .unwrap();

        queue.pause().await;
        assert!(queue.is_paused());
        assert!(queue.poll(10).await.unwrap().is_empty());

        queue.resume().await;
        assert!(!queue.poll(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn has_job_reflects_queue_membership() {
        let queue = create_test_queue().await;
        assert!(!queue.has_job(30).await.unwrap());

        queue
            .publish(QueueJob { notification_id: 30, channel: Channel::Email, priority: Priority::Normal, delay_ms: None })
            .await
            .unwrap();
        assert!(queue.has_job(30).await.unwrap());

        let polled = queue.poll(10).await.unwrap();
        queue.ack(&polled[0].receipt_handle).await.unwrap();
        assert!(!queue.has_job(30).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_publish_is_idempotent() {
        let queue = create_test_queue().await;
        let job = QueueJob { notification_id: 3, channel: Channel::Push, priority: Priority::Normal, delay_ms: None };
        queue.publish(job.clone()).await.unwrap();
        queue.publish(job).await.unwrap();

        let polled = queue.poll(10).await.unwrap();
        assert_eq!(polled.len(), 1);
    }
}

//! PostgreSQL implementation of the notification and log repositories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nh_common::{Channel, NewNotification, Notification, NotificationLog, NotificationStatus};
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::repository::{
    NewNotificationLog, NotificationLogRepository, NotificationRepository, Result, StatsLast24h,
    StoreError,
};

/// Shared PostgreSQL-backed store. Implements both repository traits over one
/// pool so `update_status` can append its log row in the same transaction (§4.2:
/// "atomic with the corresponding log append").
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notification_users (
                id BIGSERIAL PRIMARY KEY,
                email TEXT UNIQUE,
                name TEXT,
                phone TEXT,
                push_token TEXT,
                slack_webhook_url TEXT,
                telegram_chat_id TEXT,
                preferences JSONB NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT REFERENCES notification_users(id),
                template_id BIGINT,
                channel TEXT NOT NULL,
                recipient TEXT NOT NULL,
                subject TEXT,
                content TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                error_message TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL DEFAULT 3,
                priority TEXT NOT NULL DEFAULT 'normal',
                scheduled_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                sent_at TIMESTAMPTZ,
                last_processed_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE INDEX IF NOT EXISTS idx_notifications_status ON notifications(status);
            CREATE INDEX IF NOT EXISTS idx_notifications_user_id ON notifications(user_id);
            CREATE INDEX IF NOT EXISTS idx_notifications_channel ON notifications(channel);
            CREATE INDEX IF NOT EXISTS idx_notifications_scheduled_at ON notifications(scheduled_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notification_logs (
                id BIGSERIAL PRIMARY KEY,
                notification_id BIGINT NOT NULL REFERENCES notifications(id),
                status TEXT NOT NULL,
                message TEXT,
                error_details JSONB,
                provider_response JSONB,
                metadata JSONB,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE INDEX IF NOT EXISTS idx_notification_logs_notification_id ON notification_logs(notification_id);
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("initialized notification store schema");
        Ok(())
    }

    fn row_to_notification(row: &sqlx::postgres::PgRow) -> Result<Notification> {
        let channel_str: String = row.get("channel");
        let status_str: String = row.get("status");
        let priority_str: String = row.get("priority");

        Ok(Notification {
            id: row.get("id"),
            user_id: row.get("user_id"),
            template_id: row.get("template_id"),
            channel: channel_str.parse().map_err(|e| StoreError::Invalid(format!("{e}")))?,
            recipient: row.get("recipient"),
            subject: row.get("subject"),
            content: row.get("content"),
            status: status_str.parse().map_err(|e| StoreError::Invalid(format!("{e}")))?,
            priority: priority_str.parse().map_err(|e| StoreError::Invalid(format!("{e}")))?,
            retry_count: row.get("retry_count"),
            max_retries: row.get("max_retries"),
            scheduled_at: row.get("scheduled_at"),
            last_processed_at: row.get("last_processed_at"),
            sent_at: row.get("sent_at"),
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn row_to_log(row: &sqlx::postgres::PgRow) -> NotificationLog {
        NotificationLog {
            id: row.get("id"),
            notification_id: row.get("notification_id"),
            status: row.get("status"),
            message: row.get("message"),
            provider_response: row.get("provider_response"),
            error_details: row.get("error_details"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl NotificationRepository for PostgresStore {
    async fn create(&self, new: NewNotification) -> Result<Notification> {
        let row = sqlx::query(
            r#"
            INSERT INTO notifications
                (user_id, template_id, channel, recipient, subject, content, priority, max_retries, scheduled_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(new.user_id)
        .bind(new.template_id)
        .bind(new.channel.as_str())
        .bind(&new.recipient)
        .bind(&new.subject)
        .bind(&new.content)
        .bind(new.priority.as_str())
        .bind(new.max_retries)
        .bind(new.scheduled_at)
        .fetch_one(&self.pool)
        .await?;

        let notification = Self::row_to_notification(&row)?;

        sqlx::query(
            "INSERT INTO notification_logs (notification_id, status, message) VALUES ($1, $2, $3)",
        )
        .bind(notification.id)
        .bind(nh_common::log_tag::CREATED)
        .bind("notification created")
        .execute(&self.pool)
        .await?;

        debug!(notification_id = notification.id, "created notification");
        Ok(notification)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Notification>> {
        let row = sqlx::query("SELECT * FROM notifications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_notification).transpose()
    }

    async fn update_status(
        &self,
        id: i64,
        new_status: NotificationStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = $1,
                error_message = COALESCE($2, error_message),
                sent_at = CASE WHEN $1 = 'sent' AND sent_at IS NULL THEN now() ELSE sent_at END,
                updated_at = now()
            WHERE id = $3
            "#,
        )
        .bind(new_status.as_str())
        .bind(error_message)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }

        sqlx::query(
            "INSERT INTO notification_logs (notification_id, status, message) VALUES ($1, $2, $3)",
        )
        .bind(id)
        .bind(log_tag_for_status(new_status))
        .bind(error_message)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_last_processed(&self, id: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE notifications SET last_processed_at = now(), updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn increment_retry_count(&self, id: i64) -> Result<i32> {
        let row = sqlx::query(
            "UPDATE notifications SET retry_count = retry_count + 1, updated_at = now() WHERE id = $1 RETURNING retry_count",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound(id))?;

        Ok(row.get("retry_count"))
    }

    async fn reset_retry_count(&self, id: i64) -> Result<()> {
        let result = sqlx::query("UPDATE notifications SET retry_count = 0, updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn list_pending(&self, limit: u32) -> Result<Vec<Notification>> {
        let rows = sqlx::query(
            "SELECT * FROM notifications WHERE status = 'pending' AND scheduled_at <= now() ORDER BY scheduled_at ASC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_notification).collect()
    }

    async fn list_retryable(&self) -> Result<Vec<Notification>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM notifications
            WHERE status = 'failed' AND retry_count < max_retries AND scheduled_at <= now()
            ORDER BY
                CASE priority WHEN 'urgent' THEN 3 WHEN 'high' THEN 2 WHEN 'normal' THEN 1 ELSE 0 END DESC,
                created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_notification).collect()
    }

    async fn list_stale(&self, minutes: i64) -> Result<Vec<Notification>> {
        let rows = sqlx::query(
            "SELECT * FROM notifications WHERE status = 'processing' AND last_processed_at < now() - ($1 || ' minutes')::interval",
        )
        .bind(minutes.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_notification).collect()
    }

    async fn list_by_user(&self, user_id: i64, page: u32, limit: u32) -> Result<Vec<Notification>> {
        let offset = (page.saturating_sub(1)) as i64 * limit as i64;
        let rows = sqlx::query(
            "SELECT * FROM notifications WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_notification).collect()
    }

    async fn stats_last_24h(&self) -> Result<StatsLast24h> {
        let status_rows = sqlx::query(
            "SELECT status, COUNT(*) as count FROM notifications WHERE created_at > now() - interval '24 hours' GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_status = Vec::with_capacity(status_rows.len());
        for row in &status_rows {
            let status_str: String = row.get("status");
            let status: NotificationStatus = status_str.parse().map_err(|e| StoreError::Invalid(format!("{e}")))?;
            by_status.push((status, row.get("count")));
        }

        let channel_rows = sqlx::query(
            "SELECT channel, COUNT(*) as count FROM notifications WHERE created_at > now() - interval '24 hours' GROUP BY channel",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_channel = Vec::with_capacity(channel_rows.len());
        for row in &channel_rows {
            let channel_str: String = row.get("channel");
            let channel: Channel = channel_str.parse().map_err(|e| StoreError::Invalid(format!("{e}")))?;
            by_channel.push((channel, row.get("count")));
        }

        let hourly_rows = sqlx::query(
            r#"
            SELECT date_trunc('hour', created_at) as bucket, COUNT(*) as count
            FROM notifications
            WHERE created_at > now() - interval '24 hours'
            GROUP BY bucket
            ORDER BY bucket ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let hourly_counts: Vec<(DateTime<Utc>, i64)> = hourly_rows
            .iter()
            .map(|row| (row.get("bucket"), row.get("count")))
            .collect();

        let hourly_sent_failed_rows = sqlx::query(
            r#"
            SELECT
                date_trunc('hour', created_at) as bucket,
                COUNT(*) FILTER (WHERE status = 'sent') as sent_count,
                COUNT(*) FILTER (WHERE status = 'failed') as failed_count
            FROM notifications
            WHERE created_at > now() - interval '24 hours'
            GROUP BY bucket
            ORDER BY bucket ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let hourly_sent_failed: Vec<(DateTime<Utc>, i64, i64)> = hourly_sent_failed_rows
            .iter()
            .map(|row| (row.get("bucket"), row.get("sent_count"), row.get("failed_count")))
            .collect();

        Ok(StatsLast24h { by_status, by_channel, hourly_counts, hourly_sent_failed })
    }
}

#[async_trait]
impl NotificationLogRepository for PostgresStore {
    async fn append(&self, log: NewNotificationLog) -> Result<NotificationLog> {
        let row = sqlx::query(
            r#"
            INSERT INTO notification_logs (notification_id, status, message, provider_response, error_details)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(log.notification_id)
        .bind(&log.status)
        .bind(&log.message)
        .bind(&log.provider_response)
        .bind(&log.error_details)
        .fetch_one(&self.pool)
        .await?;

        Ok(Self::row_to_log(&row))
    }

    async fn by_notification(&self, notification_id: i64) -> Result<Vec<NotificationLog>> {
        let rows = sqlx::query(
            "SELECT * FROM notification_logs WHERE notification_id = $1 ORDER BY created_at ASC",
        )
        .bind(notification_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_log).collect())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<NotificationLog>> {
        let rows = sqlx::query("SELECT * FROM notification_logs ORDER BY created_at DESC LIMIT $1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(Self::row_to_log).collect())
    }

    async fn errors_only(&self, limit: u32) -> Result<Vec<NotificationLog>> {
        let rows = sqlx::query(
            "SELECT * FROM notification_logs WHERE status = 'error' OR status = 'failed' ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_log).collect())
    }
}

/// Maps a row-status transition onto the free-text log vocabulary in
/// `nh_common::log_tag`: most statuses read the same either way, but `sent`
/// logs as `delivered` and `retrying` logs as `retry_scheduled` to match the
/// distinct attempt-outcome tags the dispatcher's retry engine expects (§4.4).
fn log_tag_for_status(status: NotificationStatus) -> &'static str {
    match status {
        NotificationStatus::Sent => nh_common::log_tag::DELIVERED,
        NotificationStatus::Retrying => nh_common::log_tag::RETRY_SCHEDULED,
        other => other.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_tag_mapping_covers_sent_and_retrying() {
        assert_eq!(log_tag_for_status(NotificationStatus::Sent), "delivered");
        assert_eq!(log_tag_for_status(NotificationStatus::Retrying), "retry_scheduled");
        assert_eq!(log_tag_for_status(NotificationStatus::Queued), "queued");
    }

    #[test]
    fn stats_default_is_empty() {
        let stats = StatsLast24h::default();
        assert!(stats.by_status.is_empty());
        assert!(stats.by_channel.is_empty());
    }
}

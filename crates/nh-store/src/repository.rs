//! Repository traits over the relational store (§4.2).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nh_common::{Channel, NewNotification, Notification, NotificationLog, NotificationStatus};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("notification {0} not found")]
    NotFound(i64),

    #[error("invalid stored value: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Per-channel, per-status counts over the trailing 24 hours, plus hourly buckets
/// for the submission rate and for the sent/failed split analytics reports (§4.2
/// `stats_last_24h`, feeds §4.6 analytics).
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsLast24h {
    pub by_status: Vec<(NotificationStatus, i64)>,
    pub by_channel: Vec<(Channel, i64)>,
    pub hourly_counts: Vec<(DateTime<Utc>, i64)>,
    /// (hour bucket, sent count, failed count) — the hourly (sent, failed) series §4.6 asks for.
    pub hourly_sent_failed: Vec<(DateTime<Utc>, i64, i64)>,
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create(&self, new: NewNotification) -> Result<Notification>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Notification>>;

    /// Sets `sent_at` iff `new_status = sent` and the row's current `sent_at` is null.
    async fn update_status(
        &self,
        id: i64,
        new_status: NotificationStatus,
        error_message: Option<&str>,
    ) -> Result<()>;

    async fn update_last_processed(&self, id: i64) -> Result<()>;

    /// Atomic increment; returns the new `retry_count`.
    async fn increment_retry_count(&self, id: i64) -> Result<i32>;

    /// Zeroes `retry_count`, used by an operator-triggered retry that wants a
    /// fresh backoff schedule rather than continuing the existing one.
    async fn reset_retry_count(&self, id: i64) -> Result<()>;

    async fn list_pending(&self, limit: u32) -> Result<Vec<Notification>>;

    async fn list_retryable(&self) -> Result<Vec<Notification>>;

    async fn list_stale(&self, minutes: i64) -> Result<Vec<Notification>>;

    async fn list_by_user(&self, user_id: i64, page: u32, limit: u32) -> Result<Vec<Notification>>;

    async fn stats_last_24h(&self) -> Result<StatsLast24h>;
}

#[async_trait]
pub trait NotificationLogRepository: Send + Sync {
    async fn append(&self, log: NewNotificationLog) -> Result<NotificationLog>;

    async fn by_notification(&self, notification_id: i64) -> Result<Vec<NotificationLog>>;

    async fn recent(&self, limit: u32) -> Result<Vec<NotificationLog>>;

    async fn errors_only(&self, limit: u32) -> Result<Vec<NotificationLog>>;
}

/// Input to `NotificationLogRepository::append`.
#[derive(Debug, Clone)]
pub struct NewNotificationLog {
    pub notification_id: i64,
    pub status: String,
    pub message: Option<String>,
    pub provider_response: Option<serde_json::Value>,
    pub error_details: Option<serde_json::Value>,
}

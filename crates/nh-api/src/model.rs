//! Request/response DTOs for the HTTP control plane (§6). Field names use
//! `camelCase` on the wire; the notification/log domain types stay `snake_case`
//! internally.

use chrono::{DateTime, Utc};
use nh_common::{Channel, Notification, NotificationLog, NotificationStatus, Priority};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendNotificationRequest {
    pub user_id: Option<i64>,
    pub subject: Option<String>,
    pub message: String,
    pub channels: Vec<ChannelTarget>,
    #[serde(default)]
    pub priority: Option<Priority>,
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Accepted for forward compatibility; not yet persisted anywhere in the
    /// data model (§3 has no metadata column on `notifications`).
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChannelTarget {
    #[serde(rename = "type")]
    pub channel: Channel,
    pub recipient: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SendNotificationResponse {
    pub success: bool,
    pub notification_id: i64,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationStatusResponse {
    pub id: i64,
    pub user_id: Option<i64>,
    pub status: NotificationStatus,
    pub channels: Vec<ChannelStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub scheduled_at: DateTime<Utc>,
    pub retry_count: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChannelStatus {
    #[serde(rename = "type")]
    pub channel: Channel,
    pub status: NotificationStatus,
}

impl From<&Notification> for NotificationStatusResponse {
    fn from(n: &Notification) -> Self {
        Self {
            id: n.id,
            user_id: n.user_id,
            status: n.status,
            channels: vec![ChannelStatus { channel: n.channel, status: n.status }],
            created_at: n.created_at,
            updated_at: n.updated_at,
            scheduled_at: n.scheduled_at,
            retry_count: n.retry_count,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    20
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LimitQuery {
    #[serde(default = "default_log_limit")]
    pub limit: u32,
}

fn default_log_limit() -> u32 {
    100
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RetryRequest {
    #[serde(default)]
    pub reset_retry_count: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RetryResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RetryFailedResponse {
    pub requeued: u32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClearFailedResponse {
    pub cleared: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LogEntry {
    pub id: i64,
    pub notification_id: i64,
    pub status: String,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<NotificationLog> for LogEntry {
    fn from(l: NotificationLog) -> Self {
        Self { id: l.id, notification_id: l.notification_id, status: l.status, message: l.message, created_at: l.created_at }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SimpleHealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadinessResponse {
    pub status: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DirectSendRequest {
    pub recipient: String,
    pub subject: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DirectSendResponse {
    pub success: bool,
    pub message_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PushMulticastRequest {
    pub tokens: Vec<String>,
    pub subject: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PushTopicRequest {
    pub topic: String,
    pub subject: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PushTopicSubscriptionRequest {
    pub topic: String,
    pub tokens: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusCount {
    pub status: NotificationStatus,
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChannelCount {
    pub channel: Channel,
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HourlyCount {
    pub hour: DateTime<Utc>,
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HourlySentFailed {
    pub hour: DateTime<Utc>,
    pub sent: i64,
    pub failed: i64,
}

/// Wire shape for `/api/analytics` — `nh_dispatcher::AnalyticsSummary` stays
/// tuple-based internally; the API layer names the tuple fields for JSON
/// consumers and OpenAPI schema generation.
#[derive(Debug, Serialize, ToSchema)]
pub struct AnalyticsSummaryResponse {
    pub total_24h: i64,
    pub success_rate: f64,
    pub by_status: Vec<StatusCount>,
    pub by_channel: Vec<ChannelCount>,
    pub hourly_counts: Vec<HourlyCount>,
    pub hourly_sent_failed: Vec<HourlySentFailed>,
}

impl From<nh_dispatcher::AnalyticsSummary> for AnalyticsSummaryResponse {
    fn from(s: nh_dispatcher::AnalyticsSummary) -> Self {
        Self {
            total_24h: s.total_24h,
            success_rate: s.success_rate,
            by_status: s.by_status.into_iter().map(|(status, count)| StatusCount { status, count }).collect(),
            by_channel: s.by_channel.into_iter().map(|(channel, count)| ChannelCount { channel, count }).collect(),
            hourly_counts: s.hourly_counts.into_iter().map(|(hour, count)| HourlyCount { hour, count }).collect(),
            hourly_sent_failed: s
                .hourly_sent_failed
                .into_iter()
                .map(|(hour, sent, failed)| HourlySentFailed { hour, sent, failed })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_notification() -> Notification {
        let now = Utc::now();
        Notification {
            id: 42,
            user_id: Some(7),
            template_id: None,
            channel: Channel::Sms,
            recipient: "+15551234567".to_string(),
            subject: None,
            content: "your code is 1234".to_string(),
            status: NotificationStatus::Retrying,
            priority: Priority::Urgent,
            retry_count: 2,
            max_retries: 5,
            scheduled_at: now,
            last_processed_at: Some(now),
            sent_at: None,
            error_message: Some("timeout".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn status_response_carries_a_single_channel_entry() {
        let n = sample_notification();
        let response = NotificationStatusResponse::from(&n);
        assert_eq!(response.id, 42);
        assert_eq!(response.channels.len(), 1);
        assert_eq!(response.channels[0].channel, Channel::Sms);
        assert_eq!(response.channels[0].status, NotificationStatus::Retrying);
        assert_eq!(response.retry_count, 2);
    }

    #[test]
    fn page_query_defaults_match_spec() {
        let query: PageQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, 20);
    }
}

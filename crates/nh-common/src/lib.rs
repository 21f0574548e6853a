//! Shared types for the notification dispatcher: the delivery channel and priority
//! enums, the notification/log data model, the adapter error classification, and
//! process-wide logging setup.
//!
//! Crates downstream of this one (`nh-queue`, `nh-store`, `nh-channels`,
//! `nh-dispatcher`, `nh-api`) depend on these types rather than redefining them,
//! so a notification's shape is identical whether it is sitting in the queue, the
//! relational store, or an HTTP response body.

pub mod logging;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A delivery mechanism for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
    Push,
    Slack,
    Telegram,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Push => "push",
            Channel::Slack => "slack",
            Channel::Telegram => "telegram",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "email" => Ok(Channel::Email),
            "sms" => Ok(Channel::Sms),
            "push" => Ok(Channel::Push),
            "slack" => Ok(Channel::Slack),
            "telegram" => Ok(Channel::Telegram),
            other => Err(ParseEnumError::unknown("Channel", other)),
        }
    }
}

/// Delivery priority. Encoded as an integer when handed to the queue backend:
/// urgent=10, high=5, normal=0, low=-5 (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    Urgent,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl Priority {
    /// Integer encoding used by the queue backend's `priority` column.
    pub fn score(&self) -> i32 {
        match self {
            Priority::Urgent => 10,
            Priority::High => 5,
            Priority::Normal => 0,
            Priority::Low => -5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            // Unrecognized priority falls back to normal (§4.3: "unknown => 0").
            _ => Ok(Priority::Normal),
        }
    }
}

/// Lifecycle state of a notification row (§4.4).
///
/// `Sent` and `Failed` are terminal: invariant 3 forbids any further transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Queued,
    Processing,
    Retrying,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Queued => "queued",
            NotificationStatus::Processing => "processing",
            NotificationStatus::Retrying => "retrying",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, NotificationStatus::Sent | NotificationStatus::Failed)
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(NotificationStatus::Pending),
            "queued" => Ok(NotificationStatus::Queued),
            "processing" => Ok(NotificationStatus::Processing),
            "retrying" => Ok(NotificationStatus::Retrying),
            "sent" => Ok(NotificationStatus::Sent),
            "failed" => Ok(NotificationStatus::Failed),
            other => Err(ParseEnumError::unknown("NotificationStatus", other)),
        }
    }
}

/// The free-text status tag recorded on a `NotificationLog` row. Unlike
/// `NotificationStatus`, this is not a finite state machine of the row itself —
/// it is the label of one interaction or transition (§3, §4.4).
pub mod log_tag {
    pub const CREATED: &str = "created";
    pub const QUEUED: &str = "queued";
    pub const PROCESSING: &str = "processing";
    pub const DELIVERED: &str = "delivered";
    pub const ERROR: &str = "error";
    pub const RETRY_SCHEDULED: &str = "retry_scheduled";
    pub const STALL_RECOVERED: &str = "stall_recovered";
    pub const FAILED: &str = "failed";
}

#[derive(Debug, thiserror::Error)]
#[error("invalid {type_name}: {value}")]
pub struct ParseEnumError {
    type_name: &'static str,
    value: String,
}

impl ParseEnumError {
    fn unknown(type_name: &'static str, value: &str) -> Self {
        Self { type_name, value: value.to_string() }
    }
}

/// One row per (submission x channel) (§3).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub id: i64,
    pub user_id: Option<i64>,
    /// Reserved for future template rendering; no dispatch code path reads it.
    pub template_id: Option<i64>,
    pub channel: Channel,
    pub recipient: String,
    pub subject: Option<String>,
    pub content: String,
    pub status: NotificationStatus,
    pub priority: Priority,
    pub retry_count: i32,
    pub max_retries: i32,
    pub scheduled_at: DateTime<Utc>,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input to `NotificationRepository::create`; the id and audit timestamps are
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Option<i64>,
    pub template_id: Option<i64>,
    pub channel: Channel,
    pub recipient: String,
    pub subject: Option<String>,
    pub content: String,
    pub priority: Priority,
    pub max_retries: i32,
    pub scheduled_at: DateTime<Utc>,
}

/// Append-only record of one state transition or provider interaction (§3).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationLog {
    pub id: i64,
    pub notification_id: i64,
    pub status: String,
    pub message: Option<String>,
    pub provider_response: Option<serde_json::Value>,
    pub error_details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Owning principal. Dispatch reads this only to resolve a recipient that the
/// submission left implicit (§3).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: i64,
    pub email: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub push_token: Option<String>,
    pub slack_webhook_url: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub preferences: serde_json::Value,
}

impl User {
    /// The address this user has on file for `channel`, or `None` if unset.
    pub fn address_for(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::Email => self.email.as_deref(),
            Channel::Sms => self.phone.as_deref(),
            Channel::Push => self.push_token.as_deref(),
            Channel::Slack => self.slack_webhook_url.as_deref(),
            Channel::Telegram => self.telegram_chat_id.as_deref(),
        }
    }
}

/// The three adapter failure classes (§4.1). Classification is mandatory and
/// lives on the adapter, not the dispatcher (§9): a naive "retry everything"
/// port produces retry storms on permanent errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterErrorKind {
    Transient,
    Permanent,
    Misconfigured,
}

impl AdapterErrorKind {
    /// Misconfigured is folded into "do not retry" at the dispatcher: it fails
    /// every call, so retrying accomplishes nothing (§4.1).
    pub fn is_retryable(&self) -> bool {
        matches!(self, AdapterErrorKind::Transient)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct AdapterError {
    pub kind: AdapterErrorKind,
    pub message: String,
}

impl AdapterError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self { kind: AdapterErrorKind::Transient, message: message.into() }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self { kind: AdapterErrorKind::Permanent, message: message.into() }
    }

    pub fn misconfigured(message: impl Into<String>) -> Self {
        Self { kind: AdapterErrorKind::Misconfigured, message: message.into() }
    }
}

/// Successful adapter send: a provider-assigned id plus whatever the provider
/// returned, kept verbatim for the log's `provider_response` column.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterSendResult {
    pub message_id: String,
    pub raw_provider_response: serde_json::Value,
}

/// Snapshot of one adapter's configuration/health, surfaced by `/api/*/verify`
/// and the overall health report (§4.1).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdapterStatus {
    pub channel: Channel,
    pub configured: bool,
    pub detail: Option<String>,
}

/// Queue depth snapshot (§4.6).
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct QueueStats {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
}

/// Overall system health (§4.6): `healthy` is true iff the broker is reachable.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthReport {
    pub healthy: bool,
    pub broker_connected: bool,
    pub worker_pool_running: bool,
    pub queue: QueueStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_score_matches_spec_encoding() {
        assert_eq!(Priority::Urgent.score(), 10);
        assert_eq!(Priority::High.score(), 5);
        assert_eq!(Priority::Normal.score(), 0);
        assert_eq!(Priority::Low.score(), -5);
    }

    #[test]
    fn priority_from_str_falls_back_to_normal() {
        assert_eq!("bogus".parse::<Priority>().unwrap(), Priority::Normal);
    }

    #[test]
    fn channel_round_trips_through_str() {
        for c in [Channel::Email, Channel::Sms, Channel::Push, Channel::Slack, Channel::Telegram] {
            assert_eq!(c.as_str().parse::<Channel>().unwrap(), c);
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(NotificationStatus::Sent.is_terminal());
        assert!(NotificationStatus::Failed.is_terminal());
        assert!(!NotificationStatus::Processing.is_terminal());
    }

    #[test]
    fn adapter_error_kind_retryability() {
        assert!(AdapterErrorKind::Transient.is_retryable());
        assert!(!AdapterErrorKind::Permanent.is_retryable());
        assert!(!AdapterErrorKind::Misconfigured.is_retryable());
    }
}

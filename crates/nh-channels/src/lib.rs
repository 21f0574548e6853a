//! Channel adapter contract (§4.1): one async trait, five concrete providers.
//! Each adapter sends exactly once per call and classifies the outcome; the
//! dispatcher decides whether and when to try again.

pub mod classify;
pub mod email;
pub mod push;
pub mod slack;
pub mod sms;
pub mod telegram;

use async_trait::async_trait;
use nh_common::{AdapterError, AdapterSendResult, AdapterStatus, Channel, Notification};
use std::time::Duration;

pub use email::EmailAdapter;
pub use push::PushAdapter;
pub use slack::SlackAdapter;
pub use sms::SmsAdapter;
pub use telegram::TelegramAdapter;

/// Build the shared reqwest client used by every HTTP-backed adapter.
pub fn build_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .expect("failed to build HTTP client")
}

#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn channel(&self) -> Channel;

    /// Send one notification. `recipient` is `notification.recipient`, already
    /// resolved by the caller (falling back to the owning user's address if the
    /// submission omitted one).
    async fn send(&self, notification: &Notification, recipient: &str) -> Result<AdapterSendResult, AdapterError>;

    /// Lightweight reachability/credentials check, used by `/api/*/verify`.
    async fn verify(&self) -> Result<(), AdapterError>;

    /// Whether this adapter has the configuration it needs to operate.
    fn status(&self) -> AdapterStatus;
}

//! Shared application state handed to every handler.

use std::collections::HashMap;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use nh_channels::{ChannelAdapter, EmailAdapter, PushAdapter, SlackAdapter, SmsAdapter, TelegramAdapter};
use nh_common::Channel;
use nh_dispatcher::Dispatcher;
use nh_queue::{QueuePublisher, SqliteQueue};
use nh_store::{NotificationLogRepository, NotificationRepository};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn NotificationRepository>,
    pub logs: Arc<dyn NotificationLogRepository>,
    /// Shared with `dispatcher`'s worker pool; submission publishes onto it directly
    /// rather than going through the admin surface, which is retry/housekeeping-only.
    pub queue: Arc<dyn QueuePublisher>,
    pub dispatcher: Arc<Dispatcher<SqliteQueue>>,
    pub email: Arc<EmailAdapter>,
    pub sms: Arc<SmsAdapter>,
    pub push: Arc<PushAdapter>,
    pub slack: Arc<SlackAdapter>,
    pub telegram: Arc<TelegramAdapter>,
    /// Handle to the process-wide recorder installed once at startup by the binary.
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    pub fn adapters(&self) -> HashMap<Channel, Arc<dyn ChannelAdapter>> {
        let mut map: HashMap<Channel, Arc<dyn ChannelAdapter>> = HashMap::new();
        map.insert(Channel::Email, self.email.clone());
        map.insert(Channel::Sms, self.sms.clone());
        map.insert(Channel::Push, self.push.clone());
        map.insert(Channel::Slack, self.slack.clone());
        map.insert(Channel::Telegram, self.telegram.clone());
        map
    }
}

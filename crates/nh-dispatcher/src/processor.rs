//! Single-job processing: claim, invoke the channel adapter, apply the retry
//! state machine (§4.4). This is the heart of the dispatcher — everything else
//! in this crate (the pool, the stall sweeper, admin retries) exists to get a
//! `QueuedJob` to this code path and react to its outcome.

use std::collections::HashMap;
use std::sync::Arc;

use nh_channels::ChannelAdapter;
use nh_common::{log_tag, Channel, NotificationStatus};
use nh_queue::{QueueConsumer, QueuedJob};
use nh_store::{NewNotificationLog, NotificationLogRepository, NotificationRepository};
use tracing::{debug, error, warn};

use crate::retry;

pub struct JobProcessor {
    store: Arc<dyn NotificationRepository>,
    logs: Arc<dyn NotificationLogRepository>,
    adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
}

impl JobProcessor {
    pub fn new(
        store: Arc<dyn NotificationRepository>,
        logs: Arc<dyn NotificationLogRepository>,
        adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
    ) -> Self {
        Self { store, logs, adapters }
    }

    /// Process one claimed job to completion: the row ends at `sent`, `retrying`
    /// (nacked back onto the queue with a delay), or `failed`, and the queue job
    /// is always acked or nacked before this returns — never left in limbo.
    pub async fn process(&self, queue: &dyn QueueConsumer, queued: QueuedJob) {
        let id = queued.job.notification_id;

        if let Err(e) = self.store.update_last_processed(id).await {
            error!(notification_id = id, error = %e, "failed to stamp last_processed_at, acking job to avoid a stuck claim");
            let _ = queue.ack(&queued.receipt_handle).await;
            return;
        }

        if let Err(e) = self.store.update_status(id, NotificationStatus::Processing, None).await {
            error!(notification_id = id, error = %e, "failed to mark processing");
            let _ = queue.ack(&queued.receipt_handle).await;
            return;
        }

        let notification = match self.store.find_by_id(id).await {
            Ok(Some(n)) => n,
            Ok(None) => {
                warn!(notification_id = id, "queued job has no backing row, dropping");
                let _ = queue.ack(&queued.receipt_handle).await;
                return;
            }
            Err(e) => {
                error!(notification_id = id, error = %e, "failed to load notification");
                let _ = queue.ack(&queued.receipt_handle).await;
                return;
            }
        };

        let Some(adapter) = self.adapters.get(&notification.channel) else {
            warn!(notification_id = id, channel = %notification.channel, "no adapter registered for channel");
            let _ = self
                .store
                .update_status(id, NotificationStatus::Failed, Some("no adapter configured for this channel"))
                .await;
            let _ = queue.ack(&queued.receipt_handle).await;
            return;
        };

        match adapter.send(&notification, &notification.recipient).await {
            Ok(result) => {
                debug!(notification_id = id, message_id = %result.message_id, "delivered");
                metrics::counter!("dispatcher.jobs.sent_total", "channel" => notification.channel.as_str()).increment(1);
                let _ = self.store.update_status(id, NotificationStatus::Sent, None).await;
                let _ = queue.ack(&queued.receipt_handle).await;
            }
            Err(err) => {
                let _ = self
                    .logs
                    .append(NewNotificationLog {
                        notification_id: id,
                        status: log_tag::ERROR.to_string(),
                        message: Some(err.message.clone()),
                        provider_response: None,
                        error_details: Some(serde_json::json!({ "kind": format!("{:?}", err.kind) })),
                    })
                    .await;

                let retryable = err.kind.is_retryable() && notification.retry_count + 1 <= notification.max_retries;

                if !retryable {
                    metrics::counter!("dispatcher.jobs.failed_total", "channel" => notification.channel.as_str()).increment(1);
                    let _ = self.store.update_status(id, NotificationStatus::Failed, Some(&err.message)).await;
                    let _ = queue.ack(&queued.receipt_handle).await;
                    return;
                }

                let new_count = match self.store.increment_retry_count(id).await {
                    Ok(c) => c,
                    Err(e) => {
                        error!(notification_id = id, error = %e, "failed to increment retry_count, failing the row");
                        let _ = self.store.update_status(id, NotificationStatus::Failed, Some(&err.message)).await;
                        let _ = queue.ack(&queued.receipt_handle).await;
                        return;
                    }
                };

                let policy = retry::policy_for(notification.channel);
                let delay_ms = retry::next_delay_ms(&policy, new_count);
                let summary = format!(
                    "retry {}/{} scheduled in {}ms: {}",
                    new_count, notification.max_retries, delay_ms, err.message
                );
                metrics::counter!("dispatcher.jobs.retried_total", "channel" => notification.channel.as_str()).increment(1);
                let _ = self.store.update_status(id, NotificationStatus::Retrying, Some(&summary)).await;

                let delay_seconds = delay_ms.div_ceil(1000) as u32;
                if let Err(e) = queue.nack(&queued.receipt_handle, Some(delay_seconds)).await {
                    error!(notification_id = id, error = %e, "failed to nack job for retry");
                }
            }
        }
    }
}

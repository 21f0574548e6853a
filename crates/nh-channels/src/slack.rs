//! Slack incoming-webhook adapter. `notification.recipient` is the webhook URL.

use async_trait::async_trait;
use nh_common::{AdapterError, AdapterSendResult, AdapterStatus, Channel, Notification};
use nh_config::SlackConfig;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::classify::classify_reqwest_error;
use crate::ChannelAdapter;

pub struct SlackAdapter {
    client: Client,
    config: SlackConfig,
}

impl SlackAdapter {
    pub fn new(config: SlackConfig) -> Self {
        Self { client: crate::build_http_client(Duration::from_secs(10)), config }
    }
}

/// Unlike the other HTTP adapters, a webhook's non-2xx is always transient
/// here: Slack's own 4xx/5xx split doesn't distinguish configuration errors
/// from rate limiting the way a REST API does.
fn classify_non_success(status: u16, body: &str) -> AdapterError {
    AdapterError::transient(format!("HTTP {status}: {body}"))
}

#[async_trait]
impl ChannelAdapter for SlackAdapter {
    fn channel(&self) -> Channel {
        Channel::Slack
    }

    async fn send(&self, notification: &Notification, recipient: &str) -> Result<AdapterSendResult, AdapterError> {
        if recipient.is_empty() {
            return Err(AdapterError::permanent("empty slack webhook URL"));
        }

        let text = match &notification.subject {
            Some(subject) => format!("*{subject}*\n{}", notification.content),
            None => notification.content.clone(),
        };

        let response = self
            .client
            .post(recipient)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() {
            debug!(notification_id = notification.id, "slack message sent");
            Ok(AdapterSendResult {
                message_id: format!("slack-{}", notification.id),
                raw_provider_response: serde_json::json!({ "body": body }),
            })
        } else {
            Err(classify_non_success(status.as_u16(), &body))
        }
    }

    async fn verify(&self) -> Result<(), AdapterError> {
        // Incoming webhooks have no standalone health-check endpoint; configuration
        // is verified implicitly on first send.
        Ok(())
    }

    fn status(&self) -> AdapterStatus {
        AdapterStatus {
            channel: Channel::Slack,
            configured: true,
            detail: Some("per-recipient webhook URL, nothing to preconfigure".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nh_common::AdapterErrorKind;

    #[test]
    fn non_2xx_is_transient_not_permanent() {
        let err = classify_non_success(404, "no_service");
        assert_eq!(err.kind, AdapterErrorKind::Transient);
    }

    #[test]
    fn server_error_is_also_transient() {
        let err = classify_non_success(500, "internal_error");
        assert_eq!(err.kind, AdapterErrorKind::Transient);
    }
}

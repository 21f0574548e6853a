//! FCM-shaped mobile push adapter. Authenticates with a bearer token built from
//! the configured service account key. Production OAuth2 token exchange is left
//! as an integration point; dev/test deployments can hand `SERVICE_ACCOUNT_KEY`
//! a pre-issued bearer token directly.

use async_trait::async_trait;
use nh_common::{AdapterError, AdapterSendResult, AdapterStatus, Channel, Notification};
use nh_config::PushConfig;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::classify::{classify_http_status, classify_reqwest_error};
use crate::ChannelAdapter;

pub struct PushAdapter {
    client: Client,
    config: PushConfig,
}

impl PushAdapter {
    pub fn new(config: PushConfig) -> Self {
        Self { client: crate::build_http_client(Duration::from_secs(15)), config }
    }

    fn configured(&self) -> bool {
        !self.config.project_id.is_empty() && !self.config.service_account_key.is_empty()
    }

    fn send_url(&self) -> String {
        format!("{}/v1/projects/{}/messages:send", self.config.api_base_url, self.config.project_id)
    }

    async fn send_payload(&self, body: serde_json::Value) -> Result<serde_json::Value, AdapterError> {
        let response = self
            .client
            .post(self.send_url())
            .bearer_auth(&self.config.service_account_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if status.is_success() {
            Ok(serde_json::from_str(&text).unwrap_or(serde_json::Value::Null))
        } else {
            Err(classify_http_status(status.as_u16(), &text))
        }
    }

    /// `/api/push/send-multicast`: one message fanned out to several device tokens.
    pub async fn send_multicast(&self, tokens: &[String], title: &str, body_text: &str) -> Result<serde_json::Value, AdapterError> {
        if !self.configured() {
            return Err(AdapterError::misconfigured("PROJECT_ID/SERVICE_ACCOUNT_KEY not set"));
        }
        self.send_payload(serde_json::json!({
            "message": { "tokens": tokens, "notification": { "title": title, "body": body_text } }
        }))
        .await
    }

    /// `/api/push/send-topic`: deliver to every subscriber of a topic.
    pub async fn send_topic(&self, topic: &str, title: &str, body_text: &str) -> Result<serde_json::Value, AdapterError> {
        if !self.configured() {
            return Err(AdapterError::misconfigured("PROJECT_ID/SERVICE_ACCOUNT_KEY not set"));
        }
        self.send_payload(serde_json::json!({
            "message": { "topic": topic, "notification": { "title": title, "body": body_text } }
        }))
        .await
    }

    /// `/api/push/subscribe-topic`.
    pub async fn subscribe_topic(&self, tokens: &[String], topic: &str) -> Result<(), AdapterError> {
        self.topic_membership("iid/v1:batchAdd", tokens, topic).await
    }

    /// `/api/push/unsubscribe-topic`.
    pub async fn unsubscribe_topic(&self, tokens: &[String], topic: &str) -> Result<(), AdapterError> {
        self.topic_membership("iid/v1:batchRemove", tokens, topic).await
    }

    async fn topic_membership(&self, path: &str, tokens: &[String], topic: &str) -> Result<(), AdapterError> {
        if !self.configured() {
            return Err(AdapterError::misconfigured("PROJECT_ID/SERVICE_ACCOUNT_KEY not set"));
        }
        let url = format!("https://iid.googleapis.com/{path}");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.service_account_key)
            .json(&serde_json::json!({ "to": format!("/topics/{topic}"), "registration_tokens": tokens }))
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(classify_http_status(status, &body))
        }
    }
}

#[async_trait]
impl ChannelAdapter for PushAdapter {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    async fn send(&self, notification: &Notification, recipient: &str) -> Result<AdapterSendResult, AdapterError> {
        if !self.configured() {
            return Err(AdapterError::misconfigured("PROJECT_ID/SERVICE_ACCOUNT_KEY not set"));
        }

        let title = notification.subject.clone().unwrap_or_default();
        let body = self
            .send_payload(serde_json::json!({
                "message": {
                    "token": recipient,
                    "notification": { "title": title, "body": notification.content }
                }
            }))
            .await?;

        debug!(notification_id = notification.id, "push sent");
        let message_id = body.get("name").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
        Ok(AdapterSendResult { message_id, raw_provider_response: body })
    }

    async fn verify(&self) -> Result<(), AdapterError> {
        if self.configured() {
            Ok(())
        } else {
            Err(AdapterError::misconfigured("PROJECT_ID/SERVICE_ACCOUNT_KEY not set"))
        }
    }

    fn status(&self) -> AdapterStatus {
        AdapterStatus {
            channel: Channel::Push,
            configured: self.configured(),
            detail: if self.configured() { None } else { Some("PROJECT_ID/SERVICE_ACCOUNT_KEY not set".to_string()) },
        }
    }
}
